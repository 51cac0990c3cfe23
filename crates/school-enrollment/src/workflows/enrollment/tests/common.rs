use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::response::Response;
use serde_json::Value;

use crate::workflows::enrollment::domain::{
    ActorContext, ClassId, Classification, Enrollment, EnrollmentFilter, EnrollmentId,
    EnrollmentState, NewEnrollment, RosterEntry, SchoolClass, StaffRole, StateChange, StudentId,
    SubjectFinal, SubjectId,
};
use crate::workflows::enrollment::repository::{
    EnrollmentRepository, RepositoryError, SchoolDirectory,
};
use crate::workflows::enrollment::{
    ClassYearRequest, ClassificationPolicy, EnrollmentService, MemorySchoolStore,
};

pub(super) const SOURCE_CLASS: &str = "turma-9a";
pub(super) const SOURCE_YEAR: &str = "2024/2025";
pub(super) const TARGET_YEAR: &str = "2025/2026";
pub(super) const SUBJECTS: [&str; 3] = ["mat", "por", "ing"];

pub(super) fn secretary() -> ActorContext {
    ActorContext::new("sec-01", StaffRole::Secretariat)
}

pub(super) fn teacher() -> ActorContext {
    ActorContext::new("prof-07", StaffRole::Teacher)
}

pub(super) fn source_request() -> ClassYearRequest {
    ClassYearRequest::new(SOURCE_CLASS, TARGET_YEAR)
}

pub(super) fn class(id: &str, year: &str, grade: &str) -> SchoolClass {
    SchoolClass {
        id: ClassId(id.to_string()),
        name: id.to_uppercase(),
        academic_year: year.to_string(),
        education_level: "3º ciclo".to_string(),
        grade_label: grade.to_string(),
    }
}

pub(super) fn subjects() -> Vec<SubjectId> {
    SUBJECTS
        .iter()
        .map(|code| SubjectId(code.to_string()))
        .collect()
}

pub(super) fn student(index: usize) -> StudentId {
    StudentId(format!("aluno-{index:02}"))
}

/// Source class "9º" with its three mandatory subjects, plus destination
/// classes in the target year ("10A", "10B" for 10º and "9B" for repeaters).
pub(super) fn school() -> MemorySchoolStore {
    let store = MemorySchoolStore::default();
    store
        .add_class(class(SOURCE_CLASS, SOURCE_YEAR, "9º"))
        .expect("seed source class");
    for (id, grade) in [("turma-10a", "10º"), ("turma-10b", "10º"), ("turma-9b", "9º")] {
        store
            .add_class(class(id, TARGET_YEAR, grade))
            .expect("seed destination class");
    }
    store
        .add_class(class("turma-10c-old", SOURCE_YEAR, "10º"))
        .expect("seed class from another year");
    store
        .set_mandatory_subjects(&ClassId(SOURCE_CLASS.to_string()), subjects())
        .expect("seed subjects");
    store
}

/// Enroll a student in the source class with finals for the first subjects.
pub(super) fn enroll_with_finals(store: &MemorySchoolStore, index: usize, grades: &[f64]) {
    let class_id = ClassId(SOURCE_CLASS.to_string());
    store
        .add_student(&class_id, student(index), format!("Aluno {index}"), true)
        .expect("seed student");
    for (subject, grade) in subjects().into_iter().zip(grades) {
        store
            .record_final(&student(index), &class_id, subject, *grade)
            .expect("seed final");
    }
}

/// School with `count` students who all pass with [12, 14, 16].
pub(super) fn school_with_students(count: usize) -> MemorySchoolStore {
    let store = school();
    for index in 1..=count {
        enroll_with_finals(&store, index, &[12.0, 14.0, 16.0]);
    }
    store
}

pub(super) type MemoryService = EnrollmentService<MemorySchoolStore, MemorySchoolStore>;

pub(super) fn build_service(store: &MemorySchoolStore) -> MemoryService {
    build_service_with_policy(store, ClassificationPolicy::default())
}

pub(super) fn build_service_with_policy(
    store: &MemorySchoolStore,
    policy: ClassificationPolicy,
) -> MemoryService {
    let shared = Arc::new(store.clone());
    EnrollmentService::new(shared.clone(), shared, policy)
}

pub(super) fn conditional_policy() -> ClassificationPolicy {
    ClassificationPolicy {
        conditional_mark: Some(8.0),
        ..ClassificationPolicy::default()
    }
}

pub(super) fn only_enrollment(store: &MemorySchoolStore) -> Enrollment {
    let mut records = store
        .list(&EnrollmentFilter::default())
        .expect("list succeeds");
    assert_eq!(records.len(), 1, "expected a single enrollment");
    records.remove(0)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("valid json")
}

/// Directory that delegates to a memory store but fails the n-th
/// `final_grades` lookup (1-based).
pub(super) struct FlakyDirectory {
    inner: MemorySchoolStore,
    fail_on: usize,
    calls: AtomicUsize,
}

impl FlakyDirectory {
    pub(super) fn new(inner: MemorySchoolStore, fail_on: usize) -> Self {
        Self {
            inner,
            fail_on,
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SchoolDirectory for FlakyDirectory {
    fn class(&self, id: &ClassId) -> Result<Option<SchoolClass>, RepositoryError> {
        self.inner.class(id)
    }

    fn roster(&self, class_id: &ClassId) -> Result<Vec<RosterEntry>, RepositoryError> {
        self.inner.roster(class_id)
    }

    fn mandatory_subjects(&self, class_id: &ClassId) -> Result<Vec<SubjectId>, RepositoryError> {
        self.inner.mandatory_subjects(class_id)
    }

    fn final_grades(
        &self,
        student_id: &StudentId,
        class_id: &ClassId,
        subjects: &[SubjectId],
    ) -> Result<Vec<SubjectFinal>, RepositoryError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err(RepositoryError::Unavailable("grades service timed out".to_string()));
        }
        self.inner.final_grades(student_id, class_id, subjects)
    }

    fn classes_for_year(&self, academic_year: &str) -> Result<Vec<SchoolClass>, RepositoryError> {
        self.inner.classes_for_year(academic_year)
    }
}

/// Enrollment store whose every call fails.
pub(super) struct UnavailableStore;

impl EnrollmentRepository for UnavailableStore {
    fn insert_missing(
        &self,
        _batch: Vec<NewEnrollment>,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &EnrollmentId) -> Result<Option<Enrollment>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self, _filter: &EnrollmentFilter) -> Result<Vec<Enrollment>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update_classification(
        &self,
        _id: &EnrollmentId,
        _classification: &Classification,
    ) -> Result<Enrollment, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn transition(
        &self,
        _id: &EnrollmentId,
        _expected: EnrollmentState,
        _change: StateChange,
    ) -> Result<Enrollment, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}
