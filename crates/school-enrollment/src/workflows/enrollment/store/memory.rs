use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use super::super::domain::{
    ClassId, Classification, Enrollment, EnrollmentFilter, EnrollmentId, EnrollmentKey,
    EnrollmentState, NewEnrollment, RosterEntry, SchoolClass, StateChange, StudentId,
    SubjectFinal, SubjectId,
};
use super::super::repository::{EnrollmentRepository, RepositoryError, SchoolDirectory};
use super::{apply_change, apply_classification, sort_for_listing};

#[derive(Debug, Default)]
struct MemoryState {
    classes: BTreeMap<ClassId, SchoolClass>,
    rosters: HashMap<ClassId, Vec<RosterEntry>>,
    subjects: HashMap<ClassId, Vec<SubjectId>>,
    finals: HashMap<(StudentId, ClassId), Vec<SubjectFinal>>,
    enrollments: HashMap<EnrollmentId, Enrollment>,
    keys: HashMap<EnrollmentKey, EnrollmentId>,
}

/// Process-local school store used by the demo and tests.
#[derive(Debug, Default, Clone)]
pub struct MemorySchoolStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySchoolStore {
    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("memory store lock poisoned".to_string()))
    }

    pub fn add_class(&self, class: SchoolClass) -> Result<(), RepositoryError> {
        self.lock()?.classes.insert(class.id.clone(), class);
        Ok(())
    }

    pub fn add_student(
        &self,
        class_id: &ClassId,
        student_id: StudentId,
        student_name: impl Into<String>,
        active: bool,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let roster = state.rosters.entry(class_id.clone()).or_default();
        roster.retain(|entry| entry.student_id != student_id);
        roster.push(RosterEntry {
            student_id,
            student_name: student_name.into(),
            active,
        });
        Ok(())
    }

    pub fn set_mandatory_subjects(
        &self,
        class_id: &ClassId,
        subjects: Vec<SubjectId>,
    ) -> Result<(), RepositoryError> {
        self.lock()?.subjects.insert(class_id.clone(), subjects);
        Ok(())
    }

    pub fn record_final(
        &self,
        student_id: &StudentId,
        class_id: &ClassId,
        subject_id: SubjectId,
        grade: f64,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let finals = state
            .finals
            .entry((student_id.clone(), class_id.clone()))
            .or_default();
        finals.retain(|record| record.subject_id != subject_id);
        finals.push(SubjectFinal { subject_id, grade });
        Ok(())
    }

    pub fn enrollment_count(&self) -> Result<usize, RepositoryError> {
        Ok(self.lock()?.enrollments.len())
    }
}

impl SchoolDirectory for MemorySchoolStore {
    fn class(&self, id: &ClassId) -> Result<Option<SchoolClass>, RepositoryError> {
        Ok(self.lock()?.classes.get(id).cloned())
    }

    fn roster(&self, class_id: &ClassId) -> Result<Vec<RosterEntry>, RepositoryError> {
        Ok(self
            .lock()?
            .rosters
            .get(class_id)
            .cloned()
            .unwrap_or_default())
    }

    fn mandatory_subjects(&self, class_id: &ClassId) -> Result<Vec<SubjectId>, RepositoryError> {
        Ok(self
            .lock()?
            .subjects
            .get(class_id)
            .cloned()
            .unwrap_or_default())
    }

    fn final_grades(
        &self,
        student_id: &StudentId,
        class_id: &ClassId,
        subjects: &[SubjectId],
    ) -> Result<Vec<SubjectFinal>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .finals
            .get(&(student_id.clone(), class_id.clone()))
            .map(|finals| {
                finals
                    .iter()
                    .filter(|record| subjects.contains(&record.subject_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn classes_for_year(&self, academic_year: &str) -> Result<Vec<SchoolClass>, RepositoryError> {
        Ok(self
            .lock()?
            .classes
            .values()
            .filter(|class| class.academic_year == academic_year)
            .cloned()
            .collect())
    }
}

impl EnrollmentRepository for MemorySchoolStore {
    fn insert_missing(
        &self,
        batch: Vec<NewEnrollment>,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        let mut state = self.lock()?;
        let now = Utc::now();
        let mut inserted = Vec::new();

        for row in batch {
            let key = row.key();
            if state.keys.contains_key(&key) {
                continue;
            }
            let record = row.into_record(now);
            state.keys.insert(key, record.id.clone());
            state.enrollments.insert(record.id.clone(), record.clone());
            inserted.push(record);
        }

        Ok(inserted)
    }

    fn fetch(&self, id: &EnrollmentId) -> Result<Option<Enrollment>, RepositoryError> {
        Ok(self.lock()?.enrollments.get(id).cloned())
    }

    fn list(&self, filter: &EnrollmentFilter) -> Result<Vec<Enrollment>, RepositoryError> {
        let mut records: Vec<Enrollment> = self
            .lock()?
            .enrollments
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        sort_for_listing(&mut records);
        Ok(records)
    }

    fn update_classification(
        &self,
        id: &EnrollmentId,
        classification: &Classification,
    ) -> Result<Enrollment, RepositoryError> {
        let mut state = self.lock()?;
        let record = state
            .enrollments
            .get_mut(id)
            .ok_or(RepositoryError::NotFound)?;
        if record.state != EnrollmentState::Pendente {
            return Err(RepositoryError::StaleState {
                expected: EnrollmentState::Pendente,
                found: record.state,
            });
        }
        apply_classification(record, classification, Utc::now());
        Ok(record.clone())
    }

    fn transition(
        &self,
        id: &EnrollmentId,
        expected: EnrollmentState,
        change: StateChange,
    ) -> Result<Enrollment, RepositoryError> {
        let mut state = self.lock()?;
        let record = state
            .enrollments
            .get_mut(id)
            .ok_or(RepositoryError::NotFound)?;
        if record.state != expected {
            return Err(RepositoryError::StaleState {
                expected,
                found: record.state,
            });
        }
        apply_change(record, change, Utc::now());
        Ok(record.clone())
    }
}
