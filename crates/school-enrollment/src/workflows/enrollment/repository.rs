use super::domain::{
    ClassId, Classification, Enrollment, EnrollmentFilter, EnrollmentId, EnrollmentState,
    NewEnrollment, RosterEntry, SchoolClass, StateChange, StudentId, SubjectFinal, SubjectId,
};

/// Read-only school data the workflow consumes: classes, rosters, subjects and finals.
pub trait SchoolDirectory: Send + Sync {
    fn class(&self, id: &ClassId) -> Result<Option<SchoolClass>, RepositoryError>;
    fn roster(&self, class_id: &ClassId) -> Result<Vec<RosterEntry>, RepositoryError>;
    fn mandatory_subjects(&self, class_id: &ClassId) -> Result<Vec<SubjectId>, RepositoryError>;
    fn final_grades(
        &self,
        student_id: &StudentId,
        class_id: &ClassId,
        subjects: &[SubjectId],
    ) -> Result<Vec<SubjectFinal>, RepositoryError>;
    fn classes_for_year(&self, academic_year: &str) -> Result<Vec<SchoolClass>, RepositoryError>;
}

/// Storage for enrollment records.
pub trait EnrollmentRepository: Send + Sync {
    /// Insert every row whose (student, source class, target year) key is not
    /// stored yet and skip the others. The batch is applied atomically; the
    /// rows actually inserted are returned.
    fn insert_missing(&self, batch: Vec<NewEnrollment>) -> Result<Vec<Enrollment>, RepositoryError>;
    fn fetch(&self, id: &EnrollmentId) -> Result<Option<Enrollment>, RepositoryError>;
    fn list(&self, filter: &EnrollmentFilter) -> Result<Vec<Enrollment>, RepositoryError>;
    fn update_classification(
        &self,
        id: &EnrollmentId,
        classification: &Classification,
    ) -> Result<Enrollment, RepositoryError>;
    /// Apply `change` only if the record is still in `expected`.
    fn transition(
        &self,
        id: &EnrollmentId,
        expected: EnrollmentState,
        change: StateChange,
    ) -> Result<Enrollment, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record moved to {found:?} before the update (expected {expected:?})")]
    StaleState {
        expected: EnrollmentState,
        found: EnrollmentState,
    },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound,
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                RepositoryError::Conflict
            }
            other => RepositoryError::Unavailable(other.to_string()),
        }
    }
}
