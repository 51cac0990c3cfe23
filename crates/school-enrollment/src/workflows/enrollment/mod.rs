//! School enrollment transition: generation of next-year enrollments from a
//! source class, grade-based classification, and the confirmation workflow
//! (`pendente` -> `aguardando_exame` -> `confirmada`).

pub mod domain;
pub mod grading;
pub mod report;
pub mod repository;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use domain::{
    next_grade_label, ActorContext, Capability, ClassId, Classification, Enrollment,
    EnrollmentFilter, EnrollmentId, EnrollmentState, RosterEntry, SchoolClass, StaffRole,
    StudentId, SubjectFinal, SubjectId, TransitionStatus,
};
pub use grading::{ClassificationPolicy, GradeAggregator, PolicyError};
pub use report::{write_csv, DestinationOption, EnrollmentSummary, EnrollmentView};
pub use repository::{EnrollmentRepository, RepositoryError, SchoolDirectory};
pub use router::{actor_from_headers, enrollment_router, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};
pub use service::{
    ClassYearRequest, ClassificationReport, ConfirmRequest, EnrollmentService,
    EnrollmentServiceError, ExamResultRequest, GenerationReport, ValidationError,
};
pub use store::{MemorySchoolStore, SqliteSchoolStore};
