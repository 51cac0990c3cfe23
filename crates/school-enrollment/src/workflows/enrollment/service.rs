use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::i18n::{t, t_with_args};

use super::domain::{
    ActorContext, Capability, ClassId, Enrollment, EnrollmentFilter, EnrollmentId,
    EnrollmentState, NewEnrollment, SchoolClass, StateChange, TransitionStatus,
};
use super::grading::{ClassificationPolicy, GradeAggregator};
use super::report::{DestinationOption, EnrollmentSummary};
use super::repository::{EnrollmentRepository, RepositoryError, SchoolDirectory};

/// Selection of a source class and destination academic year, as submitted
/// by the generate / classify actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassYearRequest {
    #[serde(default)]
    pub source_class_id: String,
    #[serde(default)]
    pub target_year: String,
}

impl ClassYearRequest {
    pub fn new(source_class_id: impl Into<String>, target_year: impl Into<String>) -> Self {
        Self {
            source_class_id: source_class_id.into(),
            target_year: target_year.into(),
        }
    }

    fn validate(&self) -> Result<(ClassId, String), ValidationError> {
        let class_id = self.source_class_id.trim();
        if class_id.is_empty() {
            return Err(ValidationError::MissingSourceClass);
        }
        let year = self.target_year.trim();
        if year.is_empty() {
            return Err(ValidationError::MissingTargetYear);
        }
        Ok((ClassId(class_id.to_string()), year.to_string()))
    }

    /// Listing filter for the validated class and year pair.
    pub fn to_filter(&self) -> Result<EnrollmentFilter, ValidationError> {
        let (class_id, target_year) = self.validate()?;
        Ok(EnrollmentFilter::for_class_year(class_id, target_year))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmRequest {
    #[serde(default)]
    pub destination_class_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamResultRequest {
    pub exam_grade: f64,
    #[serde(default)]
    pub destination_class_id: String,
}

/// Outcome of one generation batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub source_class_id: ClassId,
    pub target_year: String,
    pub created: usize,
    pub skipped: usize,
    pub inactive: usize,
    pub unclassified: usize,
}

/// Outcome of re-applying classifications to pending enrollments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub source_class_id: ClassId,
    pub target_year: String,
    pub updated: usize,
    pub unclassified: usize,
}

/// Service composing the school directory, the enrollment store and the grade aggregator.
pub struct EnrollmentService<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
    aggregator: Arc<GradeAggregator>,
}

impl<S, D> EnrollmentService<S, D>
where
    S: EnrollmentRepository + 'static,
    D: SchoolDirectory + 'static,
{
    pub fn new(store: Arc<S>, directory: Arc<D>, policy: ClassificationPolicy) -> Self {
        Self {
            store,
            directory,
            aggregator: Arc::new(GradeAggregator::new(policy)),
        }
    }

    pub fn policy(&self) -> &ClassificationPolicy {
        self.aggregator.policy()
    }

    /// Create one pending enrollment per active student of the source class
    /// that has none for the target year yet.
    ///
    /// Every student is graded before anything is written; a directory failure
    /// aborts the batch with nothing stored.
    pub fn generate(
        &self,
        actor: &ActorContext,
        request: &ClassYearRequest,
    ) -> Result<GenerationReport, EnrollmentServiceError> {
        self.generate_batch(actor, request).map_err(|err| {
            warn!(
                actor = %actor.actor_id,
                source_class = %request.source_class_id,
                target_year = %request.target_year,
                error = %err,
                "enrollment generation aborted"
            );
            err
        })
    }

    fn generate_batch(
        &self,
        actor: &ActorContext,
        request: &ClassYearRequest,
    ) -> Result<GenerationReport, EnrollmentServiceError> {
        require(actor, Capability::ManageEnrollments)?;
        let (class_id, target_year) = request.validate()?;
        let source = self.source_class(&class_id)?;

        let roster = self.directory.roster(&class_id)?;
        let mandatory = self.directory.mandatory_subjects(&class_id)?;
        let mut enrolled: HashSet<_> = self
            .store
            .list(&EnrollmentFilter::for_class_year(
                class_id.clone(),
                target_year.clone(),
            ))?
            .into_iter()
            .map(|record| record.student_id)
            .collect();

        let mut batch = Vec::new();
        let mut skipped = 0;
        let mut inactive = 0;

        for entry in roster {
            if !entry.active {
                inactive += 1;
                continue;
            }
            if !enrolled.insert(entry.student_id.clone()) {
                skipped += 1;
                continue;
            }

            let classification =
                self.aggregator
                    .grade_student(&*self.directory, &entry.student_id, &source, &mandatory)?;
            batch.push(NewEnrollment {
                source_class_id: class_id.clone(),
                student_id: entry.student_id,
                target_year: target_year.clone(),
                classification,
            });
        }

        let unclassified = batch
            .iter()
            .filter(|row| row.classification.transition_status.is_none())
            .count();
        let requested = batch.len();
        let inserted = self.store.insert_missing(batch)?;
        skipped += requested - inserted.len();

        info!(
            actor = %actor.actor_id,
            source_class = %class_id,
            target_year = %target_year,
            created = inserted.len(),
            skipped,
            unclassified,
            "enrollment generation finished"
        );

        Ok(GenerationReport {
            source_class_id: class_id,
            target_year,
            created: inserted.len(),
            skipped,
            inactive,
            unclassified,
        })
    }

    /// Recompute and store the classification of every pending enrollment of
    /// the pair. Updates are independent: a failure leaves earlier records
    /// updated, and the call can simply be repeated.
    pub fn classify_pending(
        &self,
        actor: &ActorContext,
        request: &ClassYearRequest,
    ) -> Result<ClassificationReport, EnrollmentServiceError> {
        require(actor, Capability::ManageEnrollments)?;
        let (class_id, target_year) = request.validate()?;
        let source = self.source_class(&class_id)?;
        let mandatory = self.directory.mandatory_subjects(&class_id)?;

        let pending = self.store.list(&EnrollmentFilter {
            state: Some(EnrollmentState::Pendente),
            ..EnrollmentFilter::for_class_year(class_id.clone(), target_year.clone())
        })?;

        let mut updated = 0;
        let mut unclassified = 0;
        for record in pending {
            let outcome = self
                .aggregator
                .grade_student(&*self.directory, &record.student_id, &source, &mandatory)
                .and_then(|classification| {
                    self.store
                        .update_classification(&record.id, &classification)
                });

            match outcome {
                Ok(stored) => {
                    updated += 1;
                    if stored.transition_status.is_none() {
                        unclassified += 1;
                    }
                }
                Err(RepositoryError::StaleState { found, .. }) => {
                    debug!(
                        enrollment = %record.id,
                        state = found.code(),
                        "enrollment left pendente before classification"
                    );
                }
                Err(err) => {
                    warn!(
                        enrollment = %record.id,
                        updated,
                        error = %err,
                        "classification update interrupted"
                    );
                    return Err(err.into());
                }
            }
        }

        info!(
            actor = %actor.actor_id,
            source_class = %class_id,
            target_year = %target_year,
            updated,
            unclassified,
            "pending enrollments classified"
        );

        Ok(ClassificationReport {
            source_class_id: class_id,
            target_year,
            updated,
            unclassified,
        })
    }

    /// `pendente -> confirmada` with a destination class.
    pub fn confirm(
        &self,
        actor: &ActorContext,
        id: &EnrollmentId,
        request: &ConfirmRequest,
    ) -> Result<Enrollment, EnrollmentServiceError> {
        require(actor, Capability::ManageEnrollments)?;
        let destination_id = destination_id(&request.destination_class_id)?;
        let record = self.fetch_record(id)?;

        ensure_transition(&record, EnrollmentState::Pendente, EnrollmentState::Confirmada)?;
        if let Some(status) = record.transition_status {
            if self.policy().requires_exam(status) {
                return Err(EnrollmentServiceError::RequiresExam(status));
            }
        }
        let destination = self.resolve_destination(&record, &destination_id)?;

        let stored = self.store.transition(
            id,
            EnrollmentState::Pendente,
            StateChange {
                state: EnrollmentState::Confirmada,
                target_class_id: Some(destination.id),
                exam_grade: None,
                classification: None,
            },
        )?;

        info!(
            actor = %actor.actor_id,
            enrollment = %id,
            destination = %destination_id,
            "enrollment confirmed"
        );
        Ok(stored)
    }

    /// `pendente -> aguardando_exame`.
    pub fn send_to_exam(
        &self,
        actor: &ActorContext,
        id: &EnrollmentId,
    ) -> Result<Enrollment, EnrollmentServiceError> {
        require(actor, Capability::ManageEnrollments)?;
        let record = self.fetch_record(id)?;
        ensure_transition(
            &record,
            EnrollmentState::Pendente,
            EnrollmentState::AguardandoExame,
        )?;

        let stored = self.store.transition(
            id,
            EnrollmentState::Pendente,
            StateChange {
                state: EnrollmentState::AguardandoExame,
                target_class_id: None,
                exam_grade: None,
                classification: None,
            },
        )?;

        info!(actor = %actor.actor_id, enrollment = %id, "enrollment sent to extraordinary exam");
        Ok(stored)
    }

    /// `aguardando_exame -> confirmada`; the exam grade revises the classification.
    pub fn record_exam_result(
        &self,
        actor: &ActorContext,
        id: &EnrollmentId,
        request: &ExamResultRequest,
    ) -> Result<Enrollment, EnrollmentServiceError> {
        require(actor, Capability::ManageEnrollments)?;
        if !self.policy().within_scale(request.exam_grade) {
            return Err(ValidationError::ExamGradeOutOfScale {
                grade: request.exam_grade,
                max: self.policy().scale_max,
            }
            .into());
        }
        let destination_id = destination_id(&request.destination_class_id)?;
        let record = self.fetch_record(id)?;

        ensure_transition(
            &record,
            EnrollmentState::AguardandoExame,
            EnrollmentState::Confirmada,
        )?;
        let destination = self.resolve_destination(&record, &destination_id)?;

        let source = self.directory.class(&record.source_class_id)?;
        let revised =
            self.aggregator
                .revise_with_exam(&record.classification(), source.as_ref(), request.exam_grade);

        let stored = self.store.transition(
            id,
            EnrollmentState::AguardandoExame,
            StateChange {
                state: EnrollmentState::Confirmada,
                target_class_id: Some(destination.id),
                exam_grade: Some(request.exam_grade),
                classification: Some(revised),
            },
        )?;

        info!(
            actor = %actor.actor_id,
            enrollment = %id,
            exam_grade = request.exam_grade,
            status = ?stored.transition_status,
            "exam result recorded"
        );
        Ok(stored)
    }

    pub fn get(
        &self,
        actor: &ActorContext,
        id: &EnrollmentId,
    ) -> Result<Enrollment, EnrollmentServiceError> {
        require(actor, Capability::ViewEnrollments)?;
        self.fetch_record(id)
    }

    pub fn list(
        &self,
        actor: &ActorContext,
        filter: &EnrollmentFilter,
    ) -> Result<Vec<Enrollment>, EnrollmentServiceError> {
        require(actor, Capability::ViewEnrollments)?;
        Ok(self.store.list(filter)?)
    }

    /// Counts per state and transition status, recomputed from the store.
    pub fn summary(
        &self,
        actor: &ActorContext,
        request: &ClassYearRequest,
    ) -> Result<EnrollmentSummary, EnrollmentServiceError> {
        require(actor, Capability::ViewEnrollments)?;
        let (class_id, target_year) = request.validate()?;
        let records = self.store.list(&EnrollmentFilter::for_class_year(
            class_id.clone(),
            target_year.clone(),
        ))?;
        Ok(EnrollmentSummary::from_records(
            class_id,
            target_year,
            &records,
        ))
    }

    /// Classes of the target year, those matching the expected grade first.
    pub fn destination_options(
        &self,
        actor: &ActorContext,
        id: &EnrollmentId,
    ) -> Result<Vec<DestinationOption>, EnrollmentServiceError> {
        require(actor, Capability::ViewEnrollments)?;
        let record = self.fetch_record(id)?;
        let classes = self.directory.classes_for_year(&record.target_year)?;
        Ok(DestinationOption::rank(
            classes,
            record.target_grade_label.as_deref(),
        ))
    }

    fn source_class(&self, class_id: &ClassId) -> Result<SchoolClass, EnrollmentServiceError> {
        self.directory
            .class(class_id)?
            .ok_or_else(|| EnrollmentServiceError::ClassNotFound(class_id.clone()))
    }

    fn fetch_record(&self, id: &EnrollmentId) -> Result<Enrollment, EnrollmentServiceError> {
        self.store
            .fetch(id)?
            .ok_or_else(|| EnrollmentServiceError::EnrollmentNotFound(id.clone()))
    }

    fn resolve_destination(
        &self,
        record: &Enrollment,
        destination_id: &ClassId,
    ) -> Result<SchoolClass, EnrollmentServiceError> {
        let destination = self
            .directory
            .class(destination_id)?
            .ok_or_else(|| EnrollmentServiceError::DestinationNotFound(destination_id.clone()))?;
        if destination.academic_year != record.target_year {
            return Err(EnrollmentServiceError::DestinationYearMismatch {
                expected: record.target_year.clone(),
                found: destination.academic_year,
            });
        }
        Ok(destination)
    }
}

fn require(actor: &ActorContext, capability: Capability) -> Result<(), EnrollmentServiceError> {
    if actor.can(capability) {
        Ok(())
    } else {
        Err(EnrollmentServiceError::Forbidden {
            actor_id: actor.actor_id.clone(),
            capability,
        })
    }
}

fn destination_id(raw: &str) -> Result<ClassId, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingDestination);
    }
    Ok(ClassId(trimmed.to_string()))
}

fn ensure_transition(
    record: &Enrollment,
    from: EnrollmentState,
    to: EnrollmentState,
) -> Result<(), EnrollmentServiceError> {
    if record.state == from && record.state.can_transition_to(to) {
        Ok(())
    } else {
        Err(EnrollmentServiceError::InvalidTransition {
            from: record.state,
            to,
        })
    }
}

/// Input problems detected before any store call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("source class is required")]
    MissingSourceClass,
    #[error("target academic year is required")]
    MissingTargetYear,
    #[error("destination class is required")]
    MissingDestination,
    #[error("exam grade {grade} outside 0..={max}")]
    ExamGradeOutOfScale { grade: f64, max: f64 },
}

impl ValidationError {
    pub fn user_message(&self) -> String {
        match self {
            ValidationError::MissingSourceClass => t("enrollment.errors.missing_source_class"),
            ValidationError::MissingTargetYear => t("enrollment.errors.missing_target_year"),
            ValidationError::MissingDestination => t("enrollment.errors.missing_destination"),
            ValidationError::ExamGradeOutOfScale { max, .. } => t_with_args(
                "enrollment.errors.invalid_exam_grade",
                &[("max", &max.to_string())],
            ),
        }
    }
}

/// Error raised by the enrollment service.
#[derive(Debug, thiserror::Error)]
pub enum EnrollmentServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("actor {actor_id} lacks capability {capability:?}")]
    Forbidden {
        actor_id: String,
        capability: Capability,
    },
    #[error("class {0} not found")]
    ClassNotFound(ClassId),
    #[error("enrollment {0} not found")]
    EnrollmentNotFound(EnrollmentId),
    #[error("destination class {0} not found")]
    DestinationNotFound(ClassId),
    #[error("destination class belongs to {found}, enrollment targets {expected}")]
    DestinationYearMismatch { expected: String, found: String },
    #[error("cannot move enrollment from {from:?} to {to:?}")]
    InvalidTransition {
        from: EnrollmentState,
        to: EnrollmentState,
    },
    #[error("status {0:?} must go through the extraordinary exam")]
    RequiresExam(TransitionStatus),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl EnrollmentServiceError {
    /// Stable machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Forbidden { .. } => "forbidden",
            Self::ClassNotFound(_) => "class_not_found",
            Self::EnrollmentNotFound(_) => "enrollment_not_found",
            Self::DestinationNotFound(_) => "destination_not_found",
            Self::DestinationYearMismatch { .. } => "destination_year_mismatch",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::RequiresExam(_) => "requires_exam",
            Self::Repository(RepositoryError::StaleState { .. }) => "stale_state",
            Self::Repository(RepositoryError::Conflict) => "conflict",
            Self::Repository(RepositoryError::NotFound) => "not_found",
            Self::Repository(RepositoryError::Unavailable(_)) => "unavailable",
        }
    }

    /// Message for end users in the active locale.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(err) => err.user_message(),
            Self::Forbidden { .. } => t("enrollment.errors.forbidden"),
            Self::ClassNotFound(id) => {
                t_with_args("enrollment.errors.class_not_found", &[("id", &id.0)])
            }
            Self::EnrollmentNotFound(id) => {
                t_with_args("enrollment.errors.enrollment_not_found", &[("id", &id.0)])
            }
            Self::DestinationNotFound(id) => {
                t_with_args("enrollment.errors.destination_not_found", &[("id", &id.0)])
            }
            Self::DestinationYearMismatch { expected, found } => t_with_args(
                "enrollment.errors.destination_year_mismatch",
                &[("expected", expected), ("found", found)],
            ),
            Self::InvalidTransition { from, to } => t_with_args(
                "enrollment.errors.invalid_transition",
                &[
                    ("from", &state_name(*from)),
                    ("to", &state_name(*to)),
                ],
            ),
            Self::RequiresExam(status) => t_with_args(
                "enrollment.errors.requires_exam",
                &[("status", &t(&format!("enrollment.transition.{}", status.code())))],
            ),
            Self::Repository(RepositoryError::StaleState { .. }) => {
                t("enrollment.errors.stale_state")
            }
            Self::Repository(RepositoryError::Conflict) => t("enrollment.errors.conflict"),
            Self::Repository(RepositoryError::NotFound) => t_with_args(
                "enrollment.errors.enrollment_not_found",
                &[("id", "?")],
            ),
            Self::Repository(RepositoryError::Unavailable(detail)) => t_with_args(
                "enrollment.errors.unavailable",
                &[("detail", detail)],
            ),
        }
    }
}

fn state_name(state: EnrollmentState) -> String {
    t(&format!("enrollment.state.{}", state.code()))
}
