mod config;
mod policy;
mod rules;

pub use config::{ClassificationPolicy, PolicyError};

use super::domain::{Classification, SchoolClass, StudentId, SubjectFinal, SubjectId};
use super::repository::{RepositoryError, SchoolDirectory};
use policy::{classify, classify_exam, target_grade_for};
use rules::average_of_finals;

/// Stateless aggregator applying the classification policy to recorded finals.
#[derive(Debug, Clone)]
pub struct GradeAggregator {
    policy: ClassificationPolicy,
}

impl GradeAggregator {
    pub fn new(policy: ClassificationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ClassificationPolicy {
        &self.policy
    }

    /// Compute the general average and transition status from finals already in hand.
    pub fn aggregate(
        &self,
        source_class: &SchoolClass,
        mandatory: &[SubjectId],
        finals: &[SubjectFinal],
    ) -> Classification {
        let summary = average_of_finals(finals, mandatory);

        let transition_status = summary
            .average
            .map(|average| classify(average, &self.policy));
        let target_grade_label = transition_status
            .and_then(|status| target_grade_for(status, &source_class.grade_label));

        Classification {
            general_average: summary.average,
            transition_status,
            target_grade_label,
            graded_subjects: summary.graded,
            mandatory_subjects: summary.mandatory,
        }
    }

    /// Fetch the student's mandatory finals and aggregate them.
    ///
    /// An empty mandatory list short-circuits to an unclassified result
    /// without querying the directory.
    pub fn grade_student<D>(
        &self,
        directory: &D,
        student_id: &StudentId,
        source_class: &SchoolClass,
        mandatory: &[SubjectId],
    ) -> Result<Classification, RepositoryError>
    where
        D: SchoolDirectory + ?Sized,
    {
        if mandatory.is_empty() {
            return Ok(Classification::default());
        }

        let finals = directory.final_grades(student_id, &source_class.id, mandatory)?;
        Ok(self.aggregate(source_class, mandatory, &finals))
    }

    /// Classification after an extraordinary exam. The general average is kept;
    /// the status and target grade follow the exam grade.
    pub fn revise_with_exam(
        &self,
        current: &Classification,
        source_class: Option<&SchoolClass>,
        exam_grade: f64,
    ) -> Classification {
        let status = classify_exam(exam_grade, &self.policy);
        let target_grade_label = match source_class {
            Some(class) => target_grade_for(status, &class.grade_label),
            None => current.target_grade_label.clone(),
        };

        Classification {
            transition_status: Some(status),
            target_grade_label,
            ..current.clone()
        }
    }
}
