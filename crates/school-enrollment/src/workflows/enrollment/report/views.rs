use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::{
    ClassId, Enrollment, EnrollmentId, EnrollmentState, SchoolClass, StudentId, TransitionStatus,
};
use super::summary::{state_label, transition_label};

/// Enrollment as shown to staff, with localized labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentView {
    pub id: EnrollmentId,
    pub source_class_id: ClassId,
    pub student_id: StudentId,
    pub target_year: String,
    pub target_class_id: Option<ClassId>,
    pub target_grade_label: Option<String>,
    pub general_average: Option<f64>,
    pub transition_status: Option<TransitionStatus>,
    pub transition_label: String,
    pub state: EnrollmentState,
    pub state_label: String,
    pub exam_grade: Option<f64>,
    pub graded_subjects: u32,
    pub mandatory_subjects: u32,
    /// Average computed over fewer finals than mandatory subjects.
    pub partial_average: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<&Enrollment> for EnrollmentView {
    fn from(record: &Enrollment) -> Self {
        Self {
            id: record.id.clone(),
            source_class_id: record.source_class_id.clone(),
            student_id: record.student_id.clone(),
            target_year: record.target_year.clone(),
            target_class_id: record.target_class_id.clone(),
            target_grade_label: record.target_grade_label.clone(),
            general_average: record.general_average,
            transition_status: record.transition_status,
            transition_label: transition_label(record.transition_status),
            state: record.state,
            state_label: state_label(record.state),
            exam_grade: record.exam_grade,
            graded_subjects: record.graded_subjects,
            mandatory_subjects: record.mandatory_subjects,
            partial_average: record.general_average.is_some()
                && record.graded_subjects < record.mandatory_subjects,
            updated_at: record.updated_at,
        }
    }
}

/// Candidate destination class for a confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationOption {
    pub class: SchoolClass,
    pub matches_grade: bool,
}

impl DestinationOption {
    /// Classes matching `expected_grade` first, then by name.
    pub fn rank(classes: Vec<SchoolClass>, expected_grade: Option<&str>) -> Vec<Self> {
        let mut options: Vec<Self> = classes
            .into_iter()
            .map(|class| Self {
                matches_grade: expected_grade.is_some_and(|grade| class.grade_label == grade),
                class,
            })
            .collect();
        options.sort_by(|a, b| {
            b.matches_grade
                .cmp(&a.matches_grade)
                .then_with(|| a.class.name.cmp(&b.class.name))
        });
        options
    }
}
