use super::super::domain::{next_grade_label, TransitionStatus};
use super::config::ClassificationPolicy;

/// Band lookup; a value sitting exactly on a cut point takes the higher band.
pub(crate) fn classify(average: f64, policy: &ClassificationPolicy) -> TransitionStatus {
    if average >= policy.pass_mark {
        return TransitionStatus::Transita;
    }

    match policy.conditional_mark {
        Some(conditional) if average >= conditional => TransitionStatus::Condicional,
        _ => TransitionStatus::NaoTransita,
    }
}

/// The extraordinary exam is conclusive: there is no conditional outcome.
pub(crate) fn classify_exam(exam_grade: f64, policy: &ClassificationPolicy) -> TransitionStatus {
    if exam_grade >= policy.pass_mark {
        TransitionStatus::Transita
    } else {
        TransitionStatus::NaoTransita
    }
}

pub(crate) fn target_grade_for(status: TransitionStatus, source_grade: &str) -> Option<String> {
    match status {
        TransitionStatus::Transita | TransitionStatus::Condicional => {
            next_grade_label(source_grade)
        }
        TransitionStatus::NaoTransita => {
            let trimmed = source_grade.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
    }
}
