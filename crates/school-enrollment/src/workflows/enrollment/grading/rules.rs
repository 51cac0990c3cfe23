use std::collections::HashSet;

use super::super::domain::{SubjectFinal, SubjectId};

pub(crate) struct FinalsSummary {
    pub average: Option<f64>,
    pub graded: u32,
    pub mandatory: u32,
}

/// Mean of the available mandatory finals. Missing subjects are left out of
/// both the sum and the count; extra subjects and repeated finals are ignored.
pub(crate) fn average_of_finals(finals: &[SubjectFinal], mandatory: &[SubjectId]) -> FinalsSummary {
    let mandatory: HashSet<&SubjectId> = mandatory.iter().collect();
    let mut seen: HashSet<&SubjectId> = HashSet::new();
    let mut sum = 0.0;
    let mut graded: u32 = 0;

    for record in finals {
        if !record.grade.is_finite() || !mandatory.contains(&record.subject_id) {
            continue;
        }
        if !seen.insert(&record.subject_id) {
            continue;
        }
        sum += record.grade;
        graded += 1;
    }

    let average = if graded == 0 {
        None
    } else {
        Some(sum / f64::from(graded))
    };

    FinalsSummary {
        average,
        graded,
        mandatory: mandatory.len() as u32,
    }
}
