use serde::{Deserialize, Serialize};

use crate::i18n::t;

use super::super::domain::{ClassId, Enrollment, EnrollmentState, TransitionStatus};

/// Count of enrollments in one workflow state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCount {
    pub state: EnrollmentState,
    pub label: String,
    pub count: usize,
}

/// Count of enrollments per transition status; `status: None` groups the
/// unclassified records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionCount {
    pub status: Option<TransitionStatus>,
    pub label: String,
    pub count: usize,
}

/// Summary of one (source class, target year) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentSummary {
    pub source_class_id: ClassId,
    pub target_year: String,
    pub total: usize,
    pub states: Vec<StateCount>,
    pub transitions: Vec<TransitionCount>,
    pub class_average: Option<f64>,
}

impl EnrollmentSummary {
    /// Every state and status is listed, including those with a zero count.
    pub fn from_records(
        source_class_id: ClassId,
        target_year: String,
        records: &[Enrollment],
    ) -> Self {
        let states = EnrollmentState::ordered()
            .into_iter()
            .map(|state| StateCount {
                state,
                label: state_label(state),
                count: records.iter().filter(|r| r.state == state).count(),
            })
            .collect();

        let mut transitions: Vec<TransitionCount> = TransitionStatus::ordered()
            .into_iter()
            .map(|status| TransitionCount {
                status: Some(status),
                label: transition_label(Some(status)),
                count: records
                    .iter()
                    .filter(|r| r.transition_status == Some(status))
                    .count(),
            })
            .collect();
        transitions.push(TransitionCount {
            status: None,
            label: transition_label(None),
            count: records
                .iter()
                .filter(|r| r.transition_status.is_none())
                .count(),
        });

        let averages: Vec<f64> = records.iter().filter_map(|r| r.general_average).collect();
        let class_average = if averages.is_empty() {
            None
        } else {
            let mean = averages.iter().sum::<f64>() / averages.len() as f64;
            Some((mean * 100.0).round() / 100.0)
        };

        Self {
            source_class_id,
            target_year,
            total: records.len(),
            states,
            transitions,
            class_average,
        }
    }

    pub fn state_count(&self, state: EnrollmentState) -> usize {
        self.states
            .iter()
            .find(|entry| entry.state == state)
            .map_or(0, |entry| entry.count)
    }

    pub fn transition_count(&self, status: Option<TransitionStatus>) -> usize {
        self.transitions
            .iter()
            .find(|entry| entry.status == status)
            .map_or(0, |entry| entry.count)
    }
}

pub(crate) fn state_label(state: EnrollmentState) -> String {
    t(&format!("enrollment.state.{}", state.code()))
}

pub(crate) fn transition_label(status: Option<TransitionStatus>) -> String {
    let code = status.map_or("unclassified", TransitionStatus::code);
    t(&format!("enrollment.transition.{code}"))
}
