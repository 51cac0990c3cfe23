use serde::{Deserialize, Serialize};

use super::super::domain::TransitionStatus;

/// School policy for turning a general average into a transition status.
///
/// Cut points are inclusive lower bounds on the grade scale `0..=scale_max`.
/// Leaving `conditional_mark` unset disables the conditional band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationPolicy {
    pub pass_mark: f64,
    pub conditional_mark: Option<f64>,
    pub scale_max: f64,
    /// Statuses that must go through the extraordinary exam before confirmation.
    pub exam_statuses: Vec<TransitionStatus>,
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        Self {
            pass_mark: 10.0,
            conditional_mark: None,
            scale_max: 20.0,
            exam_statuses: vec![TransitionStatus::Condicional],
        }
    }
}

impl ClassificationPolicy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if !self.scale_max.is_finite() || self.scale_max <= 0.0 {
            return Err(PolicyError::InvalidScale(self.scale_max));
        }
        if !self.pass_mark.is_finite() || self.pass_mark < 0.0 || self.pass_mark > self.scale_max {
            return Err(PolicyError::PassMarkOutOfScale {
                pass_mark: self.pass_mark,
                scale_max: self.scale_max,
            });
        }
        if let Some(conditional) = self.conditional_mark {
            if !conditional.is_finite() || conditional < 0.0 || conditional > self.pass_mark {
                return Err(PolicyError::ConditionalAbovePass {
                    conditional_mark: conditional,
                    pass_mark: self.pass_mark,
                });
            }
        }
        Ok(())
    }

    pub fn requires_exam(&self, status: TransitionStatus) -> bool {
        self.exam_statuses.contains(&status)
    }

    pub fn within_scale(&self, grade: f64) -> bool {
        grade.is_finite() && (0.0..=self.scale_max).contains(&grade)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("grade scale maximum must be a positive number (found {0})")]
    InvalidScale(f64),
    #[error("pass mark {pass_mark} lies outside the grade scale 0..={scale_max}")]
    PassMarkOutOfScale { pass_mark: f64, scale_max: f64 },
    #[error("conditional mark {conditional_mark} must lie between 0 and the pass mark {pass_mark}")]
    ConditionalAbovePass {
        conditional_mark: f64,
        pass_mark: f64,
    },
}
