//! Fixed configuration for the per-row search

use serde::{Deserialize, Serialize};

use crate::errors::CalibrationError;

/// Bisection steps per row before the search gives up.
pub const DEFAULT_MAX_STEPS: usize = 100;

/// Accepted absolute gap between row entropy and target entropy (nats).
pub const DEFAULT_TOLERANCE: f64 = 1e-5;

/// Substituted for the partition sum when every weight underflows to zero.
pub const DEFAULT_EPSILON: f64 = 1e-8;

/// Search configuration shared by every row of one calibration.
///
/// Deserializes from a partial table: missing fields take their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationParams {
    pub max_steps: usize,
    pub tolerance: f64,
    pub epsilon: f64,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            tolerance: DEFAULT_TOLERANCE,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

impl CalibrationParams {
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Reject values the bisection cannot run with.
    ///
    /// A zero tolerance is allowed (exact match only); a zero step budget
    /// is not, since no row would ever be evaluated.
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.max_steps == 0 {
            return Err(CalibrationError::InvalidParameter(
                "max_steps must be at least 1".to_string(),
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(CalibrationError::InvalidParameter(format!(
                "tolerance must be finite and non-negative, got {}",
                self.tolerance
            )));
        }
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(CalibrationError::InvalidParameter(format!(
                "epsilon must be finite and positive, got {}",
                self.epsilon
            )));
        }
        Ok(())
    }
}
