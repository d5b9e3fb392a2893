//! Error types for affinity calibration
//!
//! Only malformed input is an error. Numeric degeneracy (all weights
//! underflowing) and non-convergence are absorbed by the search itself.

use thiserror::Error;

/// Errors returned at the calibration boundary, before any row is searched
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("empty input: distance matrix has no rows or no columns")]
    EmptyInput,

    #[error("shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: String },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid distance at ({row}, {col}): {value} (must be finite and non-negative)")]
    InvalidDistance { row: usize, col: usize, value: f64 },

    #[error("neighbor index {index} in row {row} is out of bounds for {n_samples} samples")]
    IndexOutOfBounds {
        row: usize,
        index: usize,
        n_samples: usize,
    },
}

pub type CalibrationResult<T> = Result<T, CalibrationError>;
