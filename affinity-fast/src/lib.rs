//! Adaptive-bandwidth affinity calibration
//!
//! For every sample, find the Gaussian precision `beta` whose Gibbs
//! distribution over that sample's neighbors has entropy `ln(perplexity)`.
//! The result is the conditional probability matrix P(j|i) consumed by
//! neighbor-graph embeddings.
//!
//! ```
//! use affinity_fast::{calibrate, CalibrationParams};
//! use ndarray::array;
//!
//! let d = array![[0.0f64, 1.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 0.0]];
//! let result = calibrate(d.view(), 2.0, &CalibrationParams::default(), None).unwrap();
//! assert_eq!(result.probabilities[[0, 0]], 0.0);
//! assert!((result.probabilities[[0, 1]] - 0.5).abs() < 1e-12);
//! assert_eq!(result.mean_bandwidth, 1.0);
//! ```

mod calibrate;
mod element;
pub mod entropy;
mod errors;
mod joint;
mod params;
#[cfg(feature = "python")]
mod python;
pub mod search;

pub use calibrate::{
    calibrate, calibrate_sequential, Calibration, LogProgress, ProgressSink, PROGRESS_INTERVAL,
};
pub use element::Element;
pub use entropy::{evaluate, evaluate_into};
pub use errors::{CalibrationError, CalibrationResult};
pub use joint::{
    joint_probabilities, joint_probabilities_nn, symmetrize, symmetrize_nn, SparseAffinities,
};
pub use params::{CalibrationParams, DEFAULT_EPSILON, DEFAULT_MAX_STEPS, DEFAULT_TOLERANCE};
pub use search::{search_row, RowOutcome, SearchBounds};
