//! Matrix-level calibration: one bisection per row
//!
//! Rows are independent. Each one reads its own distance row and writes its
//! own output chunk, so the parallel path needs no locking beyond an atomic
//! progress counter. Betas are collected in row order and summed after the
//! join, which keeps the mean bandwidth identical across thread counts.

use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::element::Element;
use crate::errors::{CalibrationError, CalibrationResult};
use crate::params::CalibrationParams;
use crate::search::{search_row, RowOutcome};

/// Progress is reported every this many finished rows (and at the last row).
pub const PROGRESS_INTERVAL: usize = 1000;

/// Receives advisory progress during a calibration.
///
/// Called from worker threads; implementations must not block for long.
/// Nothing reported here affects the numeric result.
pub trait ProgressSink: Sync {
    fn rows_completed(&self, completed: usize, total: usize);

    /// Mean Gaussian bandwidth, `sqrt(n / sum(beta))`, reported once at the end.
    fn mean_bandwidth(&self, _sigma: f64) {}
}

/// Sink that writes progress to the `tracing` log at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn rows_completed(&self, completed: usize, total: usize) {
        info!(
            "computed conditional probabilities for sample {} / {}",
            completed, total
        );
    }

    fn mean_bandwidth(&self, sigma: f64) {
        info!("mean sigma: {:.6}", sigma);
    }
}

/// Output of [`calibrate`].
#[derive(Debug, Clone)]
pub struct Calibration<T> {
    /// Conditional probabilities P(j|i), same shape as the input
    pub probabilities: Array2<T>,
    /// Final beta per row, in row order
    pub betas: Vec<f64>,
    /// `sqrt(n_samples / sum(betas))`
    pub mean_bandwidth: f64,
    /// Rows whose search hit the step budget before reaching the tolerance
    pub unconverged_rows: usize,
}

impl<T> Calibration<T> {
    pub fn n_samples(&self) -> usize {
        self.betas.len()
    }
}

/// Validated shape of a calibration input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    n_samples: usize,
    n_neighbors: usize,
}

impl Layout {
    /// Fewer columns than rows: each row lists true neighbors only.
    fn using_neighbors(&self) -> bool {
        self.n_neighbors < self.n_samples
    }

    fn exclude_for(&self, row: usize) -> Option<usize> {
        if self.using_neighbors() {
            None
        } else {
            Some(row)
        }
    }
}

fn validate<T: Element>(
    distances: &ArrayView2<'_, T>,
    perplexity: f64,
    params: &CalibrationParams,
) -> CalibrationResult<Layout> {
    let (n_samples, n_neighbors) = distances.dim();
    if n_samples == 0 || n_neighbors == 0 {
        return Err(CalibrationError::EmptyInput);
    }
    if n_neighbors > n_samples {
        return Err(CalibrationError::ShapeMismatch {
            expected: format!("at most {} columns for {} samples", n_samples, n_samples),
            found: format!("{}x{}", n_samples, n_neighbors),
        });
    }
    if !perplexity.is_finite() || perplexity <= 0.0 {
        return Err(CalibrationError::InvalidParameter(format!(
            "perplexity must be finite and positive, got {}",
            perplexity
        )));
    }
    params.validate()?;

    for ((row, col), &d) in distances.indexed_iter() {
        let value = d.widen();
        if !value.is_finite() || value < 0.0 {
            return Err(CalibrationError::InvalidDistance { row, col, value });
        }
    }

    let layout = Layout {
        n_samples,
        n_neighbors,
    };
    let support = if layout.using_neighbors() {
        n_neighbors
    } else {
        n_neighbors - 1
    };
    if perplexity > support as f64 {
        warn!(
            "perplexity {} exceeds the {} neighbors available per row; rows will not converge",
            perplexity, support
        );
    }
    Ok(layout)
}

/// Searches one row and narrows the result into its output chunk.
struct RowDriver<'a> {
    layout: Layout,
    target_entropy: f64,
    params: &'a CalibrationParams,
    progress: Option<&'a dyn ProgressSink>,
    completed: AtomicUsize,
}

impl RowDriver<'_> {
    fn run<T: Element>(
        &self,
        row: usize,
        distances: &[T],
        scratch: &mut [f64],
        out: &mut [T],
    ) -> RowOutcome {
        let outcome = search_row(
            distances,
            self.target_entropy,
            self.layout.exclude_for(row),
            self.params,
            scratch,
        );
        for (dst, &p) in out.iter_mut().zip(scratch.iter()) {
            *dst = T::narrow(p);
        }

        if let Some(sink) = self.progress {
            let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
            if done % PROGRESS_INTERVAL == 0 || done == self.layout.n_samples {
                sink.rows_completed(done, self.layout.n_samples);
            }
        }
        outcome
    }
}

/// Borrow the matrix as one row-major slice, copying only when the view is
/// not contiguous in standard order.
fn with_row_major<T: Element, R>(
    distances: &ArrayView2<'_, T>,
    f: impl FnOnce(&[T]) -> R,
) -> R {
    match distances.as_slice() {
        Some(flat) => f(flat),
        None => {
            let owned: Vec<T> = distances.iter().copied().collect();
            f(&owned)
        }
    }
}

/// Calibrate every row of `distances` to `perplexity`, in parallel.
///
/// `distances` is `n_samples x n_neighbors` squared distances. With as many
/// columns as rows (exact mode) column `i` of row `i` is the self-distance
/// and is excluded; with fewer columns (restricted mode) nothing is
/// excluded. Runs on the current rayon pool.
///
/// # Errors
/// - `EmptyInput` for a matrix with no rows or columns
/// - `ShapeMismatch` when there are more columns than rows
/// - `InvalidParameter` for a non-positive perplexity or bad `params`
/// - `InvalidDistance` for a negative or non-finite distance
pub fn calibrate<T: Element>(
    distances: ArrayView2<'_, T>,
    perplexity: f64,
    params: &CalibrationParams,
    progress: Option<&dyn ProgressSink>,
) -> CalibrationResult<Calibration<T>> {
    let layout = validate(&distances, perplexity, params)?;
    let driver = RowDriver {
        layout,
        target_entropy: perplexity.ln(),
        params,
        progress,
        completed: AtomicUsize::new(0),
    };
    let k = layout.n_neighbors;

    let mut out = vec![T::default(); layout.n_samples * k];
    let outcomes: Vec<RowOutcome> = with_row_major(&distances, |flat| {
        out.par_chunks_mut(k)
            .zip(flat.par_chunks(k))
            .enumerate()
            .map_init(
                || vec![0.0f64; k],
                |scratch, (i, (out_row, row))| driver.run(i, row, scratch, out_row),
            )
            .collect::<Vec<_>>()
    });

    finish(layout, out, outcomes, progress)
}

/// Single-threaded [`calibrate`]. Same contract and same output.
pub fn calibrate_sequential<T: Element>(
    distances: ArrayView2<'_, T>,
    perplexity: f64,
    params: &CalibrationParams,
    progress: Option<&dyn ProgressSink>,
) -> CalibrationResult<Calibration<T>> {
    let layout = validate(&distances, perplexity, params)?;
    let driver = RowDriver {
        layout,
        target_entropy: perplexity.ln(),
        params,
        progress,
        completed: AtomicUsize::new(0),
    };
    let k = layout.n_neighbors;

    let mut out = vec![T::default(); layout.n_samples * k];
    let mut scratch = vec![0.0f64; k];
    let outcomes: Vec<RowOutcome> = with_row_major(&distances, |flat| {
        out.chunks_mut(k)
            .zip(flat.chunks(k))
            .enumerate()
            .map(|(i, (out_row, row))| driver.run(i, row, &mut scratch, out_row))
            .collect::<Vec<_>>()
    });

    finish(layout, out, outcomes, progress)
}

fn finish<T: Element>(
    layout: Layout,
    out: Vec<T>,
    outcomes: Vec<RowOutcome>,
    progress: Option<&dyn ProgressSink>,
) -> CalibrationResult<Calibration<T>> {
    let probabilities = Array2::from_shape_vec((layout.n_samples, layout.n_neighbors), out)
        .map_err(|e| CalibrationError::ShapeMismatch {
            expected: format!("{}x{}", layout.n_samples, layout.n_neighbors),
            found: e.to_string(),
        })?;

    let betas: Vec<f64> = outcomes.iter().map(|o| o.beta).collect();
    let beta_sum: f64 = betas.iter().sum();
    let mean_bandwidth = (layout.n_samples as f64 / beta_sum).sqrt();
    let unconverged_rows = outcomes.iter().filter(|o| !o.converged).count();

    if unconverged_rows > 0 {
        debug!(
            "{} of {} rows did not reach the entropy tolerance",
            unconverged_rows, layout.n_samples
        );
    }
    if let Some(sink) = progress {
        sink.mean_bandwidth(mean_bandwidth);
    }

    Ok(Calibration {
        probabilities,
        betas,
        mean_bandwidth,
        unconverged_rows,
    })
}
