//! Python extension module (`--features python`)
//!
//! Mirrors the Rust API over numpy arrays. The interpreter is detached for
//! the duration of each calibration so other Python threads keep running.

use numpy::{IntoPyArray, PyArray1, PyArray2, PyReadonlyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::calibrate::{calibrate, LogProgress, ProgressSink};
use crate::errors::CalibrationError;
use crate::joint::{joint_probabilities, joint_probabilities_nn};
use crate::params::{CalibrationParams, DEFAULT_MAX_STEPS, DEFAULT_TOLERANCE};

// Convert CalibrationError to Python ValueError
impl From<CalibrationError> for PyErr {
    fn from(err: CalibrationError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

fn sink(verbose: bool) -> Option<&'static dyn ProgressSink> {
    if verbose {
        Some(&LogProgress)
    } else {
        None
    }
}

/// Conditional probabilities for a float32 distance matrix.
/// Returns (probabilities, mean_sigma).
#[pyfunction]
#[pyo3(signature = (sqdistances, desired_perplexity, verbose=false, max_steps=DEFAULT_MAX_STEPS, tolerance=DEFAULT_TOLERANCE))]
fn binary_search_perplexity<'py>(
    py: Python<'py>,
    sqdistances: PyReadonlyArray2<'py, f32>,
    desired_perplexity: f64,
    verbose: bool,
    max_steps: usize,
    tolerance: f64,
) -> PyResult<(Bound<'py, PyArray2<f32>>, f64)> {
    let view = sqdistances.as_array();
    let params = CalibrationParams::default()
        .with_max_steps(max_steps)
        .with_tolerance(tolerance);

    let result = py.detach(|| calibrate(view, desired_perplexity, &params, sink(verbose)))?;
    Ok((result.probabilities.into_pyarray(py), result.mean_bandwidth))
}

/// Dense symmetric joint affinities for a square distance matrix.
#[pyfunction]
#[pyo3(signature = (sqdistances, desired_perplexity, verbose=false))]
fn joint_affinities<'py>(
    py: Python<'py>,
    sqdistances: PyReadonlyArray2<'py, f64>,
    desired_perplexity: f64,
    verbose: bool,
) -> PyResult<Bound<'py, PyArray2<f64>>> {
    let view = sqdistances.as_array();
    let params = CalibrationParams::default();
    let joint = py.detach(|| joint_probabilities(view, desired_perplexity, &params, sink(verbose)))?;
    Ok(joint.into_pyarray(py))
}

/// Sparse joint affinities from k-NN distances and indices.
/// Returns CSR parts (data, indices, indptr).
#[pyfunction]
#[pyo3(signature = (sqdistances, neighbors, desired_perplexity, verbose=false))]
#[allow(clippy::type_complexity)]
fn joint_affinities_nn<'py>(
    py: Python<'py>,
    sqdistances: PyReadonlyArray2<'py, f32>,
    neighbors: PyReadonlyArray2<'py, i64>,
    desired_perplexity: f64,
    verbose: bool,
) -> PyResult<(
    Bound<'py, PyArray1<f64>>,
    Bound<'py, PyArray1<i64>>,
    Bound<'py, PyArray1<i64>>,
)> {
    let view = sqdistances.as_array();
    let neighbors = neighbors.as_array();
    // Negative indices cannot be neighbors; map them out of range so the
    // bounds check rejects them
    let indices = neighbors.mapv(|j| usize::try_from(j).unwrap_or(usize::MAX));
    let params = CalibrationParams::default();

    let sparse = py.detach(|| {
        joint_probabilities_nn(view, indices.view(), desired_perplexity, &params, sink(verbose))
    })?;
    let to_i64 = |v: Vec<usize>| v.into_iter().map(|x| x as i64).collect::<Vec<i64>>();
    Ok((
        sparse.data.into_pyarray(py),
        to_i64(sparse.indices).into_pyarray(py),
        to_i64(sparse.indptr).into_pyarray(py),
    ))
}

#[pymodule]
fn affinity_fast(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(binary_search_perplexity, m)?)?;
    m.add_function(wrap_pyfunction!(joint_affinities, m)?)?;
    m.add_function(wrap_pyfunction!(joint_affinities_nn, m)?)?;
    Ok(())
}
