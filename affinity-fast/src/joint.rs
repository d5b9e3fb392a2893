//! Joint affinities from conditional probabilities
//!
//! An embedding optimizer wants a symmetric distribution over pairs:
//!
//!   P_ij = (P(j|i) + P(i|j)) / sum_{a,b} (P(b|a) + P(a|b))
//!
//! The dense form works on a full `n x n` distance matrix. The sparse form
//! works on k-nearest-neighbor rows plus their neighbor indices and returns
//! CSR over the union of neighbor edges.

use ndarray::{Array2, ArrayView2};
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::calibrate::{calibrate, ProgressSink};
use crate::element::Element;
use crate::errors::{CalibrationError, CalibrationResult};
use crate::params::CalibrationParams;

fn check_square(dim: (usize, usize)) -> CalibrationResult<()> {
    let (n, k) = dim;
    if n != k {
        return Err(CalibrationError::ShapeMismatch {
            expected: format!("square {}x{} matrix", n, n),
            found: format!("{}x{}", n, k),
        });
    }
    Ok(())
}

/// Neighbor indices must match the distance shape, list fewer neighbors
/// than samples, point at existing samples, and never name their own row.
fn check_neighbors(dim: (usize, usize), indices: &ArrayView2<'_, usize>) -> CalibrationResult<()> {
    if dim != indices.dim() {
        return Err(CalibrationError::ShapeMismatch {
            expected: format!("indices shaped {:?}", dim),
            found: format!("{:?}", indices.dim()),
        });
    }
    let (n, k) = dim;
    if n > 0 && k >= n {
        return Err(CalibrationError::ShapeMismatch {
            expected: format!("fewer than {} neighbors per row", n),
            found: format!("{}", k),
        });
    }
    for ((row, _), &index) in indices.indexed_iter() {
        if index >= n {
            return Err(CalibrationError::IndexOutOfBounds {
                row,
                index,
                n_samples: n,
            });
        }
        if index == row {
            return Err(CalibrationError::InvalidParameter(format!(
                "row {} lists itself as a neighbor",
                row
            )));
        }
    }
    Ok(())
}

/// Symmetrize a square conditional matrix into joint affinities.
///
/// The diagonal is 0. Off-diagonal entries are floored at `f64::EPSILON`
/// so that downstream KL terms never see `ln(0)`.
pub fn symmetrize<T: Element>(conditional: ArrayView2<'_, T>) -> CalibrationResult<Array2<f64>> {
    check_square(conditional.dim())?;

    let conditional = conditional.mapv(T::widen);
    let mut joint = &conditional + &conditional.t();
    let total = joint.sum().max(f64::EPSILON);

    for ((i, j), p) in joint.indexed_iter_mut() {
        *p = if i == j {
            0.0
        } else {
            (*p / total).max(f64::EPSILON)
        };
    }
    Ok(joint)
}

/// Symmetric joint affinities for a full square distance matrix.
pub fn joint_probabilities<T: Element>(
    distances: ArrayView2<'_, T>,
    perplexity: f64,
    params: &CalibrationParams,
    progress: Option<&dyn ProgressSink>,
) -> CalibrationResult<Array2<f64>> {
    check_square(distances.dim())?;
    let conditional = calibrate(distances, perplexity, params, progress)?;
    symmetrize(conditional.probabilities.view())
}

/// Compressed sparse row matrix of joint affinities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SparseAffinities {
    pub n_samples: usize,
    /// Row `i` occupies `indices[indptr[i]..indptr[i + 1]]`
    pub indptr: Vec<usize>,
    /// Column indices, sorted within each row
    pub indices: Vec<usize>,
    pub data: Vec<f64>,
}

impl SparseAffinities {
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Column indices and values stored for row `i`.
    pub fn row(&self, i: usize) -> (&[usize], &[f64]) {
        let span = self.indptr[i]..self.indptr[i + 1];
        (&self.indices[span.clone()], &self.data[span])
    }

    /// Value at `(i, j)`, 0 when the pair is not stored.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let (cols, values) = self.row(i);
        match cols.binary_search(&j) {
            Ok(pos) => values[pos],
            Err(_) => 0.0,
        }
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.n_samples, self.n_samples));
        for i in 0..self.n_samples {
            let (cols, values) = self.row(i);
            for (&j, &v) in cols.iter().zip(values) {
                dense[[i, j]] = v;
            }
        }
        dense
    }
}

/// Symmetrize k-NN conditional probabilities into CSR joint affinities.
///
/// `conditional[i, m]` is P(indices[i, m] | i).
pub fn symmetrize_nn<T: Element>(
    conditional: ArrayView2<'_, T>,
    indices: ArrayView2<'_, usize>,
) -> CalibrationResult<SparseAffinities> {
    check_neighbors(conditional.dim(), &indices)?;
    let n = conditional.nrows();

    let mut rows: Vec<FxHashMap<usize, f64>> = vec![FxHashMap::default(); n];
    for (i, (neighbors, probs)) in indices.outer_iter().zip(conditional.outer_iter()).enumerate() {
        for (&j, &p) in neighbors.iter().zip(probs.iter()) {
            let p = p.widen();
            *rows[i].entry(j).or_insert(0.0) += p;
            *rows[j].entry(i).or_insert(0.0) += p;
        }
    }

    let total: f64 = rows.iter().flat_map(|r| r.values()).sum();
    let total = total.max(f64::EPSILON);

    let mut indptr = Vec::with_capacity(n + 1);
    let mut col_indices = Vec::new();
    let mut data = Vec::new();
    indptr.push(0);
    for row in rows {
        let mut entries: Vec<(usize, f64)> = row.into_iter().collect();
        entries.sort_unstable_by_key(|&(j, _)| j);
        for (j, p) in entries {
            col_indices.push(j);
            data.push(p / total);
        }
        indptr.push(col_indices.len());
    }

    Ok(SparseAffinities {
        n_samples: n,
        indptr,
        indices: col_indices,
        data,
    })
}

/// Symmetric joint affinities for k-nearest-neighbor input.
///
/// `distances[i, m]` is the squared distance from sample `i` to sample
/// `indices[i, m]`. The search runs in restricted mode (no exclusion), so
/// `k` must be smaller than `n` and a row must not list its own sample.
///
/// # Errors
/// - `ShapeMismatch` if `indices` and `distances` differ in shape or `k >= n`
/// - `IndexOutOfBounds` for a neighbor index `>= n`
/// - `InvalidParameter` when row `i` lists `i` among its neighbors
/// - anything [`calibrate`] rejects
pub fn joint_probabilities_nn<T: Element>(
    distances: ArrayView2<'_, T>,
    indices: ArrayView2<'_, usize>,
    perplexity: f64,
    params: &CalibrationParams,
    progress: Option<&dyn ProgressSink>,
) -> CalibrationResult<SparseAffinities> {
    check_neighbors(distances.dim(), &indices)?;
    let conditional = calibrate(distances, perplexity, params, progress)?;
    symmetrize_nn(conditional.probabilities.view(), indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn line_points(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 * 0.5 + (i % 3) as f64 * 0.1).collect()
    }

    fn dense_distances(points: &[f64]) -> Array2<f64> {
        let n = points.len();
        Array2::from_shape_fn((n, n), |(i, j)| (points[i] - points[j]).powi(2))
    }

    /// k nearest neighbors (excluding self) by brute force
    fn knn(points: &[f64], k: usize) -> (Array2<f64>, Array2<usize>) {
        let n = points.len();
        let mut distances = Array2::zeros((n, k));
        let mut indices = Array2::zeros((n, k));
        for i in 0..n {
            let mut others: Vec<(f64, usize)> = (0..n)
                .filter(|&j| j != i)
                .map(|j| ((points[i] - points[j]).powi(2), j))
                .collect();
            others.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap().then(a.1.cmp(&b.1)));
            for (m, &(d, j)) in others.iter().take(k).enumerate() {
                distances[[i, m]] = d;
                indices[[i, m]] = j;
            }
        }
        (distances, indices)
    }

    #[test]
    fn test_dense_symmetric_normalized() {
        let d = dense_distances(&line_points(25));
        let p = joint_probabilities(d.view(), 5.0, &CalibrationParams::default(), None).unwrap();
        for i in 0..25 {
            assert_eq!(p[[i, i]], 0.0);
            for j in 0..25 {
                assert_eq!(p[[i, j]], p[[j, i]]);
            }
        }
        assert!((p.sum() - 1.0).abs() < 1e-6);
        assert!(p.iter().all(|&v| v < 1.0));
    }

    #[test]
    fn test_dense_symmetric_scenario() {
        let d = array![[0.0f64, 1.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 0.0]];
        let p = joint_probabilities(d.view(), 2.0, &CalibrationParams::default(), None).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 0.0 } else { 1.0 / 6.0 };
                assert!((p[[i, j]] - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_dense_rejects_non_square() {
        let d = Array2::<f64>::ones((4, 3));
        let err = joint_probabilities(d.view(), 2.0, &CalibrationParams::default(), None)
            .unwrap_err();
        assert!(matches!(err, CalibrationError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_nn_symmetric_normalized() {
        let points = line_points(40);
        let (d, idx) = knn(&points, 9);
        let p = joint_probabilities_nn(d.view(), idx.view(), 3.0, &CalibrationParams::default(), None)
            .unwrap();

        assert_eq!(p.indptr.len(), 41);
        let total: f64 = p.data.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);

        for i in 0..40 {
            let (cols, values) = p.row(i);
            assert!(cols.windows(2).all(|w| w[0] < w[1]));
            assert!(!cols.contains(&i));
            for (&j, &v) in cols.iter().zip(values) {
                assert!(v > 0.0);
                assert_eq!(v, p.get(j, i));
            }
        }
    }

    #[test]
    fn test_nn_dense_roundtrip_matches_get() {
        let points = line_points(12);
        let (d, idx) = knn(&points, 4);
        let p = joint_probabilities_nn(d.view(), idx.view(), 2.0, &CalibrationParams::default(), None)
            .unwrap();
        let dense = p.to_dense();
        for i in 0..12 {
            for j in 0..12 {
                assert_eq!(dense[[i, j]], p.get(i, j));
            }
        }
        assert_eq!(p.nnz(), dense.iter().filter(|&&v| v != 0.0).count());
    }

    #[test]
    fn test_symmetrize_matches_joint_probabilities() {
        let d = dense_distances(&line_points(15));
        let params = CalibrationParams::default();
        let conditional = calibrate(d.view(), 4.0, &params, None).unwrap();
        let direct = joint_probabilities(d.view(), 4.0, &params, None).unwrap();
        assert_eq!(symmetrize(conditional.probabilities.view()).unwrap(), direct);
    }

    #[test]
    fn test_nn_rejects_bad_indices() {
        let d = Array2::<f64>::ones((4, 2));
        let idx = array![[1usize, 2], [0, 2], [0, 7], [0, 1]];
        let err = joint_probabilities_nn(d.view(), idx.view(), 1.5, &CalibrationParams::default(), None)
            .unwrap_err();
        assert_eq!(
            err,
            CalibrationError::IndexOutOfBounds {
                row: 2,
                index: 7,
                n_samples: 4
            }
        );
    }

    #[test]
    fn test_nn_rejects_self_neighbor() {
        let p = Array2::<f64>::from_elem((4, 2), 0.5);
        let idx = array![[1usize, 2], [0, 2], [2, 3], [0, 1]];
        let err = symmetrize_nn(p.view(), idx.view()).unwrap_err();
        assert!(matches!(err, CalibrationError::InvalidParameter(ref msg) if msg.contains("row 2")));
    }

    #[test]
    fn test_nn_rejects_shape_mismatch() {
        let d = Array2::<f64>::ones((4, 2));
        let idx = Array2::<usize>::zeros((4, 3));
        let err = joint_probabilities_nn(d.view(), idx.view(), 1.5, &CalibrationParams::default(), None)
            .unwrap_err();
        assert!(matches!(err, CalibrationError::ShapeMismatch { .. }));

        let square = Array2::<f64>::ones((3, 3));
        let square_idx = Array2::<usize>::zeros((3, 3));
        let err = joint_probabilities_nn(
            square.view(),
            square_idx.view(),
            1.5,
            &CalibrationParams::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, CalibrationError::ShapeMismatch { .. }));
    }
}
