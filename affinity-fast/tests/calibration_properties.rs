//! Properties every calibration must satisfy, checked through the public API.

use affinity_fast::entropy::{evaluate, shannon_entropy};
use affinity_fast::{calibrate, search_row, CalibrationParams, DEFAULT_EPSILON};
use ndarray::{array, Array2};

/// Squared distances between points on a slightly jittered 2D grid
fn grid_distances(side: usize) -> Array2<f64> {
    let points: Vec<(f64, f64)> = (0..side * side)
        .map(|i| {
            let (r, c) = (i / side, i % side);
            (r as f64 + 0.13 * (i % 5) as f64, c as f64 + 0.07 * (i % 7) as f64)
        })
        .collect();
    let n = points.len();
    Array2::from_shape_fn((n, n), |(i, j)| {
        let dx = points[i].0 - points[j].0;
        let dy = points[i].1 - points[j].1;
        dx * dx + dy * dy
    })
}

#[test]
fn rows_sum_to_one() {
    let d = grid_distances(7);
    let result = calibrate(d.view(), 8.0, &CalibrationParams::default(), None).unwrap();
    for row in result.probabilities.rows() {
        let total: f64 = row.sum();
        assert!((total - 1.0).abs() < 1e-6, "row sum {}", total);
        assert!(row.iter().all(|&p| (0.0..1.0).contains(&p)));
    }
}

#[test]
fn exact_mode_zero_diagonal() {
    let d = grid_distances(6);
    let result = calibrate(d.view(), 5.0, &CalibrationParams::default(), None).unwrap();
    for i in 0..d.nrows() {
        assert_eq!(result.probabilities[[i, i]], 0.0);
    }
}

#[test]
fn well_conditioned_rows_converge() {
    // 64 neighbors per row, 3x perplexity 10 is 30
    let d = grid_distances(8);
    let perplexity = 10.0f64;
    let params = CalibrationParams::default();
    let result = calibrate(d.view(), perplexity, &params, None).unwrap();
    assert_eq!(result.unconverged_rows, 0);

    for (i, row) in d.rows().into_iter().enumerate() {
        let row = row.to_vec();
        let (_, h) = evaluate(&row, result.betas[i], Some(i), DEFAULT_EPSILON);
        assert!((h - perplexity.ln()).abs() <= params.tolerance, "row {} h {}", i, h);

        let p = result.probabilities.row(i).to_vec();
        assert!((shannon_entropy(&p) - perplexity.ln()).abs() <= params.tolerance + 1e-9);
    }
}

#[test]
fn symmetric_three_sample_scenario() {
    let d = array![[0.0f32, 1.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 0.0]];
    let result = calibrate(d.view(), 2.0, &CalibrationParams::default(), None).unwrap();
    let expected = array![[0.0f32, 0.5, 0.5], [0.5, 0.0, 0.5], [0.5, 0.5, 0.0]];
    assert_eq!(result.probabilities, expected);
    assert_eq!(result.betas, vec![1.0; 3]);
    assert_eq!(result.mean_bandwidth, 1.0);
}

#[test]
fn restricted_mode_never_excludes() {
    // 5 samples, 3 neighbors each; column i of row i holds a zero distance
    // that must still take part in the distribution
    let d = array![
        [0.0f64, 1.0, 2.0],
        [0.5, 0.0, 1.5],
        [2.0, 1.0, 0.0],
        [0.3, 0.5, 0.9],
        [4.0, 0.1, 0.2],
    ];
    let result = calibrate(d.view(), 2.0, &CalibrationParams::default(), None).unwrap();
    assert_eq!(result.unconverged_rows, 0);
    for row in result.probabilities.rows() {
        assert!(row.iter().all(|&p| p > 0.0), "{:?}", row);
        assert!((row.sum() - 1.0).abs() < 1e-6);
    }
    assert!(result.probabilities[[0, 0]] > result.probabilities[[0, 1]]);
}

#[test]
fn tied_row_with_unreachable_target_degenerates_to_zeros() {
    // A tied row has entropy ln(3) at every beta, so perplexity 2 is out of
    // reach: beta doubles until every weight underflows, then bisects
    // across the underflow edge and ends on an all-zero row
    let d = array![
        [0.0f64, 1.0, 2.0],
        [0.3, 0.3, 0.3],
        [2.0, 1.0, 0.0],
        [0.5, 0.0, 1.5],
    ];
    let params = CalibrationParams::default();
    let result = calibrate(d.view(), 2.0, &params, None).unwrap();
    assert_eq!(result.unconverged_rows, 1);
    assert!(result.probabilities.row(1).iter().all(|&p| p == 0.0));
    assert!(result.betas[1] > 1000.0);
    for i in [0, 2, 3] {
        assert!((result.probabilities.row(i).sum() - 1.0).abs() < 1e-6);
    }

    let outcome = search_row(&[0.3f64, 0.3, 0.3], 2.0f64.ln(), None, &params, &mut [0.0; 3]);
    assert!(!outcome.converged);
    assert_eq!(outcome.steps, params.max_steps);
    assert!((outcome.entropy - DEFAULT_EPSILON.ln()).abs() < 1e-9);
}

#[test]
fn unreachable_target_returns_best_effort() {
    // Perplexity 1 asks for zero entropy; a tiny budget cannot get there
    let d = array![[1.0f64, 2.0, 3.0], [1.0, 2.0, 3.0], [2.0, 1.0, 4.0], [3.0, 3.5, 4.0]];
    let params = CalibrationParams::default().with_max_steps(4);
    let result = calibrate(d.view(), 1.0, &params, None).unwrap();
    assert_eq!(result.unconverged_rows, 4);
    // Four doublings from beta = 1
    assert!(result.betas.iter().all(|&b| b == 16.0));
    assert!(result.probabilities.iter().all(|p| p.is_finite()));
}

#[test]
fn all_underflow_row_falls_back_to_zeros() {
    // Distances so large every weight underflows at beta = 1 and the
    // target is out of reach; the row stays finite
    let d = array![[0.0f64, 1e6, 1e6], [1e6, 0.0, 2e6], [1e6, 2e6, 0.0]];
    let params = CalibrationParams::default().with_max_steps(1);
    let result = calibrate(d.view(), 1.5, &params, None).unwrap();
    assert!(result.probabilities.iter().all(|&p| p == 0.0));
    assert_eq!(result.unconverged_rows, 3);
}
