//! JSON input and output for the calibrate command

use affinity_fast::SparseAffinities;
use anyhow::{bail, Context, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Accepted input layouts: a bare array of rows, or an object with the
/// distance rows and optional k-NN indices.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawInput {
    Rows(Vec<Vec<f64>>),
    Object {
        distances: Vec<Vec<f64>>,
        #[serde(default)]
        indices: Option<Vec<Vec<usize>>>,
    },
}

/// Parsed calibration input
#[derive(Debug)]
pub struct DistanceInput {
    pub distances: Array2<f64>,
    pub indices: Option<Array2<usize>>,
}

/// Stack equal-length rows into a matrix, naming the first ragged row.
fn stack_rows<T: Copy>(rows: Vec<Vec<T>>, what: &str) -> Result<Array2<T>> {
    let n = rows.len();
    let k = rows.first().map_or(0, |r| r.len());
    if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != k) {
        bail!(
            "{} row {} has {} columns, expected {} (from row 0)",
            what,
            i,
            row.len(),
            k
        );
    }
    let flat: Vec<T> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((n, k), flat).with_context(|| format!("Failed to shape {} matrix", what))
}

pub fn parse_input(content: &str) -> Result<DistanceInput> {
    let raw: RawInput = serde_json::from_str(content).context(
        "Expected a JSON array of distance rows or an object with a \"distances\" field",
    )?;
    let (rows, indices) = match raw {
        RawInput::Rows(rows) => (rows, None),
        RawInput::Object { distances, indices } => (distances, indices),
    };

    let distances = stack_rows(rows, "distances")?;
    let indices = indices.map(|r| stack_rows(r, "indices")).transpose()?;
    if let Some(idx) = &indices {
        if idx.dim() != distances.dim() {
            bail!(
                "indices shape {:?} does not match distances shape {:?}",
                idx.dim(),
                distances.dim()
            );
        }
    }
    Ok(DistanceInput { distances, indices })
}

pub fn read_input(path: &Path) -> Result<DistanceInput> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_input(&content).with_context(|| format!("Invalid input in {}", path.display()))
}

/// Affinities written by the calibrate command
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Affinities {
    Dense(Vec<Vec<f64>>),
    Sparse(SparseAffinities),
}

impl Affinities {
    pub fn dense(matrix: &Array2<f64>) -> Self {
        Affinities::Dense(matrix.rows().into_iter().map(|r| r.to_vec()).collect())
    }
}

#[derive(Debug, Serialize)]
pub struct CalibrationReport {
    pub perplexity: f64,
    /// "conditional" or "joint"
    pub kind: &'static str,
    pub n_samples: usize,
    pub mean_sigma: f64,
    pub unconverged_rows: usize,
    pub probabilities: Affinities,
}

pub fn write_report(report: &CalibrationReport, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            println!("{}", json);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_rows() {
        let input = parse_input("[[0, 1, 2], [1, 0, 3], [2, 3, 0]]").unwrap();
        assert_eq!(input.distances.dim(), (3, 3));
        assert_eq!(input.distances[[1, 2]], 3.0);
        assert!(input.indices.is_none());
    }

    #[test]
    fn test_parse_object_with_indices() {
        let input = parse_input(
            r#"{"distances": [[1.0, 2.0], [1.0, 4.0], [2.0, 4.0]],
                "indices": [[1, 2], [0, 2], [0, 1]]}"#,
        )
        .unwrap();
        assert_eq!(input.distances.dim(), (3, 2));
        let indices = input.indices.unwrap();
        assert_eq!(indices[[2, 1]], 1);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = parse_input("[[0, 1], [1]]").unwrap_err();
        assert!(format!("{:#}", err).contains("row 1 has 1 columns"));
    }

    #[test]
    fn test_index_shape_mismatch_rejected() {
        let err = parse_input(r#"{"distances": [[1, 2], [3, 4], [5, 6]], "indices": [[1], [0], [0]]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_not_json_rejected() {
        assert!(parse_input("0 1 2\n1 0 3").is_err());
    }

    #[test]
    fn test_empty_array_is_empty_matrix() {
        let input = parse_input("[]").unwrap();
        assert_eq!(input.distances.dim(), (0, 0));
    }

    #[test]
    fn test_report_serializes_dense() {
        let report = CalibrationReport {
            perplexity: 2.0,
            kind: "conditional",
            n_samples: 2,
            mean_sigma: 1.0,
            unconverged_rows: 0,
            probabilities: Affinities::Dense(vec![vec![0.0, 1.0], vec![1.0, 0.0]]),
        };
        let value: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["probabilities"][0][1], 1.0);
        assert_eq!(value["kind"], "conditional");
    }
}
