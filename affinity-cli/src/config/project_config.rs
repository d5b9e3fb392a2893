//! Project-level configuration support
//!
//! Loads `affinity.toml` from the working directory (or an explicit path).
//!
//! # Configuration Format
//!
//! ```toml
//! # affinity.toml
//!
//! [calibration]
//! perplexity = 30.0
//! max_steps = 100
//! tolerance = 1e-5
//! epsilon = 1e-8
//!
//! [defaults]
//! workers = 8
//! joint = false
//! ```

use affinity_fast::CalibrationParams;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

pub const CONFIG_FILE_NAME: &str = "affinity.toml";

/// Perplexity used when neither the command line nor the config sets one
pub const DEFAULT_PERPLEXITY: f64 = 30.0;

/// Written by `affinity init`
pub const EXAMPLE_CONFIG: &str = r#"# affinity configuration

[calibration]
# Effective number of neighbors each sample spreads its mass over
perplexity = 30.0

# Bisection steps per sample before giving up
max_steps = 100

# Accepted |entropy - ln(perplexity)| in nats
tolerance = 1e-5

# Stand-in for the partition sum when every weight underflows
epsilon = 1e-8

[defaults]
# Worker threads (default: all cores)
# workers = 8

# Emit symmetrized joint affinities instead of conditional probabilities
joint = false
"#;

/// Project-level configuration loaded from affinity.toml
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct ProjectConfig {
    #[serde(default)]
    pub calibration: CalibrationConfig,

    #[serde(default)]
    pub defaults: CliDefaults,
}

/// `[calibration]` table. Unset fields fall back to the library defaults.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct CalibrationConfig {
    pub perplexity: Option<f64>,
    pub max_steps: Option<usize>,
    pub tolerance: Option<f64>,
    pub epsilon: Option<f64>,
}

/// `[defaults]` table for CLI flags
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct CliDefaults {
    pub workers: Option<usize>,
    pub joint: Option<bool>,
}

impl ProjectConfig {
    pub fn perplexity(&self) -> f64 {
        self.calibration.perplexity.unwrap_or(DEFAULT_PERPLEXITY)
    }

    /// Search parameters from the config, library defaults for the rest
    pub fn params(&self) -> CalibrationParams {
        let mut params = CalibrationParams::default();
        if let Some(max_steps) = self.calibration.max_steps {
            params.max_steps = max_steps;
        }
        if let Some(tolerance) = self.calibration.tolerance {
            params.tolerance = tolerance;
        }
        if let Some(epsilon) = self.calibration.epsilon {
            params.epsilon = epsilon;
        }
        params
    }
}

/// Parse a config file, failing on unreadable or malformed TOML.
pub fn load_config_file(path: &Path) -> Result<ProjectConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid TOML in {}", path.display()))
}

/// Load `affinity.toml` from `dir`, falling back to defaults when it is
/// missing or broken.
pub fn load_project_config(dir: &Path) -> ProjectConfig {
    let toml_path = dir.join(CONFIG_FILE_NAME);
    if !toml_path.exists() {
        debug!("No project config found, using defaults");
        return ProjectConfig::default();
    }
    match load_config_file(&toml_path) {
        Ok(config) => {
            debug!("Loaded project config from {}", toml_path.display());
            config
        }
        Err(e) => {
            warn!("Failed to load {}: {:#}", toml_path.display(), e);
            ProjectConfig::default()
        }
    }
}
