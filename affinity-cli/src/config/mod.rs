//! Configuration module for affinity
//!
//! Handles the project-level `affinity.toml`: calibration parameters and
//! CLI defaults. Explicit command-line flags always take priority.

mod project_config;

pub use project_config::{
    load_config_file, load_project_config, ProjectConfig, CONFIG_FILE_NAME, EXAMPLE_CONFIG,
};

#[cfg(test)]
pub use project_config::CliDefaults;
