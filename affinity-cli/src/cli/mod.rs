//! CLI command definitions and handlers

mod calibrate;
mod init;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{load_config_file, load_project_config, ProjectConfig};

/// Parse and validate workers count (1-64)
fn parse_workers(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("workers must be at least 1".to_string())
    } else if n > 64 {
        Err("workers cannot exceed 64".to_string())
    } else {
        Ok(n)
    }
}

/// Parse a strictly positive, finite float (perplexity)
fn parse_positive(s: &str) -> Result<f64, String> {
    let v: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if v.is_finite() && v > 0.0 {
        Ok(v)
    } else {
        Err(format!("expected a positive number, got {}", s))
    }
}

/// Parse a non-negative, finite float (tolerance; 0 demands an exact match)
fn parse_non_negative(s: &str) -> Result<f64, String> {
    let v: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if v.is_finite() && v >= 0.0 {
        Ok(v)
    } else {
        Err(format!("expected a non-negative number, got {}", s))
    }
}

/// affinity - perplexity-calibrated neighbor affinities
#[derive(Parser, Debug)]
#[command(name = "affinity")]
#[command(
    version,
    about = "Calibrate per-sample Gaussian bandwidths to a target perplexity",
    long_about = "Reads a matrix of squared distances (full n x n, or n x k nearest \
neighbors), finds for every sample the precision whose neighbor distribution has \
entropy ln(perplexity), and writes the resulting probabilities as JSON.",
    after_help = "\
Examples:
  affinity calibrate distances.json                      Conditional P(j|i), perplexity 30
  affinity calibrate distances.json --perplexity 5       Custom perplexity
  affinity calibrate knn.json --joint -o affinities.json Symmetrized CSR from k-NN input
  affinity init                                          Write an example affinity.toml"
)]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    /// Config file (default: ./affinity.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Calibrate a distance matrix and write affinities as JSON
    #[command(after_help = "\
Input formats:
  [[0, 1.2, 3.4], [1.2, 0, 2.2], [3.4, 2.2, 0]]           full squared-distance matrix
  {\"distances\": [[...]], \"indices\": [[...]]}             k-NN rows and their neighbor ids")]
    Calibrate {
        /// JSON file with squared distances
        input: PathBuf,

        /// Target perplexity (effective number of neighbors)
        #[arg(long, short = 'p', value_parser = parse_positive)]
        perplexity: Option<f64>,

        /// Bisection steps per sample
        #[arg(long)]
        max_steps: Option<usize>,

        /// Accepted |entropy - ln(perplexity)|
        #[arg(long, value_parser = parse_non_negative)]
        tolerance: Option<f64>,

        /// Emit symmetrized joint affinities instead of conditional probabilities
        #[arg(long)]
        joint: bool,

        /// Output file path (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Number of parallel workers (1-64, default: all cores)
        #[arg(long, value_parser = parse_workers)]
        workers: Option<usize>,

        /// Hide the progress bar
        #[arg(long, short = 'q')]
        quiet: bool,
    },

    /// Write an example affinity.toml into a directory
    Init {
        /// Target directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing affinity.toml
        #[arg(long)]
        force: bool,
    },
}

fn resolve_config(explicit: Option<&PathBuf>) -> Result<ProjectConfig> {
    match explicit {
        Some(path) => load_config_file(path),
        None => Ok(load_project_config(&std::env::current_dir()?)),
    }
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { path, force } => init::run(&path, force),

        Commands::Calibrate {
            input,
            perplexity,
            max_steps,
            tolerance,
            joint,
            output,
            workers,
            quiet,
        } => {
            let config = resolve_config(cli.config.as_ref())?;
            let args = calibrate::CalibrateArgs {
                input,
                perplexity,
                max_steps,
                tolerance,
                joint,
                output,
                workers,
                quiet,
            };
            calibrate::run(args, &config)
        }
    }
}
