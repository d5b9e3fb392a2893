//! affinity - perplexity calibration from the command line
//!
//! Reads a squared-distance matrix, finds each sample's Gaussian bandwidth
//! for the requested perplexity, and writes the resulting affinities as JSON.

mod cli;
mod config;
mod io;
mod progress;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // RUST_LOG wins over --log-level; logs go to stderr so stdout stays JSON
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    cli::run(cli)
}
