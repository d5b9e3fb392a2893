//! Calibrate command - distances in, affinities out

use affinity_fast::{calibrate, symmetrize, symmetrize_nn, CalibrationParams, ProgressSink};
use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::ProjectConfig;
use crate::io::{read_input, write_report, Affinities, CalibrationReport, DistanceInput};
use crate::progress::BarProgress;

/// Flags of the calibrate subcommand; `None` means "use the config".
#[derive(Debug, Clone)]
pub struct CalibrateArgs {
    pub input: PathBuf,
    pub perplexity: Option<f64>,
    pub max_steps: Option<usize>,
    pub tolerance: Option<f64>,
    pub joint: bool,
    pub output: Option<PathBuf>,
    pub workers: Option<usize>,
    pub quiet: bool,
}

/// Settings after merging flags over the config file
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Resolved {
    pub perplexity: f64,
    pub params: CalibrationParams,
    pub joint: bool,
    pub workers: Option<usize>,
}

pub(super) fn resolve(args: &CalibrateArgs, config: &ProjectConfig) -> Resolved {
    let mut params = config.params();
    if let Some(max_steps) = args.max_steps {
        params.max_steps = max_steps;
    }
    if let Some(tolerance) = args.tolerance {
        params.tolerance = tolerance;
    }
    Resolved {
        perplexity: args.perplexity.unwrap_or_else(|| config.perplexity()),
        params,
        joint: args.joint || config.defaults.joint.unwrap_or(false),
        workers: args.workers.or(config.defaults.workers),
    }
}

/// Run `f` on a dedicated pool when a worker count is given, otherwise on
/// rayon's global pool.
fn with_workers<R: Send>(workers: Option<usize>, f: impl FnOnce() -> R + Send) -> Result<R> {
    match workers {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .context("Failed to build worker pool")?;
            Ok(pool.install(f))
        }
        None => Ok(f()),
    }
}

pub(super) fn compute(
    input: &DistanceInput,
    settings: &Resolved,
    progress: &dyn ProgressSink,
) -> Result<CalibrationReport> {
    let conditional = calibrate(
        input.distances.view(),
        settings.perplexity,
        &settings.params,
        Some(progress),
    )?;

    if conditional.unconverged_rows > 0 {
        warn!(
            "{} of {} rows did not reach tolerance {} within {} steps",
            conditional.unconverged_rows,
            conditional.n_samples(),
            settings.params.tolerance,
            settings.params.max_steps
        );
    }

    let (kind, probabilities) = match (settings.joint, &input.indices) {
        (false, _) => ("conditional", Affinities::dense(&conditional.probabilities)),
        (true, None) => (
            "joint",
            Affinities::dense(&symmetrize(conditional.probabilities.view())?),
        ),
        (true, Some(indices)) => (
            "joint",
            Affinities::Sparse(symmetrize_nn(
                conditional.probabilities.view(),
                indices.view(),
            )?),
        ),
    };

    Ok(CalibrationReport {
        perplexity: settings.perplexity,
        kind,
        n_samples: conditional.n_samples(),
        mean_sigma: conditional.mean_bandwidth,
        unconverged_rows: conditional.unconverged_rows,
        probabilities,
    })
}

pub fn run(args: CalibrateArgs, config: &ProjectConfig) -> Result<()> {
    let settings = resolve(&args, config);
    let input = read_input(&args.input)?;
    let (n, k) = input.distances.dim();
    info!(
        "Calibrating {} samples x {} neighbors to perplexity {}",
        n, k, settings.perplexity
    );
    if settings.joint && input.indices.is_none() && k < n {
        anyhow::bail!("--joint with {}x{} neighbor distances requires \"indices\" in the input", n, k);
    }

    let progress = if args.quiet {
        BarProgress::hidden(n)
    } else {
        BarProgress::new(n)
    };
    let report = with_workers(settings.workers, || compute(&input, &settings, &progress))??;

    write_report(&report, args.output.as_deref())?;
    if let Some(path) = &args.output {
        if !args.quiet {
            eprintln!(
                "{} Wrote {} affinities to {}",
                style("✓").green(),
                report.kind,
                style(path.display()).cyan()
            );
        }
    }
    Ok(())
}
