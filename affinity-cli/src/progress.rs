//! Terminal progress for long calibrations

use affinity_fast::ProgressSink;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Drives an `indicatif` bar from calibration progress reports.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(total_rows: usize) -> Self {
        let bar = ProgressBar::new(total_rows as u64);
        bar.set_style(create_bar_style());
        bar.set_message("Calibrating bandwidths...");
        Self { bar }
    }

    /// Bar that draws nothing (--quiet, or output is not a terminal)
    pub fn hidden(total_rows: usize) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_length(total_rows as u64);
        Self { bar }
    }
}

fn create_bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░  ")
}

impl ProgressSink for BarProgress {
    fn rows_completed(&self, completed: usize, total: usize) {
        self.bar.set_position(completed as u64);
        if completed == total {
            self.bar.set_message("Rows calibrated");
        }
    }

    fn mean_bandwidth(&self, sigma: f64) {
        tracing::info!("mean sigma: {:.6}", sigma);
        self.bar.finish_with_message(format!(
            "{}Calibrated {} rows (mean sigma {:.4})",
            style("✓ ").green(),
            self.bar.position(),
            sigma
        ));
    }
}
