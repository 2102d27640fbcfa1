//! # Progress Display Module
//!
//! Questo modulo gestisce il feedback visuale durante la conversione.
//!
//! ## Responsabilità:
//! - Progress bar con `indicatif` che mostra il progress *aggregato* del batch
//!   (media dei progress dei job, 0-100)
//! - Contatore dei job conclusi nel messaggio della barra
//! - Spinner per operazioni indeterminate (discovery, export)
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:04] [=========================>--------------]  64% 2/3 done · photo.webp
//! ```
//!
//! La barra non legge il registry: riceve i valori da `ProgressTracker`,
//! che ascolta gli eventi del registry.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Aggregate progress bar for one batch run
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
    total_jobs: usize,
}

impl ProgressManager {
    pub fn new(total_jobs: usize) -> Self {
        let bar = ProgressBar::new(100);

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar, total_jobs }
    }

    /// Hidden bar, used in JSON mode
    pub fn hidden(total_jobs: usize) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            total_jobs,
        }
    }

    /// Move the bar to the aggregate percentage
    pub fn set_aggregate(&self, aggregate: u8) {
        self.bar.set_position(u64::from(aggregate.min(100)));
    }

    /// Show how many jobs have settled, with the latest event
    pub fn set_settled(&self, settled: usize, latest: &str) {
        self.bar
            .set_message(format!("{}/{} done · {}", settled, self.total_jobs, latest));
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Create a spinner for indeterminate progress
    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();

        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            spinner.set_style(style);
        }

        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        spinner
    }
}
