// UI module for consistent terminal output with progress bars and styling
//
// Spinners for the run phases and one bar per running download, all drawn to
// stderr and hidden when it is not a terminal.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use crate::download::{DownloadJob, DownloadObserver};
use crate::error::DownloadError;
use console::{Term, style};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// Spinner style similar to uv/pnpm
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

fn is_tty() -> bool {
    Term::stderr().is_term()
}

fn message_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Create a styled spinner for a phase of the run
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if !is_tty() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }

    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars(SPINNER_CHARS)
        .template("{spinner:.cyan} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());

    if is_tty() {
        pb.enable_steady_tick(Duration::from_millis(80));
    }
    pb
}

/// Progress bar for a download of known size
fn download_bar(total_size: u64) -> ProgressBar {
    let pb = ProgressBar::new(total_size);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.cyan} {msg} [{bar:25.cyan/dim}] {bytes}/{total_bytes} ({bytes_per_sec})")
    {
        pb.set_style(style.tick_chars(SPINNER_CHARS).progress_chars("━━╺"));
    }
    pb
}

/// Progress display for a download of unknown size
fn download_bar_indeterminate() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars(SPINNER_CHARS)
        .template("{spinner:.cyan} {msg} {bytes} ({bytes_per_sec})")
    {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Print a success message with checkmark
pub fn success(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

/// Print an info/action message with arrow
pub fn action(message: &str) {
    println!("{} {}", style("→").cyan(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    eprintln!("{} {}", style("⚠").yellow(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red(), message);
}

/// Print a dimmed/secondary message
pub fn dim(message: &str) {
    println!("{}", style(message).dim());
}

/// Print a status message (skipped runs, etc.)
pub fn status(prefix: &str, message: &str) {
    println!("{} {}", style(prefix).cyan().bold(), message);
}

fn finish_with(pb: &ProgressBar, msg: String, to_stderr: bool) {
    if is_tty() {
        pb.set_style(message_style());
        pb.finish_with_message(msg);
    } else {
        pb.finish_and_clear();
        if to_stderr {
            eprintln!("{}", msg);
        } else {
            println!("{}", msg);
        }
    }
}

/// Finish a spinner with success
pub fn finish_spinner_success(pb: &ProgressBar, message: &str) {
    finish_with(pb, format!("{} {}", style("✓").green(), message), false);
}

/// Finish a spinner with error
pub fn finish_spinner_error(pb: &ProgressBar, message: &str) {
    finish_with(pb, format!("{} {}", style("✗").red(), message), true);
}

/// Download bars of every running job, keyed by destination
pub struct DownloadProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<PathBuf, ProgressBar>>,
}

impl DownloadProgress {
    pub fn new() -> Self {
        let multi = MultiProgress::new();
        if !is_tty() {
            multi.set_draw_target(ProgressDrawTarget::hidden());
        }
        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn take(&self, job: &DownloadJob) -> Option<ProgressBar> {
        self.bars.lock().ok()?.remove(&job.destination)
    }
}

impl Default for DownloadProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadObserver for DownloadProgress {
    fn on_start(&self, job: &DownloadJob, total_bytes: Option<u64>) {
        let bar = match total_bytes {
            Some(total) => download_bar(total),
            None => download_bar_indeterminate(),
        };
        let bar = self.multi.add(bar);
        bar.set_message(job.display_name.clone());
        if let Ok(mut bars) = self.bars.lock() {
            if let Some(previous) = bars.insert(job.destination.clone(), bar) {
                previous.finish_and_clear();
            }
        }
    }

    fn on_progress(&self, job: &DownloadJob, downloaded: u64) {
        if let Ok(bars) = self.bars.lock() {
            if let Some(bar) = bars.get(&job.destination) {
                bar.set_position(downloaded);
            }
        }
    }

    fn on_finish(&self, job: &DownloadJob) {
        if let Some(bar) = self.take(job) {
            finish_with(
                &bar,
                format!(
                    "{} {} {}",
                    style("✓").green(),
                    job.display_name,
                    style("downloaded").dim()
                ),
                false,
            );
        }
    }

    fn on_cancel(&self, job: &DownloadJob) {
        if let Some(bar) = self.take(job) {
            bar.abandon_with_message(format!("{} cancelled", job.display_name));
        }
    }

    fn on_error(&self, job: &DownloadJob, error: &DownloadError) {
        if let Some(bar) = self.take(job) {
            finish_spinner_error(&bar, &format!("{}: {}", job.display_name, error));
        }
    }
}
