use catalog_updater::scheduler::Job;
use catalog_updater::ProgressReporter;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter: one spinner per phase.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn start_spinner(&self, message: String) {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_chars(TICK_CHARS));
        }
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(80));

        let mut guard = self.lock();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.lock().take() {
            pb.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_cycle_start(&self, job: Job) {
        self.start_spinner(format!("Running {}...", job));
    }

    fn on_sync_complete(&self, created: usize, parts_added: usize) {
        self.finish_bar();
        eprintln!(
            "  {} Classifications synchronized: {} created, {} fragments added",
            "✓".green(),
            created,
            parts_added
        );
    }

    fn on_sync_skipped(&self, reason: &str) {
        self.finish_bar();
        eprintln!("  {} Classification sync skipped: {}", "!".yellow(), reason);
    }

    fn on_scan_start(&self) {
        self.start_spinner("Scanning files...".to_string());
    }

    fn on_scan_progress(&self, files_processed: usize, _current_path: &str) {
        if let Some(pb) = self.lock().as_ref() {
            pb.set_message(format!("Scanning... {} files processed", files_processed));
        }
    }

    fn on_cycle_complete(&self, job: Job, files_processed: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  {} {} complete: {} files in {:.2}s",
            "✓".green(),
            job,
            files_processed,
            duration_secs
        );
    }

    fn on_waiting(&self, job: Job, delay_secs: u64) {
        self.finish_bar();
        if delay_secs > 0 {
            eprintln!(
                "  {} Waiting {}s for {}",
                "…".cyan(),
                delay_secs,
                job
            );
        }
    }
}
