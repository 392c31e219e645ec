use crate::scheduler::Job;

/// Trait for reporting cycle progress.
///
/// The CLI implements it with indicatif; all methods default to no-ops.
pub trait ProgressReporter: Send + Sync {
    fn on_cycle_start(&self, _job: Job) {}
    fn on_sync_complete(&self, _created: usize, _parts_added: usize) {}
    fn on_sync_skipped(&self, _reason: &str) {}
    fn on_scan_start(&self) {}
    fn on_scan_progress(&self, _files_processed: usize, _current_path: &str) {}
    fn on_batch_written(&self, _rows: usize) {}
    fn on_cycle_complete(&self, _job: Job, _files_processed: usize, _duration_secs: f64) {}
    fn on_waiting(&self, _job: Job, _delay_secs: u64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
