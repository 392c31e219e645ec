use chrono::Utc;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::cancel::CancellationToken;
use crate::classify::{
    ClassificationSynchronizer, FileProcessor, HandleLedger, KeywordPattern, RetryPolicy,
    ScanCounters, SyncSummary,
};
use crate::config::{AppConfig, MappingFailurePolicy};
use crate::error::{Error, Result};
use crate::maintenance::{self, MaintenanceReport};
use crate::mapping::load_mappings;
use crate::progress::ProgressReporter;
use crate::scanner::{FileSystem, LocalFileSystem};
use crate::scheduler::Job;
use crate::storage::models::{FileDetail, RunStatus};
use crate::storage::{ClassificationStore, Database};

/// Drives one scan cycle, or one maintenance job, against a store and a
/// file tree.
pub struct ScanEngine {
    config: AppConfig,
    db: Database,
    fs: Arc<dyn FileSystem>,
}

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub run_id: i64,
    pub duration: Duration,
    pub counters: ScanCounters,
    pub files_written: usize,
    /// `(full path, handle)` of files rejected by the unique handle index.
    pub handle_conflicts: Vec<(String, String)>,
    /// `None` when sync was skipped.
    pub sync: Option<SyncSummary>,
    /// Set when the mapping source failed to load and sync was skipped.
    pub mapping_error: Option<String>,
}

#[derive(Debug, Clone)]
pub enum JobReport {
    Scan(CycleReport),
    Maintenance(MaintenanceReport),
}

impl ScanEngine {
    pub fn new(config: AppConfig, db: Database, fs: Arc<dyn FileSystem>) -> Self {
        Self { config, db, fs }
    }

    /// Open the configured database and walk the real file system.
    pub fn open(config: AppConfig) -> Result<Self> {
        let db = Database::open(&config.database_path)?;
        let fs = Arc::new(LocalFileSystem::new(&config.ignore_patterns));
        Ok(Self::new(config, db, fs))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn database_mut(&mut self) -> &mut Database {
        &mut self.db
    }

    fn synchronizer(&self) -> ClassificationSynchronizer {
        ClassificationSynchronizer::new(RetryPolicy {
            attempts: self.config.save_retry_attempts,
            ..RetryPolicy::default()
        })
    }

    pub fn run_job(
        &mut self,
        job: Job,
        reporter: &dyn ProgressReporter,
        token: &CancellationToken,
    ) -> Result<JobReport> {
        let start = Instant::now();
        let report = match job {
            Job::NewFiles => return self.run_cycle(reporter, token).map(JobReport::Scan),
            Job::SoftDelete => {
                reporter.on_cycle_start(job);
                maintenance::soft_delete(&self.db, self.fs.as_ref(), Utc::now(), token)?
            }
            Job::HardDelete => {
                reporter.on_cycle_start(job);
                maintenance::hard_delete(
                    &self.db,
                    self.config.hard_delete_after_days,
                    Utc::now(),
                    token,
                )?
            }
        };
        reporter.on_cycle_complete(job, report.examined, start.elapsed().as_secs_f64());
        Ok(JobReport::Maintenance(report))
    }

    /// Load the mapping source and bring classifications in line with it.
    pub fn sync_classifications(&mut self, token: &CancellationToken) -> Result<SyncSummary> {
        let mappings = load_mappings(Path::new(&self.config.mapping_file))?;
        info!("Loaded {} mappings from {}", mappings.len(), self.config.mapping_file);
        self.synchronizer().process(&mut self.db, &mappings, token)
    }

    /// One new-files cycle: sync classifications, then classify and store
    /// every file under the root. The cycle is recorded as a scan run.
    pub fn run_cycle(
        &mut self,
        reporter: &dyn ProgressReporter,
        token: &CancellationToken,
    ) -> Result<CycleReport> {
        token.check()?;
        reporter.on_cycle_start(Job::NewFiles);
        let start = Instant::now();
        let run_id = self.db.create_scan_run(Job::NewFiles.as_str())?;
        let mut report = CycleReport {
            run_id,
            ..CycleReport::default()
        };
        info!("Scan run {} started for {}", run_id, self.config.root_directory);

        let result = self.scan(&mut report, reporter, token);
        report.duration = start.elapsed();

        match result {
            Ok(()) => {
                self.db.complete_scan_run(
                    run_id,
                    RunStatus::Completed,
                    report.counters.files_processed,
                    report.counters.files_classified,
                    report.mapping_error.as_deref(),
                )?;
                reporter.on_cycle_complete(
                    Job::NewFiles,
                    report.counters.files_processed,
                    report.duration.as_secs_f64(),
                );
                info!(
                    "Scan run {} completed in {:.2}s: {} files, {} classified, {} written",
                    run_id,
                    report.duration.as_secs_f64(),
                    report.counters.files_processed,
                    report.counters.files_classified,
                    report.files_written
                );
                Ok(report)
            }
            Err(err) => {
                error!("Scan run {} failed: {}", run_id, err);
                if let Err(e) = self.db.complete_scan_run(
                    run_id,
                    RunStatus::Failed,
                    report.counters.files_processed,
                    report.counters.files_classified,
                    Some(&err.to_string()),
                ) {
                    error!("Error recording failed run {}: {}", run_id, e);
                }
                Err(err)
            }
        }
    }

    fn scan(
        &mut self,
        report: &mut CycleReport,
        reporter: &dyn ProgressReporter,
        token: &CancellationToken,
    ) -> Result<()> {
        // Phase 1: classification sync
        match load_mappings(Path::new(&self.config.mapping_file)) {
            Ok(mappings) => {
                info!("Loaded {} mappings", mappings.len());
                let summary = self.synchronizer().process(&mut self.db, &mappings, token)?;
                reporter.on_sync_complete(summary.classifications_created, summary.parts_added);
                report.sync = Some(summary);
            }
            Err(err) => match self.config.mapping_failure_policy {
                MappingFailurePolicy::SkipSync => {
                    error!("Skipping classification sync: {}", err);
                    reporter.on_sync_skipped(&err.to_string());
                    report.mapping_error = Some(err.to_string());
                }
                MappingFailurePolicy::FailCycle => return Err(err.into()),
            },
        }
        token.check()?;

        // Phase 2: pattern and ledger
        let classifications = self.db.all_classifications()?;
        let pattern = KeywordPattern::build(&classifications)?;
        let existing = self.db.existing_files()?;
        let mut ledger: HandleLedger = existing
            .values()
            .map(|file| file.file_handle.clone())
            .collect();
        debug!(
            "{} classifications, {} fragments, {} known files",
            classifications.len(),
            pattern.fragment_count(),
            existing.len()
        );

        // Phase 3: walk, process, write in batches
        let processor = FileProcessor::new(&pattern, &self.config);
        let root = PathBuf::from(&self.config.root_directory);
        let batch_size = self.config.batch_size.max(1);
        let mut batch: Vec<FileDetail> = Vec::with_capacity(batch_size);
        reporter.on_scan_start();

        for entry in self.fs.walk(&root) {
            token.check()?;
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping entry: {}", err);
                    continue;
                }
            };

            let Some(mut detail) = FileDetail::from_path(&entry.path, entry.size) else {
                warn!("Skipping non-UTF-8 path: {}", entry.path.display());
                report.counters.files_skipped += 1;
                continue;
            };
            if let Some(known) = existing.get(&(detail.directory_name.clone(), detail.file_name.clone())) {
                detail.id = Some(known.id);
                detail.file_handle = Some(known.file_handle.clone());
            }

            processor.process_file(&mut detail, &mut ledger, &mut report.counters, self.fs.as_ref());
            reporter.on_scan_progress(report.counters.files_processed, &entry.path.to_string_lossy());
            batch.push(detail);

            if batch.len() >= batch_size {
                flush_batch(&self.db, &mut batch, report, reporter)?;
            }
        }
        flush_batch(&self.db, &mut batch, report, reporter)?;

        if !report.handle_conflicts.is_empty() {
            warn!(
                "{} files skipped because their handle is already persisted",
                report.handle_conflicts.len()
            );
        }
        Ok(())
    }
}

fn flush_batch(
    db: &Database,
    batch: &mut Vec<FileDetail>,
    report: &mut CycleReport,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    let details = mem::take(batch);
    let summary = db
        .upsert_file_details(&details, report.run_id)
        .map_err(|err| Error::Persistence(format!("writing {} file details failed: {}", details.len(), err)))?;
    report.files_written += summary.files_upserted;
    report.handle_conflicts.extend(summary.handle_conflicts);
    reporter.on_batch_written(summary.files_upserted);
    Ok(())
}
