//! Soft and hard deletion of files that have disappeared from the tree.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, error, info};

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::scanner::FileSystem;
use crate::scheduler::Job;
use crate::storage::models::RunStatus;
use crate::storage::Database;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub run_id: i64,
    /// Rows looked at.
    pub examined: usize,
    /// Rows soft-deleted or removed.
    pub affected: usize,
}

/// Mark every live file row whose path no longer exists as soft-deleted.
pub fn soft_delete(
    db: &Database,
    fs: &dyn FileSystem,
    now: DateTime<Utc>,
    token: &CancellationToken,
) -> Result<MaintenanceReport> {
    token.check()?;
    let run_id = db.create_scan_run(Job::SoftDelete.as_str())?;
    let result = (|| -> Result<MaintenanceReport> {
        let files = db.active_files()?;
        let mut missing = Vec::new();
        for (id, path) in &files {
            token.check()?;
            if !fs.exists(path) {
                debug!("Missing: {}", path.display());
                missing.push(*id);
            }
        }
        let affected = db.mark_soft_deleted(&missing, now)?;
        Ok(MaintenanceReport {
            run_id,
            examined: files.len(),
            affected,
        })
    })();
    finish_run(db, run_id, result, "soft delete")
}

/// Remove rows soft-deleted more than `retention_days` days before `now`.
pub fn hard_delete(
    db: &Database,
    retention_days: u32,
    now: DateTime<Utc>,
    token: &CancellationToken,
) -> Result<MaintenanceReport> {
    token.check()?;
    let run_id = db.create_scan_run(Job::HardDelete.as_str())?;
    let cutoff = now - TimeDelta::days(i64::from(retention_days));
    let result = (|| -> Result<MaintenanceReport> {
        let examined = db.soft_deleted_count()?;
        token.check()?;
        let affected = db.purge_soft_deleted(cutoff)?;
        Ok(MaintenanceReport {
            run_id,
            examined,
            affected,
        })
    })();
    finish_run(db, run_id, result, "hard delete")
}

fn finish_run(
    db: &Database,
    run_id: i64,
    result: Result<MaintenanceReport>,
    label: &str,
) -> Result<MaintenanceReport> {
    match result {
        Ok(report) => {
            db.complete_scan_run(run_id, RunStatus::Completed, report.examined, report.affected, None)?;
            info!("{}: {} of {} rows affected", label, report.affected, report.examined);
            Ok(report)
        }
        Err(err) => {
            error!("{} failed: {}", label, err);
            if let Err(e) = db.complete_scan_run(run_id, RunStatus::Failed, 0, 0, Some(&err.to_string())) {
                error!("Error recording failed run {}: {}", run_id, e);
            }
            Err(err)
        }
    }
}
