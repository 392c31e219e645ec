//! The long-running background loop: wait for the next scheduled job, run
//! it, and go back to waiting.

use chrono::{NaiveDateTime, TimeDelta};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::cancel::CancellationToken;
use crate::config::{Schedule, ServiceToggles};
use crate::engine::{JobReport, ScanEngine};
use crate::error::{Error, Result};
use crate::progress::ProgressReporter;
use crate::scheduler::{next_due, Clock, Job};

const ONE_DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Waiting,
    Scanning(Job),
}

pub struct Worker {
    engine: ScanEngine,
    clock: Arc<dyn Clock>,
    schedule: Schedule,
    services: ServiceToggles,
    state: WorkerState,
    /// Jobs to run without waiting, at startup when the first delay is not
    /// honoured.
    immediate: VecDeque<Job>,
    last_run: Option<(Job, NaiveDateTime)>,
}

impl Worker {
    pub fn new(engine: ScanEngine, clock: Arc<dyn Clock>) -> Result<Self> {
        let config = engine.config();
        let schedule = config.schedule()?;
        let services = config.services.clone();
        let immediate = if config.honour_first_delay {
            VecDeque::new()
        } else {
            Job::ALL
                .iter()
                .copied()
                .filter(|job| job.is_enabled(&services))
                .collect()
        };
        Ok(Self {
            engine,
            clock,
            schedule,
            services,
            state: WorkerState::Waiting,
            immediate,
            last_run: None,
        })
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn engine(&self) -> &ScanEngine {
        &self.engine
    }

    /// The next job and how long to wait for it, or `None` when no service
    /// is enabled.
    ///
    /// A job that just ran at its scheduled instant is pushed to the next
    /// day instead of being run again at once.
    pub fn next_job(&mut self) -> Option<(Job, Duration)> {
        if let Some(job) = self.immediate.pop_front() {
            return Some((job, Duration::ZERO));
        }

        let (job, delay) = next_due(&self.schedule, &self.services, self.clock.as_ref())?;
        if !delay.is_zero() || !self.just_ran(job) {
            return Some((job, delay));
        }

        let mut others = self.services.clone();
        match job {
            Job::NewFiles => others.new_files = false,
            Job::SoftDelete => others.soft_delete = false,
            Job::HardDelete => others.hard_delete = false,
        }
        match next_due(&self.schedule, &others, self.clock.as_ref()) {
            Some((other, other_delay)) if other_delay < ONE_DAY => Some((other, other_delay)),
            _ => Some((job, ONE_DAY)),
        }
    }

    fn just_ran(&self, job: Job) -> bool {
        match self.last_run {
            Some((last_job, at)) => {
                last_job == job && self.clock.now() - at < TimeDelta::minutes(1)
            }
            None => false,
        }
    }

    /// Wait for the next job and run it. Returns `Ok(None)` when cancelled
    /// while waiting or when nothing is enabled.
    pub fn step(
        &mut self,
        reporter: &dyn ProgressReporter,
        token: &CancellationToken,
    ) -> Result<Option<Job>> {
        self.state = WorkerState::Waiting;
        let Some((job, delay)) = self.next_job() else {
            warn!("No services enabled, worker has nothing to do");
            return Ok(None);
        };

        info!("Next job: {} in {}", job, format_delay(delay));
        reporter.on_waiting(job, delay.as_secs());
        if !token.sleep(delay) {
            return Ok(None);
        }

        self.state = WorkerState::Scanning(job);
        let result = self.engine.run_job(job, reporter, token);
        self.last_run = Some((job, self.clock.now()));
        self.state = WorkerState::Waiting;

        match result {
            Ok(JobReport::Scan(report)) => info!(
                "{} finished: {} files processed, {} classified",
                job, report.counters.files_processed, report.counters.files_classified
            ),
            Ok(JobReport::Maintenance(report)) => info!(
                "{} finished: {} of {} rows affected",
                job, report.affected, report.examined
            ),
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(err) => error!("{} failed: {}", job, err),
        }
        Ok(Some(job))
    }

    /// Run until the token is cancelled. A failed job is logged and the
    /// worker goes back to waiting.
    pub fn run(&mut self, reporter: &dyn ProgressReporter, token: &CancellationToken) -> Result<()> {
        info!("Worker started");
        loop {
            match self.step(reporter, token) {
                Ok(Some(_)) => continue,
                Ok(None) | Err(Error::Cancelled) => break,
                Err(err) => return Err(err),
            }
        }
        info!("Worker stopped");
        Ok(())
    }
}

fn format_delay(delay: Duration) -> String {
    let secs = delay.as_secs();
    format!("{}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}
