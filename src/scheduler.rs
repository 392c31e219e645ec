//! Time-of-day scheduling for the worker's jobs.

use chrono::{Local, NaiveDateTime, NaiveTime, TimeDelta};
use std::fmt;
use std::time::Duration;

use crate::config::{Schedule, ServiceToggles};

/// Source of the current local time. Injected so delays can be tested.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn time_of_day(&self) -> NaiveTime {
        self.now().time()
    }
}

/// Wall clock in the local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock stopped at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Delay until the next occurrence of `target`, rolling over to the next day
/// when `target` has already passed today. Zero when the first delay is not
/// honoured.
pub fn calculate_delay(target: NaiveTime, honour_first_delay: bool, clock: &dyn Clock) -> Duration {
    if !honour_first_delay {
        return Duration::ZERO;
    }

    let now = clock.time_of_day();
    let mut delta = target.signed_duration_since(now);
    if target < now {
        delta += TimeDelta::days(1);
    }
    delta.to_std().unwrap_or(Duration::ZERO)
}

/// The scheduled services a worker can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Job {
    NewFiles,
    SoftDelete,
    HardDelete,
}

impl Job {
    pub const ALL: [Job; 3] = [Job::NewFiles, Job::SoftDelete, Job::HardDelete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Job::NewFiles => "new_files",
            Job::SoftDelete => "soft_delete",
            Job::HardDelete => "hard_delete",
        }
    }

    pub fn scheduled_at(&self, schedule: &Schedule) -> NaiveTime {
        match self {
            Job::NewFiles => schedule.new_files,
            Job::SoftDelete => schedule.soft_delete,
            Job::HardDelete => schedule.hard_delete,
        }
    }

    pub fn is_enabled(&self, services: &ServiceToggles) -> bool {
        match self {
            Job::NewFiles => services.new_files,
            Job::SoftDelete => services.soft_delete,
            Job::HardDelete => services.hard_delete,
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The enabled job with the smallest delay. Ties go to the earlier job in
/// [`Job::ALL`] order.
pub fn next_due(
    schedule: &Schedule,
    services: &ServiceToggles,
    clock: &dyn Clock,
) -> Option<(Job, Duration)> {
    Job::ALL
        .iter()
        .filter(|job| job.is_enabled(services))
        .map(|job| (*job, calculate_delay(job.scheduled_at(schedule), true, clock)))
        .min_by_key(|(job, delay)| (*delay, *job))
}
