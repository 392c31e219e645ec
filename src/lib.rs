pub mod cancel;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod maintenance;
pub mod mapping;
pub mod probe;
pub mod progress;
pub mod scanner;
pub mod scheduler;
pub mod storage;
pub mod worker;

pub use cancel::CancellationToken;
pub use config::AppConfig;
pub use engine::{CycleReport, JobReport, ScanEngine};
pub use error::Error;
pub use progress::{ProgressReporter, SilentReporter};
pub use worker::Worker;
