pub mod handle;
pub mod pattern;
pub mod processor;
pub mod sync;

pub use handle::{generate_handle, slugify, FileHandle, HandleLedger};
pub use pattern::KeywordPattern;
pub use processor::{sanitize_path, FileOutcome, FileProcessor, ImageOutcome, ScanCounters};
pub use sync::{ClassificationSynchronizer, RetryPolicy, SyncSummary};
