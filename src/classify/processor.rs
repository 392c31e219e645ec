use std::path::Path;
use tracing::{debug, info, warn};

use super::handle::{generate_handle, HandleLedger};
use super::pattern::KeywordPattern;
use crate::config::AppConfig;
use crate::error::ImageDecodeError;
use crate::probe::probe_dimensions;
use crate::scanner::FileSystem;
use crate::storage::models::{FileDetail, ImageDetail};

/// Running totals for one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanCounters {
    pub files_processed: usize,
    pub files_classified: usize,
    pub handles_generated: usize,
    pub images: usize,
    pub image_failures: usize,
    /// Entries left out because their path is not valid UTF-8.
    pub files_skipped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageOutcome {
    #[default]
    NotImage,
    Probed(ImageDetail),
    DecodeFailed,
}

/// What processing did to one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileOutcome {
    pub matches: Vec<String>,
    pub attached: usize,
    pub handle_generated: bool,
    pub image: ImageOutcome,
}

/// Normalize a path for matching: backslashes become `/`, control
/// characters and characters invalid in file names become spaces.
pub fn sanitize_path(path: &str) -> String {
    path.chars()
        .map(|c| match c {
            '\\' => '/',
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => ' ',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect()
}

pub struct FileProcessor<'a> {
    pattern: &'a KeywordPattern,
    config: &'a AppConfig,
    progress_interval: usize,
}

impl<'a> FileProcessor<'a> {
    pub fn new(pattern: &'a KeywordPattern, config: &'a AppConfig) -> Self {
        Self {
            pattern,
            config,
            progress_interval: config.progress_interval.max(1),
        }
    }

    fn is_image(&self, detail: &FileDetail) -> bool {
        detail
            .extension()
            .is_some_and(|ext| self.config.is_image_extension(ext))
    }

    /// Classify one file, assign its handle and probe image dimensions.
    /// Per-file failures are logged and never abort the run.
    pub fn process_file(
        &self,
        detail: &mut FileDetail,
        ledger: &mut HandleLedger,
        counters: &mut ScanCounters,
        fs: &dyn FileSystem,
    ) -> FileOutcome {
        let mut outcome = FileOutcome::default();
        let full_path = detail.full_name_with_path();
        let sanitized = sanitize_path(&full_path.to_string_lossy());

        outcome.matches = self.pattern.matches(&sanitized);
        if !outcome.matches.is_empty() {
            for classification_id in self.pattern.classifications_in(&sanitized) {
                if detail.attach_classification(classification_id) {
                    outcome.attached += 1;
                }
            }
            debug!(
                "{} matched {:?}, {} classifications",
                sanitized,
                outcome.matches,
                detail.classification_ids.len()
            );
        }
        if !detail.classification_ids.is_empty() {
            counters.files_classified += 1;
        }

        if detail.file_handle.is_none() {
            detail.file_handle = Some(generate_handle(detail, ledger));
            outcome.handle_generated = true;
            counters.handles_generated += 1;
        }

        if self.is_image(detail) {
            detail.is_image = true;
            counters.images += 1;
            outcome.image = match read_dimensions(fs, &full_path) {
                Ok(image) => {
                    detail.image_detail = Some(image);
                    ImageOutcome::Probed(image)
                }
                Err(err) => {
                    warn!("{}", err);
                    detail.image_detail = None;
                    counters.image_failures += 1;
                    ImageOutcome::DecodeFailed
                }
            };
        }

        counters.files_processed += 1;
        if counters.files_processed % self.progress_interval == 0 {
            info!(
                "Processed {} files ({} classified, {} images)",
                counters.files_processed, counters.files_classified, counters.images
            );
        }
        outcome
    }
}

fn read_dimensions(fs: &dyn FileSystem, path: &Path) -> Result<ImageDetail, ImageDecodeError> {
    let reader = fs.open(path).map_err(|source| ImageDecodeError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    probe_dimensions(path, reader)
}
