use ahash::AHashSet;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::classify::handle::FileHandle;

/// Search level given to classifications created from the mapping table.
pub const DEFAULT_SEARCH_LEVEL: i64 = 1;

/// A named tag attachable to files, driven by keyword fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileClassification {
    /// `None` until the classification has been saved.
    pub id: Option<i64>,
    pub name: String,
    pub search_level: i64,
    pub parent_id: Option<i64>,
    pub celebrity: bool,
    pub include_in_search: bool,
    pub file_name_parts: Vec<FileNamePart>,
}

impl FileClassification {
    pub fn new(name: impl Into<String>, celebrity: bool, include_in_search: bool) -> Self {
        Self {
            id: None,
            name: name.into(),
            search_level: DEFAULT_SEARCH_LEVEL,
            parent_id: None,
            celebrity,
            include_in_search,
            file_name_parts: Vec::new(),
        }
    }

    /// Lowercased texts of the fragments this classification owns.
    pub fn part_texts_lowercase(&self) -> AHashSet<String> {
        self.file_name_parts
            .iter()
            .map(|part| part.text.to_lowercase())
            .collect()
    }

    pub fn has_part(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.file_name_parts
            .iter()
            .any(|part| part.text.to_lowercase() == text)
    }
}

/// A keyword fragment owned by one classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNamePart {
    pub text: String,
}

impl FileNamePart {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDetail {
    pub width: u32,
    pub height: u32,
}

/// A file observed under the scan root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDetail {
    pub id: Option<i64>,
    pub directory_name: String,
    pub file_name: String,
    /// Persisted handle for known files; assigned during processing otherwise.
    pub file_handle: Option<FileHandle>,
    pub file_size: i64,
    pub is_image: bool,
    pub image_detail: Option<ImageDetail>,
    pub classification_ids: BTreeSet<i64>,
}

impl FileDetail {
    pub fn new(directory_name: impl Into<String>, file_name: impl Into<String>, file_size: i64) -> Self {
        Self {
            id: None,
            directory_name: directory_name.into(),
            file_name: file_name.into(),
            file_handle: None,
            file_size,
            is_image: false,
            image_detail: None,
            classification_ids: BTreeSet::new(),
        }
    }

    /// `None` when the directory or file name is not valid UTF-8, since
    /// such a row could never be mapped back to the file it describes.
    pub fn from_path(path: &Path, file_size: u64) -> Option<Self> {
        let directory_name = match path.parent() {
            Some(parent) => parent.to_str()?.to_string(),
            None => String::new(),
        };
        let file_name = path.file_name()?.to_str()?.to_string();
        Some(Self::new(directory_name, file_name, file_size as i64))
    }

    pub fn full_name_with_path(&self) -> PathBuf {
        Path::new(&self.directory_name).join(&self.file_name)
    }

    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
    }

    /// Returns `true` when the classification was not attached yet.
    pub fn attach_classification(&mut self, classification_id: i64) -> bool {
        self.classification_ids.insert(classification_id)
    }
}

/// Identity of a file row already in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingFile {
    pub id: i64,
    pub file_handle: FileHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// One execution of a scheduled job.
#[derive(Debug, Clone)]
pub struct ScanRun {
    pub id: i64,
    pub job: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: String,
    pub files_processed: i64,
    pub files_classified: i64,
    pub error: Option<String>,
}

/// Rows written by one `save_changes`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub classifications_inserted: usize,
    pub parts_inserted: usize,
}

impl SaveSummary {
    pub fn is_empty(&self) -> bool {
        self.classifications_inserted == 0 && self.parts_inserted == 0
    }
}

/// Result of flushing a batch of file details.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub files_upserted: usize,
    /// `(full path, handle)` of files rejected by the unique handle index.
    pub handle_conflicts: Vec<(String, String)>,
}
