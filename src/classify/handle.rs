//! Unique, identifier-safe handles derived from file names.

use ahash::AHashSet;
use std::fmt;
use uuid::Uuid;

use crate::storage::models::FileDetail;

pub const MAX_HANDLE_LENGTH: usize = 350;

const FALLBACK_SLUG: &str = "file";

/// A bounded-length slug identifying one file. Equality is by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileHandle(String);

impl FileHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for FileHandle {
    fn from(value: String) -> Self {
        FileHandle(value)
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handles already assigned in the current run, in assignment order.
#[derive(Debug, Clone, Default)]
pub struct HandleLedger {
    order: Vec<FileHandle>,
    seen: AHashSet<FileHandle>,
}

impl HandleLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, handle: &FileHandle) -> bool {
        self.seen.contains(handle)
    }

    /// Returns `false` if the handle was already recorded.
    pub fn record(&mut self, handle: FileHandle) -> bool {
        if self.seen.insert(handle.clone()) {
            self.order.push(handle);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileHandle> {
        self.order.iter()
    }
}

impl FromIterator<FileHandle> for HandleLedger {
    fn from_iter<I: IntoIterator<Item = FileHandle>>(handles: I) -> Self {
        let mut ledger = HandleLedger::new();
        for handle in handles {
            ledger.record(handle);
        }
        ledger
    }
}

/// Characters that cannot appear in a file name on any supported platform.
fn is_invalid_file_name_char(c: char) -> bool {
    c.is_control() || matches!(c, '"' | '<' | '>' | '|' | ':' | '*' | '?' | '\\' | '/')
}

fn is_separator_char(c: char) -> bool {
    is_invalid_file_name_char(c)
        || c.is_whitespace()
        || matches!(c, '_' | '(' | ')' | '+' | ',' | '.')
}

/// Lowercase slug of a file name: separators become `-`, runs of `-`
/// collapse to one, and a leading `-` is dropped.
pub fn slugify(file_name: &str) -> String {
    let mut slug = String::with_capacity(file_name.len());
    for c in file_name.chars() {
        if is_separator_char(c) || c == '-' {
            if !slug.ends_with('-') {
                slug.push('-');
            }
        } else {
            slug.extend(c.to_lowercase());
        }
    }
    match slug.strip_prefix('-') {
        Some(rest) => rest.to_string(),
        None => slug,
    }
}

fn truncate(value: &str) -> String {
    value.chars().take(MAX_HANDLE_LENGTH).collect()
}

/// Generate the handle for `detail`, record it in `ledger`, and return it.
///
/// A slug already in the ledger gets a version-7 UUID prefix, so whichever
/// file is processed first keeps the plain slug.
pub fn generate_handle(detail: &FileDetail, ledger: &mut HandleLedger) -> FileHandle {
    let mut slug = slugify(&detail.file_name);
    if slug.is_empty() {
        slug = FALLBACK_SLUG.to_string();
    }

    let mut handle = FileHandle(truncate(&slug));
    while ledger.contains(&handle) {
        handle = FileHandle(truncate(&format!("{}-{}", Uuid::now_v7(), slug)));
    }

    ledger.record(handle.clone());
    handle
}
