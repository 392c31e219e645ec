use glob::Pattern;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tracing::error;
use walkdir::WalkDir;

use super::{FileEntry, FileSystem, ReadSeek};
use crate::error::{Error, Result};

/// The real file system. Directories and files matching an ignore glob are
/// skipped; symlinks are not followed.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystem {
    ignore_patterns: Vec<Pattern>,
}

impl LocalFileSystem {
    pub fn new(ignore_globs: &[String]) -> Self {
        let ignore_patterns = ignore_globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();
        Self { ignore_patterns }
    }

    fn is_ignored(&self, path: &Path) -> bool {
        self.ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(path))
    }
}

impl FileSystem for LocalFileSystem {
    fn walk<'a>(&'a self, root: &Path) -> Box<dyn Iterator<Item = Result<FileEntry>> + 'a> {
        let entries = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !self.is_ignored(entry.path()))
            .filter_map(|entry_result| {
                let entry = match entry_result {
                    Ok(entry) => entry,
                    Err(err) => {
                        if err.io_error().map(|e| e.kind()) == Some(io::ErrorKind::PermissionDenied) {
                            error!("Access denied while walking: {}", err);
                            return None;
                        }
                        return Some(Err(Error::Walk(err)));
                    }
                };

                if !entry.file_type().is_file() {
                    return None;
                }

                match entry.metadata() {
                    Ok(metadata) => Some(Ok(FileEntry {
                        path: entry.into_path(),
                        size: metadata.len(),
                    })),
                    Err(err) => Some(Err(Error::Walk(err))),
                }
            });
        Box::new(entries)
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>> {
        Ok(Box::new(File::open(path)?))
    }

    fn exists(&self, path: &Path) -> bool {
        fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
    }
}
