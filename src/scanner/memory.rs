use std::collections::BTreeMap;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{FileEntry, FileSystem, ReadSeek};
use crate::error::Result;

/// An in-memory file tree. Cloned `Arc`s share the same files, so a test can
/// change the tree between scans of an engine that owns it.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: RwLock<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<P, I>(files: I) -> Self
    where
        P: Into<PathBuf>,
        I: IntoIterator<Item = (P, Vec<u8>)>,
    {
        let fs = Self::new();
        for (path, contents) in files {
            fs.add_file(path, contents);
        }
        fs
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        self.write().insert(path.into(), contents.into());
    }

    pub fn remove_file(&self, path: &Path) -> bool {
        self.write().remove(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<PathBuf, Vec<u8>>> {
        self.files.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<PathBuf, Vec<u8>>> {
        self.files.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FileSystem for MemoryFileSystem {
    fn walk<'a>(&'a self, root: &Path) -> Box<dyn Iterator<Item = Result<FileEntry>> + 'a> {
        let entries: Vec<Result<FileEntry>> = self
            .read()
            .iter()
            .filter(|(path, _)| path.starts_with(root))
            .map(|(path, contents)| {
                Ok(FileEntry {
                    path: path.clone(),
                    size: contents.len() as u64,
                })
            })
            .collect();
        Box::new(entries.into_iter())
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>> {
        match self.read().get(path) {
            Some(contents) => Ok(Box::new(Cursor::new(contents.clone()))),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.read().contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_walk_filters_by_root() {
        let fs = MemoryFileSystem::with_files([
            ("/pics/b.jpg", b"b".to_vec()),
            ("/pics/a.jpg", b"aa".to_vec()),
            ("/docs/c.txt", b"c".to_vec()),
        ]);
        let entries: Vec<FileEntry> = fs.walk(Path::new("/pics")).map(|e| e.unwrap()).collect();
        assert_eq!(
            entries,
            vec![
                FileEntry { path: PathBuf::from("/pics/a.jpg"), size: 2 },
                FileEntry { path: PathBuf::from("/pics/b.jpg"), size: 1 },
            ]
        );
    }

    #[test]
    fn test_open_and_remove() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/a.txt", "hello");

        let mut contents = String::new();
        fs.open(Path::new("/a.txt"))
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "hello");

        assert!(fs.remove_file(Path::new("/a.txt")));
        assert!(!fs.exists(Path::new("/a.txt")));
        let err = fs.open(Path::new("/a.txt")).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
