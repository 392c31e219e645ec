pub mod memory;
pub mod walk;

pub use memory::MemoryFileSystem;
pub use walk::LocalFileSystem;

use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// A regular file found under the scan root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub size: u64,
}

pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// The file-system operations the engine needs.
pub trait FileSystem: Send + Sync {
    /// Regular files under `root`, recursively, in a stable order.
    fn walk<'a>(&'a self, root: &Path) -> Box<dyn Iterator<Item = Result<FileEntry>> + 'a>;

    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>>;

    fn exists(&self, path: &Path) -> bool;
}
