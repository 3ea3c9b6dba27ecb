//! Abstractions for filesystem access to enable testing and mocking.
//!
//! The `FileSystem` trait allows the scanner to work with both the real cgroup
//! mounts on Linux and in-memory fixtures for testing on macOS or in CI.

use std::io;
use std::path::{Path, PathBuf};

/// Default location of the mount table.
pub const DEFAULT_MOUNTS_PATH: &str = "/proc/self/mountinfo";

/// Kind of a directory entry, as reported without following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
    Symlink,
    Other,
}

/// A single entry returned by [`FileSystem::read_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn new(path: impl Into<PathBuf>, kind: EntryKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Final path component as UTF-8, if it is valid UTF-8.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Abstraction for filesystem operations.
///
/// This is the only capability the scanner needs from the kernel: list a
/// directory, read a file, read the mount table. Everything else is derived.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Checks if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Lists entries in a directory. Entry kinds must not follow symlinks.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Reads the mount table.
    fn read_mounts(&self) -> io::Result<String> {
        self.read_to_string(Path::new(DEFAULT_MOUNTS_PATH))
    }
}

impl<T: FileSystem + ?Sized> FileSystem for std::sync::Arc<T> {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        (**self).read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        (**self).read_dir(path)
    }

    fn read_mounts(&self) -> io::Result<String> {
        (**self).read_mounts()
    }
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Clone)]
pub struct RealFs {
    mounts_path: PathBuf,
}

impl Default for RealFs {
    fn default() -> Self {
        Self::new()
    }
}

impl RealFs {
    /// Creates a `RealFs` reading the mount table from `/proc/self/mountinfo`.
    pub fn new() -> Self {
        Self {
            mounts_path: PathBuf::from(DEFAULT_MOUNTS_PATH),
        }
    }

    /// Overrides the mount table location (e.g. `/proc/mounts`).
    pub fn with_mounts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.mounts_path = path.into();
        self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let entries = std::fs::read_dir(path)?;
        let mut result = Vec::new();
        for entry in entries {
            let entry = entry?;
            // DirEntry::file_type does not traverse symlinks.
            let file_type = entry.file_type()?;
            let kind = if file_type.is_symlink() {
                EntryKind::Symlink
            } else if file_type.is_dir() {
                EntryKind::Dir
            } else if file_type.is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };
            result.push(DirEntry::new(entry.path(), kind));
        }
        Ok(result)
    }

    fn read_mounts(&self) -> io::Result<String> {
        std::fs::read_to_string(&self.mounts_path)
    }
}
