//! In-memory mock filesystem for testing the scanner without a real cgroup mount.
//!
//! `MockFs` simulates a filesystem in memory. Clones share the same state, so a
//! test can hand one clone to a `Scanner` and keep mutating the hierarchy
//! through another between scan cycles.

use crate::collector::traits::{DirEntry, EntryKind, FileSystem};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct MockState {
    /// Map from path to file contents.
    files: BTreeMap<PathBuf, String>,
    /// Set of directories (for read_dir support).
    directories: BTreeSet<PathBuf>,
    /// Symlink path -> target.
    symlinks: BTreeMap<PathBuf, PathBuf>,
    /// Mount table content; `None` makes `read_mounts` fail.
    mounts: Option<String>,
    /// Directories that are listed by their parent but fail with NotFound
    /// when entered, simulating removal between listing and entering.
    vanishing: HashSet<PathBuf>,
    /// Paths whose reads block for the given duration.
    stalls: BTreeMap<PathBuf, Duration>,
}

/// In-memory filesystem for testing.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    state: Arc<RwLock<MockState>>,
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("not found: {:?}", path),
    )
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MockState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MockState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn add_parents(state: &mut MockState, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                state.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }

    /// Adds a file with the given content. Parent directories are created.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        let mut state = self.write();
        Self::add_parents(&mut state, &path);
        state.files.insert(path, content.into());
    }

    /// Adds an empty directory. Parent directories are created.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        let mut state = self.write();
        Self::add_parents(&mut state, &path);
        state.directories.insert(path);
    }

    /// Adds a symlink entry pointing at `target`. The target is never read.
    pub fn add_symlink(&self, path: impl AsRef<Path>, target: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        let mut state = self.write();
        Self::add_parents(&mut state, &path);
        state.symlinks.insert(path, target.as_ref().to_path_buf());
    }

    /// Removes a file or a whole directory subtree.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut state = self.write();
        state.files.retain(|p, _| !p.starts_with(path));
        state.directories.retain(|p| !p.starts_with(path));
        state.symlinks.retain(|p, _| !p.starts_with(path));
    }

    /// Sets the mount table returned by `read_mounts`.
    pub fn set_mounts(&self, content: impl Into<String>) {
        self.write().mounts = Some(content.into());
    }

    /// Makes `read_mounts` fail.
    pub fn clear_mounts(&self) {
        self.write().mounts = None;
    }

    /// Keeps `path` visible in its parent's listing but fails any access
    /// below it with `NotFound`.
    pub fn vanish_on_enter(&self, path: impl AsRef<Path>) {
        self.write().vanishing.insert(path.as_ref().to_path_buf());
    }

    /// Makes reads of `path` (file or directory listing) block for `delay`.
    pub fn stall(&self, path: impl AsRef<Path>, delay: Duration) {
        self.write().stalls.insert(path.as_ref().to_path_buf(), delay);
    }

    fn maybe_stall(&self, path: &Path) {
        let delay = self.read().stalls.get(path).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
    }

    fn is_vanished(state: &MockState, path: &Path) -> bool {
        state.vanishing.iter().any(|v| path.starts_with(v))
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.maybe_stall(path);
        let state = self.read();
        if Self::is_vanished(&state, path) {
            return Err(not_found(path));
        }
        state.files.get(path).cloned().ok_or_else(|| not_found(path))
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.read();
        state.files.contains_key(path)
            || state.directories.contains(path)
            || state.symlinks.contains_key(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        self.maybe_stall(path);
        let state = self.read();
        if !state.directories.contains(path) || Self::is_vanished(&state, path) {
            return Err(not_found(path));
        }

        let is_child = |p: &Path| p.parent().is_some_and(|parent| parent == path);

        let mut entries = Vec::new();
        for file_path in state.files.keys().filter(|p| is_child(p)) {
            entries.push(DirEntry::new(file_path.clone(), EntryKind::File));
        }
        for dir_path in state.directories.iter().filter(|p| is_child(p)) {
            entries.push(DirEntry::new(dir_path.clone(), EntryKind::Dir));
        }
        for link_path in state.symlinks.keys().filter(|p| is_child(p)) {
            entries.push(DirEntry::new(link_path.clone(), EntryKind::Symlink));
        }

        Ok(entries)
    }

    fn read_mounts(&self) -> io::Result<String> {
        self.read().mounts.clone().ok_or_else(|| {
            io::Error::new(io::ErrorKind::PermissionDenied, "mount table unreadable")
        })
    }
}
