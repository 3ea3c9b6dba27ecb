//! Depth-first enumeration of the groups under a subsystem root.
//!
//! The hierarchy changes under our feet: a directory listed by its parent may
//! be gone by the time it is entered. That is not an error; the group simply
//! does not appear in this cycle's result.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{trace, warn};

use crate::collector::traits::{EntryKind, FileSystem};

/// A group directory and the regular files it contained when listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedGroup {
    pub path: PathBuf,
    pub files: Vec<String>,
}

/// Result of walking one root.
#[derive(Debug, Clone, Default)]
pub struct WalkOutcome {
    /// Groups in deterministic pre-order (root first, children sorted).
    pub groups: Vec<WalkedGroup>,
    /// Directories whose listing failed for a reason other than removal.
    /// Their descendants are unknown for this cycle.
    pub incomplete: Vec<PathBuf>,
    /// Listings that timed out.
    pub timeouts: usize,
    /// The root itself could not be listed.
    pub root_unreadable: bool,
}

/// The walk was interrupted by the shutdown flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("scan cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Walks every directory below `root` without following symlinks.
pub fn walk<F: FileSystem + ?Sized>(
    fs: &F,
    root: &Path,
    shutdown: &AtomicBool,
) -> Result<WalkOutcome, Cancelled> {
    let mut outcome = WalkOutcome::default();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        if shutdown.load(Ordering::Relaxed) {
            return Err(Cancelled);
        }

        let entries = match fs.read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if dir == root {
                    warn!("Cgroup root {} not found", root.display());
                    outcome.root_unreadable = true;
                } else {
                    trace!("{} vanished during walk", dir.display());
                }
                continue;
            }
            Err(e) => {
                if e.kind() == io::ErrorKind::TimedOut {
                    outcome.timeouts += 1;
                    warn!("Listing {} timed out", dir.display());
                } else if dir == root {
                    warn!("Cgroup root {} unreadable: {}", root.display(), e);
                    outcome.root_unreadable = true;
                    continue;
                } else {
                    warn!("Cannot list {}: {}", dir.display(), e);
                }
                outcome.groups.push(WalkedGroup {
                    path: dir.clone(),
                    files: Vec::new(),
                });
                outcome.incomplete.push(dir);
                continue;
            }
        };

        let mut files = Vec::new();
        let mut children = Vec::new();
        for entry in entries {
            if !entry.path.starts_with(root) {
                continue;
            }
            match entry.kind {
                EntryKind::Dir => children.push(entry.path),
                EntryKind::File => {
                    if let Some(name) = entry.file_name() {
                        files.push(name.to_string());
                    }
                }
                EntryKind::Symlink | EntryKind::Other => {}
            }
        }
        files.sort();
        children.sort();

        outcome.groups.push(WalkedGroup { path: dir, files });
        stack.extend(children.into_iter().rev());
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockFs;
    use crate::collector::timeout::TimeoutFs;
    use std::time::Duration;

    fn paths(outcome: &WalkOutcome) -> Vec<String> {
        outcome
            .groups
            .iter()
            .map(|g| g.path.to_string_lossy().into_owned())
            .collect()
    }

    fn hierarchy() -> MockFs {
        let fs = MockFs::new();
        fs.add_file("/cg/cpu/cgroup.procs", "1\n");
        fs.add_file("/cg/cpu/cpu.shares", "1024\n");
        fs.add_file("/cg/cpu/svc2/cgroup.procs", "");
        fs.add_file("/cg/cpu/svc1/cgroup.procs", "");
        fs.add_file("/cg/cpu/svc1/inner/cgroup.procs", "");
        fs
    }

    #[test]
    fn test_walk_preorder_sorted() {
        let fs = hierarchy();
        let outcome = walk(&fs, Path::new("/cg/cpu"), &AtomicBool::new(false)).unwrap();

        assert_eq!(
            paths(&outcome),
            vec!["/cg/cpu", "/cg/cpu/svc1", "/cg/cpu/svc1/inner", "/cg/cpu/svc2"]
        );
        assert_eq!(outcome.groups[0].files, vec!["cgroup.procs", "cpu.shares"]);
        assert!(outcome.incomplete.is_empty());
        assert!(!outcome.root_unreadable);
    }

    #[test]
    fn test_vanished_directory_is_excluded() {
        let fs = hierarchy();
        fs.vanish_on_enter("/cg/cpu/svc1");

        let outcome = walk(&fs, Path::new("/cg/cpu"), &AtomicBool::new(false)).unwrap();
        assert_eq!(paths(&outcome), vec!["/cg/cpu", "/cg/cpu/svc2"]);
        assert!(outcome.incomplete.is_empty());
    }

    #[test]
    fn test_symlinks_are_not_followed() {
        let fs = hierarchy();
        fs.add_file("/etc/cgroup.procs", "1\n");
        fs.add_symlink("/cg/cpu/escape", "/etc");

        let outcome = walk(&fs, Path::new("/cg/cpu"), &AtomicBool::new(false)).unwrap();
        assert!(!paths(&outcome).iter().any(|p| p.contains("escape")));
    }

    #[test]
    fn test_missing_root_contributes_nothing() {
        let fs = MockFs::new();
        let outcome = walk(&fs, Path::new("/cg/none"), &AtomicBool::new(false)).unwrap();
        assert!(outcome.groups.is_empty());
        assert!(outcome.root_unreadable);
    }

    #[test]
    fn test_timed_out_listing_is_incomplete() {
        let mock = hierarchy();
        mock.stall("/cg/cpu/svc1", Duration::from_secs(3));
        let fs = TimeoutFs::new(mock, Duration::from_millis(200));

        let outcome = walk(&fs, Path::new("/cg/cpu"), &AtomicBool::new(false)).unwrap();
        assert_eq!(outcome.timeouts, 1);
        assert_eq!(outcome.incomplete, vec![PathBuf::from("/cg/cpu/svc1")]);
        assert_eq!(paths(&outcome), vec!["/cg/cpu", "/cg/cpu/svc1", "/cg/cpu/svc2"]);
    }

    #[test]
    fn test_shutdown_cancels_walk() {
        let fs = hierarchy();
        let result = walk(&fs, Path::new("/cg/cpu"), &AtomicBool::new(true));
        assert_eq!(result.unwrap_err(), Cancelled);
    }
}
