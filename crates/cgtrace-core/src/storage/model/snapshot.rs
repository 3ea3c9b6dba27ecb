//! Snapshot structures held between scan cycles.
//!
//! A `HierarchySnapshot` is built from scratch every cycle and replaces the
//! previous one wholesale once the cycle has been emitted. Nothing in here is
//! mutated across cycles.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::value::ParsedFile;

/// A resource controller mounted at a root.
///
/// Co-mounted controllers share a root and appear as separate records.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Subsystem {
    pub name: String,
    pub root_path: PathBuf,
}

impl Subsystem {
    pub fn new(name: impl Into<String>, root_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root_path: root_path.into(),
        }
    }
}

/// Parsed value of one control file plus the fingerprint of the raw bytes
/// it was parsed from.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct FileState {
    /// xxh3 of the raw content.
    pub hash: u64,
    pub value: ParsedFile,
}

/// State of a single group at the end of a cycle.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub struct GroupSnapshot {
    pub attached_pids: BTreeSet<u32>,
    /// Allow-listed control files keyed by file name.
    pub files: BTreeMap<String, FileState>,
}

/// Every group of every root, keyed by absolute path.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub struct HierarchySnapshot {
    pub timestamp: i64,
    pub groups: BTreeMap<PathBuf, GroupSnapshot>,
}

impl HierarchySnapshot {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            groups: BTreeMap::new(),
        }
    }

    pub fn get(&self, path: &Path) -> Option<&GroupSnapshot> {
        self.groups.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.groups.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Groups strictly below `dir`.
    pub fn descendants<'a>(
        &'a self,
        dir: &'a Path,
    ) -> impl Iterator<Item = (&'a PathBuf, &'a GroupSnapshot)> + 'a {
        self.groups
            .range::<Path, _>((std::ops::Bound::Excluded(dir), std::ops::Bound::Unbounded))
            .take_while(move |(p, _)| p.starts_with(dir))
    }
}
