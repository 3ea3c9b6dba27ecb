//! Change detection between two hierarchy snapshots.
//!
//! Events for one cycle come out in a fixed class order:
//!
//! 1. `subsystem_root` for newly discovered (root, name) pairs
//! 2. `path_status` removed
//! 3. `path_status` initial / added
//! 4. `attached_membership`
//! 5. `file_value_*`
//!
//! Inside a class, groups follow path order and files follow name order.

use std::path::{Path, PathBuf};

use crate::storage::PathRegistry;
use crate::storage::model::{
    Event, GroupKey, GroupSnapshot, HierarchySnapshot, PathStatus, Subsystem,
};

/// How events reference groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchemaMode {
    /// Compact ids, bound to paths by `path_status` events.
    #[default]
    IdKeyed,
    /// Every event carries the full path.
    PathKeyed,
}

/// Events of one cycle plus the paths whose ids may be released once the
/// events have been emitted.
#[derive(Debug, Default)]
pub struct CycleDiff {
    pub events: Vec<Event>,
    pub removed: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiffEngine {
    schema: SchemaMode,
}

impl DiffEngine {
    pub fn new(schema: SchemaMode) -> Self {
        Self { schema }
    }

    fn key(&self, registry: &mut PathRegistry, path: &Path) -> GroupKey {
        let (id, _) = registry.resolve(path);
        match self.schema {
            SchemaMode::IdKeyed => GroupKey::Id(id),
            SchemaMode::PathKeyed => GroupKey::Path(path_string(path)),
        }
    }

    /// Computes the minimal ordered event set turning `previous` into
    /// `current`.
    ///
    /// New paths are resolved in the registry while removed paths still hold
    /// their ids, so a path added in the same cycle never receives an id that
    /// is being retired.
    pub fn diff(
        &self,
        previous: &HierarchySnapshot,
        current: &HierarchySnapshot,
        new_subsystems: &[Subsystem],
        registry: &mut PathRegistry,
        first_cycle: bool,
    ) -> CycleDiff {
        let mut out = CycleDiff::default();

        for subsystem in new_subsystems {
            out.events.push(Event::SubsystemRoot {
                root: path_string(&subsystem.root_path),
                subsystem_name: subsystem.name.clone(),
            });
        }

        for path in previous.groups.keys() {
            if current.contains(path) {
                continue;
            }
            let path_id = self.key(registry, path);
            out.events.push(Event::PathStatus {
                path_id,
                path: path_string(path),
                status: PathStatus::Removed,
            });
            out.removed.push(path.clone());
        }

        let status = if first_cycle {
            PathStatus::Initial
        } else {
            PathStatus::Added
        };
        for path in current.groups.keys() {
            if previous.contains(path) {
                continue;
            }
            let path_id = self.key(registry, path);
            out.events.push(Event::PathStatus {
                path_id,
                path: path_string(path),
                status,
            });
        }

        let empty = GroupSnapshot::default();
        for (path, group) in &current.groups {
            let before = previous.get(path).unwrap_or(&empty);
            if before.attached_pids != group.attached_pids {
                out.events.push(Event::AttachedMembership {
                    path_id: self.key(registry, path),
                    pids: group.attached_pids.iter().copied().collect(),
                });
            }
        }

        for (path, group) in &current.groups {
            let before = previous.get(path);
            for (filename, state) in &group.files {
                let unchanged = before
                    .and_then(|b| b.files.get(filename))
                    .is_some_and(|old| old.value == state.value);
                if unchanged {
                    continue;
                }
                let path_id = self.key(registry, path);
                for record in &state.value.records {
                    out.events
                        .push(Event::file_value(path_id.clone(), filename, record));
                }
            }
        }

        out
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
