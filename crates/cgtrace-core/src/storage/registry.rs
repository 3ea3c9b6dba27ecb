//! Compact id allocation for hierarchy paths.
//!
//! Events refer to groups by a small integer instead of the full path. Ids are
//! dense: a new path takes the lowest free id. A released id goes back to the
//! free pool, and the scanner only releases after the removal event for the
//! old path has been handed to the emitter.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// First id handed out.
pub const FIRST_ID: u32 = 1;

#[derive(Debug, Default, Clone)]
pub struct PathRegistry {
    ids: HashMap<PathBuf, u32>,
    paths: HashMap<u32, PathBuf>,
    free: BTreeSet<u32>,
    next: u32,
}

impl PathRegistry {
    pub fn new() -> Self {
        Self {
            next: FIRST_ID,
            ..Default::default()
        }
    }

    /// Returns the id for `path`, allocating the lowest free id if the path is
    /// not registered. The flag is `true` when a new id was allocated.
    pub fn resolve(&mut self, path: &Path) -> (u32, bool) {
        if let Some(&id) = self.ids.get(path) {
            return (id, false);
        }

        let id = match self.free.pop_first() {
            Some(id) => id,
            None => {
                let id = self.next;
                self.next += 1;
                id
            }
        };

        self.ids.insert(path.to_path_buf(), id);
        self.paths.insert(id, path.to_path_buf());
        (id, true)
    }

    /// Frees the id bound to `path`. Returns the released id.
    pub fn release(&mut self, path: &Path) -> Option<u32> {
        let id = self.ids.remove(path)?;
        self.paths.remove(&id);
        self.free.insert(id);
        Some(id)
    }

    pub fn id_of(&self, path: &Path) -> Option<u32> {
        self.ids.get(path).copied()
    }

    pub fn path_of(&self, id: u32) -> Option<&Path> {
        self.paths.get(&id).map(|p| p.as_path())
    }

    /// Number of live paths.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_stable() {
        let mut registry = PathRegistry::new();
        let (a, new_a) = registry.resolve(Path::new("/cg/cpu/svc1"));
        let (again, new_again) = registry.resolve(Path::new("/cg/cpu/svc1"));

        assert_eq!(a, FIRST_ID);
        assert!(new_a);
        assert_eq!(again, a);
        assert!(!new_again);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lowest_free_id_is_reused() {
        let mut registry = PathRegistry::new();
        for name in ["a", "b", "c", "d"] {
            registry.resolve(&Path::new("/cg").join(name));
        }

        assert_eq!(registry.release(Path::new("/cg/c")), Some(3));
        assert_eq!(registry.release(Path::new("/cg/a")), Some(1));

        assert_eq!(registry.resolve(Path::new("/cg/e")).0, 1);
        assert_eq!(registry.resolve(Path::new("/cg/f")).0, 3);
        assert_eq!(registry.resolve(Path::new("/cg/g")).0, 5);
    }

    #[test]
    fn test_bijection() {
        let mut registry = PathRegistry::new();
        let (id, _) = registry.resolve(Path::new("/cg/x"));
        assert_eq!(registry.path_of(id), Some(Path::new("/cg/x")));
        assert_eq!(registry.id_of(Path::new("/cg/x")), Some(id));

        registry.release(Path::new("/cg/x"));
        assert_eq!(registry.path_of(id), None);
        assert_eq!(registry.id_of(Path::new("/cg/x")), None);
        assert_eq!(registry.release(Path::new("/cg/x")), None);
        assert!(registry.is_empty());
    }
}
