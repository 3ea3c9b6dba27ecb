//! Reads the current state of a single group.
//!
//! Control files are fingerprinted with xxh3 before parsing. When the bytes
//! are identical to the previous cycle the previous parsed value is reused
//! as is, so a steady hierarchy costs one read per file and no parsing.

use std::collections::BTreeMap;
use std::io;

use tracing::{debug, trace};
use xxhash_rust::xxh3::xxh3_64;

use super::files::{PROCS_FILE, kind_of};
use super::parser::{DeviceRecordMode, parse_file, parse_pids};
use super::walker::WalkedGroup;
use crate::collector::traits::FileSystem;
use crate::storage::model::{FileState, GroupSnapshot};

/// Outcome of reading one group.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupRead {
    Present(GroupState),
    /// `cgroup.procs` disappeared: the group was removed mid-cycle.
    Vanished,
}

/// A group's snapshot plus the failures met while building it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupState {
    pub snapshot: GroupSnapshot,
    pub parse_errors: usize,
    pub read_timeouts: usize,
}

impl GroupState {
    fn note_error(&mut self, e: &io::Error) {
        if e.kind() == io::ErrorKind::TimedOut {
            self.read_timeouts += 1;
        }
    }
}

/// Reads membership and every allow-listed control file of `group`.
///
/// Any file that cannot be read or parsed keeps the value it had in
/// `previous`, or is left out when there was none.
pub fn read_group<F: FileSystem + ?Sized>(
    fs: &F,
    group: &WalkedGroup,
    previous: Option<&GroupSnapshot>,
    mode: DeviceRecordMode,
) -> GroupRead {
    let mut state = GroupState::default();
    let held_pids = || previous.map(|p| p.attached_pids.clone()).unwrap_or_default();

    let procs = group.path.join(PROCS_FILE);
    state.snapshot.attached_pids = match fs.read_to_string(&procs) {
        Ok(content) => match parse_pids(&content) {
            Ok(pids) => pids,
            Err(e) => {
                debug!("{}: {}", procs.display(), e);
                state.parse_errors += 1;
                held_pids()
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            // Listed a moment ago and gone now.
            if group.files.iter().any(|f| f == PROCS_FILE) {
                trace!("{} vanished before its members were read", group.path.display());
                return GroupRead::Vanished;
            }
            held_pids()
        }
        Err(e) => {
            debug!("Cannot read {}: {}", procs.display(), e);
            state.note_error(&e);
            held_pids()
        }
    };

    let mut files = BTreeMap::new();
    for name in &group.files {
        let Some(kind) = kind_of(name) else {
            continue;
        };
        let held = previous.and_then(|p| p.files.get(name));
        let path = group.path.join(name);

        let content = match fs.read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!("Cannot read {}: {}", path.display(), e);
                }
                state.note_error(&e);
                if let Some(held) = held {
                    files.insert(name.clone(), held.clone());
                }
                continue;
            }
        };

        let hash = xxh3_64(content.as_bytes());
        if let Some(held) = held
            && held.hash == hash
        {
            files.insert(name.clone(), held.clone());
            continue;
        }

        match parse_file(kind, mode, &content) {
            Ok(value) => {
                files.insert(name.clone(), FileState { hash, value });
            }
            Err(e) => {
                debug!("{}: {}", path.display(), e);
                state.parse_errors += 1;
                if let Some(held) = held {
                    files.insert(name.clone(), held.clone());
                }
            }
        }
    }
    state.snapshot.files = files;

    GroupRead::Present(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MockFs;
    use crate::collector::timeout::TimeoutFs;
    use crate::storage::model::{ParsedFile, ParsedValue};
    use std::path::PathBuf;
    use std::time::Duration;

    fn walked(path: &str, files: &[&str]) -> WalkedGroup {
        WalkedGroup {
            path: PathBuf::from(path),
            files: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn present(read: GroupRead) -> GroupState {
        match read {
            GroupRead::Present(state) => state,
            GroupRead::Vanished => panic!("group unexpectedly vanished"),
        }
    }

    #[test]
    fn test_reads_pids_and_allow_listed_files() {
        let fs = MockFs::new();
        fs.add_file("/cg/cpu/svc1/cgroup.procs", "42\n7\n");
        fs.add_file("/cg/cpu/svc1/cpu.shares", "1024\n");
        fs.add_file("/cg/cpu/svc1/cpu.stat", "nr_periods 0\n");

        let group = walked("/cg/cpu/svc1", &["cgroup.procs", "cpu.shares", "cpu.stat"]);
        let state = present(read_group(&fs, &group, None, DeviceRecordMode::Opaque));

        assert_eq!(
            state.snapshot.attached_pids.iter().copied().collect::<Vec<_>>(),
            vec![7, 42]
        );
        assert_eq!(state.snapshot.files.len(), 1);
        assert_eq!(
            state.snapshot.files["cpu.shares"].value,
            ParsedFile::single(ParsedValue::Integer(1024))
        );
        assert_eq!(state.parse_errors, 0);
    }

    #[test]
    fn test_missing_procs_means_vanished() {
        let fs = MockFs::new();
        fs.add_file("/cg/cpu/svc1/cpu.shares", "1024\n");
        let group = walked("/cg/cpu/svc1", &["cgroup.procs", "cpu.shares"]);

        assert_eq!(
            read_group(&fs, &group, None, DeviceRecordMode::Opaque),
            GroupRead::Vanished
        );
    }

    #[test]
    fn test_parse_error_holds_previous_value() {
        let fs = MockFs::new();
        fs.add_file("/cg/cpu/svc1/cgroup.procs", "");
        fs.add_file("/cg/cpu/svc1/cpu.shares", "1024\n");
        let group = walked("/cg/cpu/svc1", &["cgroup.procs", "cpu.shares"]);

        let first = present(read_group(&fs, &group, None, DeviceRecordMode::Opaque));

        fs.add_file("/cg/cpu/svc1/cpu.shares", "garbage\n");
        let second = present(read_group(
            &fs,
            &group,
            Some(&first.snapshot),
            DeviceRecordMode::Opaque,
        ));
        assert_eq!(second.parse_errors, 1);
        assert_eq!(second.snapshot, first.snapshot);
    }

    #[test]
    fn test_parse_error_without_history_leaves_file_absent() {
        let fs = MockFs::new();
        fs.add_file("/cg/cpu/svc1/cgroup.procs", "1\n");
        fs.add_file("/cg/cpu/svc1/cpu.cfs_quota_us", "lots\n");
        let group = walked("/cg/cpu/svc1", &["cgroup.procs", "cpu.cfs_quota_us"]);

        let state = present(read_group(&fs, &group, None, DeviceRecordMode::Opaque));
        assert!(state.snapshot.files.is_empty());
        assert_eq!(state.parse_errors, 1);
    }

    #[test]
    fn test_unchanged_bytes_reuse_previous_state() {
        let fs = MockFs::new();
        fs.add_file("/cg/devices/a/cgroup.procs", "");
        fs.add_file("/cg/devices/a/devices.list", "a *:* rwm\n");
        let group = walked("/cg/devices/a", &["cgroup.procs", "devices.list"]);

        let first = present(read_group(&fs, &group, None, DeviceRecordMode::Structured));

        // Same bytes, different mode: the fingerprint wins and nothing is re-parsed.
        let second = present(read_group(
            &fs,
            &group,
            Some(&first.snapshot),
            DeviceRecordMode::Opaque,
        ));
        assert_eq!(second.snapshot.files, first.snapshot.files);
    }

    #[test]
    fn test_empty_file_is_empty_record() {
        let fs = MockFs::new();
        fs.add_file("/cg/cpu/cgroup.procs", "");
        fs.add_file("/cg/cpu/release_agent", "");
        let group = walked("/cg/cpu", &["cgroup.procs", "release_agent"]);

        let state = present(read_group(&fs, &group, None, DeviceRecordMode::Opaque));
        assert_eq!(state.snapshot.files["release_agent"].value, ParsedFile::empty());
        assert!(state.snapshot.attached_pids.is_empty());
    }

    #[test]
    fn test_timed_out_read_is_counted_and_held() {
        let mock = MockFs::new();
        mock.add_file("/cg/cpu/svc1/cgroup.procs", "5\n");
        mock.add_file("/cg/cpu/svc1/cpu.shares", "512\n");
        let group = walked("/cg/cpu/svc1", &["cgroup.procs", "cpu.shares"]);

        let first = present(read_group(&mock, &group, None, DeviceRecordMode::Opaque));

        mock.stall("/cg/cpu/svc1/cpu.shares", Duration::from_secs(3));
        let fs = TimeoutFs::new(mock, Duration::from_millis(200));
        let second = present(read_group(
            &fs,
            &group,
            Some(&first.snapshot),
            DeviceRecordMode::Opaque,
        ));

        assert_eq!(second.read_timeouts, 1);
        assert_eq!(second.snapshot, first.snapshot);
    }
}
