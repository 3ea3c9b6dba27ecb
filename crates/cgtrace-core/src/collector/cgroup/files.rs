//! Allow-list of control files and the value shape each one holds.
//!
//! Files that are not listed here are ignored by the scanner. The subsystem a
//! file belongs to is implied by its prefix (`cpu.`, `memory.`, ...); core
//! files such as `notify_on_release` and `cgroup.*` apply to every hierarchy.

/// Membership file read for every group.
pub const PROCS_FILE: &str = "cgroup.procs";

/// Expected shape of a control file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Signed decimal, e.g. `cpu.cfs_quota_us` (`-1` = unlimited).
    Integer,
    /// Unsigned decimal; negative values saturate at zero.
    Unsigned,
    /// Whole trimmed content as a string.
    Text,
    /// Two whitespace-separated tokens per line.
    Pairs,
    /// `MAJOR:MINOR VALUE` per line.
    DeviceIo,
    /// `TYPE MAJOR:MINOR ACCESS` per line.
    DeviceAccess,
}

impl ValueKind {
    /// Device-keyed kinds whose records may be kept as opaque text.
    pub fn is_device_keyed(self) -> bool {
        matches!(self, ValueKind::DeviceIo | ValueKind::DeviceAccess)
    }
}

const FILE_KINDS: &[(&str, ValueKind)] = &[
    // core
    ("notify_on_release", ValueKind::Unsigned),
    ("release_agent", ValueKind::Text),
    ("cgroup.clone_children", ValueKind::Unsigned),
    // blkio
    ("blkio.weight", ValueKind::Unsigned),
    ("blkio.leaf_weight", ValueKind::Unsigned),
    ("blkio.weight_device", ValueKind::DeviceIo),
    ("blkio.leaf_weight_device", ValueKind::DeviceIo),
    ("blkio.throttle.read_bps_device", ValueKind::DeviceIo),
    ("blkio.throttle.write_bps_device", ValueKind::DeviceIo),
    ("blkio.throttle.read_iops_device", ValueKind::DeviceIo),
    ("blkio.throttle.write_iops_device", ValueKind::DeviceIo),
    // cpu
    ("cpu.shares", ValueKind::Integer),
    ("cpu.cfs_period_us", ValueKind::Unsigned),
    ("cpu.cfs_quota_us", ValueKind::Integer),
    ("cpu.rt_period_us", ValueKind::Unsigned),
    ("cpu.rt_runtime_us", ValueKind::Integer),
    // cpuset
    ("cpuset.cpus", ValueKind::Text),
    ("cpuset.mems", ValueKind::Text),
    // freezer
    ("freezer.state", ValueKind::Text),
    // hugetlb: per-size files go through the lookaside below
    ("hugetlb.limit_in_bytes", ValueKind::Unsigned),
    // memory
    ("memory.limit_in_bytes", ValueKind::Integer),
    ("memory.memsw.limit_in_bytes", ValueKind::Integer),
    ("memory.soft_limit_in_bytes", ValueKind::Integer),
    ("memory.use_hierarchy", ValueKind::Unsigned),
    ("memory.swappiness", ValueKind::Unsigned),
    ("memory.move_charge_at_immigrate", ValueKind::Unsigned),
    ("memory.oom_control", ValueKind::Pairs),
    ("memory.kmem.limit_in_bytes", ValueKind::Integer),
    ("memory.kmem.tcp.limit_in_bytes", ValueKind::Integer),
    // net_cls / net_prio
    ("net_cls.classid", ValueKind::Unsigned),
    ("net_prio.ifpriomap", ValueKind::Pairs),
    // pids
    ("pids.max", ValueKind::Text),
    // devices
    ("devices.allow", ValueKind::DeviceAccess),
    ("devices.deny", ValueKind::DeviceAccess),
    ("devices.list", ValueKind::DeviceAccess),
    // cgroup v2 unified hierarchy
    ("cgroup.type", ValueKind::Text),
    ("cgroup.subtree_control", ValueKind::Text),
    ("cgroup.max.depth", ValueKind::Text),
    ("cgroup.max.descendants", ValueKind::Text),
    ("cgroup.freeze", ValueKind::Unsigned),
    ("cpu.weight", ValueKind::Unsigned),
    ("cpu.weight.nice", ValueKind::Integer),
    ("cpu.max", ValueKind::Pairs),
    ("memory.min", ValueKind::Text),
    ("memory.low", ValueKind::Text),
    ("memory.high", ValueKind::Text),
    ("memory.max", ValueKind::Text),
    ("memory.swap.max", ValueKind::Text),
    ("memory.oom.group", ValueKind::Unsigned),
    ("io.weight", ValueKind::Pairs),
    ("io.max", ValueKind::Text),
];

/// Returns the value kind for an allow-listed file, or `None` if the file is
/// not of interest.
pub fn kind_of(filename: &str) -> Option<ValueKind> {
    if let Some((_, kind)) = FILE_KINDS.iter().find(|(name, _)| *name == filename) {
        return Some(*kind);
    }
    lookaside(filename).and_then(kind_of)
}

/// Maps size-qualified names onto their table entry, e.g.
/// `hugetlb.2MB.limit_in_bytes` -> `hugetlb.limit_in_bytes`.
fn lookaside(filename: &str) -> Option<&'static str> {
    let size = filename
        .strip_prefix("hugetlb.")?
        .strip_suffix(".limit_in_bytes")?;
    if size.is_empty() || size.contains('.') {
        return None;
    }
    Some("hugetlb.limit_in_bytes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_matches() {
        assert_eq!(kind_of("cpu.shares"), Some(ValueKind::Integer));
        assert_eq!(kind_of("cpu.cfs_period_us"), Some(ValueKind::Unsigned));
        assert_eq!(kind_of("freezer.state"), Some(ValueKind::Text));
        assert_eq!(kind_of("memory.oom_control"), Some(ValueKind::Pairs));
        assert_eq!(
            kind_of("blkio.throttle.read_bps_device"),
            Some(ValueKind::DeviceIo)
        );
        assert_eq!(kind_of("devices.list"), Some(ValueKind::DeviceAccess));
        assert_eq!(kind_of("cpu.max"), Some(ValueKind::Pairs));
    }

    #[test]
    fn test_hugetlb_lookaside() {
        assert_eq!(
            kind_of("hugetlb.2MB.limit_in_bytes"),
            Some(ValueKind::Unsigned)
        );
        assert_eq!(
            kind_of("hugetlb.1GB.limit_in_bytes"),
            Some(ValueKind::Unsigned)
        );
        assert_eq!(kind_of("hugetlb.2MB.usage_in_bytes"), None);
        assert_eq!(kind_of("hugetlb..limit_in_bytes"), None);
    }

    #[test]
    fn test_unlisted_files_are_ignored() {
        assert_eq!(kind_of("cpu.stat"), None);
        assert_eq!(kind_of("tasks"), None);
        assert_eq!(kind_of(PROCS_FILE), None);
    }

    #[test]
    fn test_device_keyed() {
        assert!(ValueKind::DeviceIo.is_device_keyed());
        assert!(ValueKind::DeviceAccess.is_device_keyed());
        assert!(!ValueKind::Pairs.is_device_keyed());
    }
}
