//! Subsystem root discovery from the mount table.
//!
//! Accepts both `/proc/self/mountinfo` and `/proc/mounts` line formats:
//!
//! ```text
//! 30 25 0:26 / /sys/fs/cgroup/cpu,cpuacct rw,nosuid shared:12 - cgroup cgroup rw,cpu,cpuacct
//! cgroup /sys/fs/cgroup/cpu,cpuacct cgroup rw,nosuid,nodev,noexec,relatime,cpu,cpuacct 0 0
//! ```

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::collector::traits::FileSystem;
use crate::storage::model::Subsystem;

/// Name reported for the cgroup v2 unified hierarchy.
pub const UNIFIED_SUBSYSTEM: &str = "unified";

/// Controllers recognized in cgroup v1 mount options.
const V1_CONTROLLERS: &[&str] = &[
    "blkio",
    "cpu",
    "cpuacct",
    "cpuset",
    "debug",
    "devices",
    "freezer",
    "hugetlb",
    "memory",
    "misc",
    "net_cls",
    "net_prio",
    "perf_event",
    "pids",
    "rdma",
];

#[derive(Debug)]
pub enum DiscoveryError {
    /// The mount table could not be read.
    MountTable(std::io::Error),
}

impl std::fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveryError::MountTable(e) => write!(f, "mount table unreadable: {}", e),
        }
    }
}

impl std::error::Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiscoveryError::MountTable(e) => Some(e),
        }
    }
}

/// Cgroup entry extracted from one mount table line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupMount {
    pub mount_point: PathBuf,
    pub subsystems: Vec<String>,
}

/// Decodes the octal escapes the kernel uses for spaces, tabs, newlines and
/// backslashes in mount points (`\040`, `\011`, `\012`, `\134`).
fn unescape_mount_field(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 4 <= bytes.len()
            && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let value = (bytes[i + 1] - b'0') as u32 * 64
                + (bytes[i + 2] - b'0') as u32 * 8
                + (bytes[i + 3] - b'0') as u32;
            if let Ok(byte) = u8::try_from(value) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Extracts (mount point, fstype, super options) from a line in either format.
fn split_mount_line(line: &str) -> Option<(&str, &str, &str)> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 3 {
        return None;
    }

    let is_mountinfo = fields[0].bytes().all(|b| b.is_ascii_digit());
    if is_mountinfo {
        let sep = fields.iter().position(|f| *f == "-")?;
        let mount_point = fields.get(4)?;
        let fstype = fields.get(sep + 1)?;
        let options = fields.get(sep + 3).copied().unwrap_or("");
        Some((mount_point, fstype, options))
    } else {
        let options = fields.get(3).copied().unwrap_or("");
        Some((fields[1], fields[2], options))
    }
}

/// Parses a mount table and returns the cgroup mounts it contains.
pub fn parse_mount_table(content: &str) -> Vec<CgroupMount> {
    let mut mounts = Vec::new();

    for line in content.lines() {
        let Some((mount_point, fstype, options)) = split_mount_line(line) else {
            continue;
        };

        let subsystems: Vec<String> = match fstype {
            "cgroup" => options
                .split(',')
                .filter(|opt| V1_CONTROLLERS.contains(opt) || opt.starts_with("name="))
                .map(str::to_string)
                .collect(),
            "cgroup2" => vec![UNIFIED_SUBSYSTEM.to_string()],
            _ => continue,
        };

        if subsystems.is_empty() {
            continue;
        }

        mounts.push(CgroupMount {
            mount_point: PathBuf::from(unescape_mount_field(mount_point)),
            subsystems,
        });
    }

    mounts
}

/// Result of one discovery pass.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Every (root, name) pair currently mounted, sorted.
    pub subsystems: Vec<Subsystem>,
    /// Pairs not seen by the previous successful pass.
    pub new: Vec<Subsystem>,
}

impl Discovery {
    /// Distinct mount roots, sorted.
    pub fn roots(&self) -> Vec<PathBuf> {
        let roots: BTreeSet<PathBuf> = self
            .subsystems
            .iter()
            .map(|s| s.root_path.clone())
            .collect();
        roots.into_iter().collect()
    }
}

/// Tracks which subsystem roots have already been reported.
#[derive(Debug, Default)]
pub struct RootDiscovery {
    known: BTreeSet<Subsystem>,
}

impl RootDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the mount table and reports current and newly seen pairs.
    ///
    /// Nothing is remembered until [`RootDiscovery::commit`], so a cycle
    /// that is abandoned reports the same pairs as new again next time.
    pub fn discover<F: FileSystem + ?Sized>(&self, fs: &F) -> Result<Discovery, DiscoveryError> {
        let content = fs.read_mounts().map_err(DiscoveryError::MountTable)?;

        let current: BTreeSet<Subsystem> = parse_mount_table(&content)
            .into_iter()
            .flat_map(|m| {
                let root = m.mount_point;
                m.subsystems
                    .into_iter()
                    .map(move |name| Subsystem::new(name, root.clone()))
            })
            .collect();

        let new = current.difference(&self.known).cloned().collect();
        let subsystems = current.into_iter().collect();

        Ok(Discovery { subsystems, new })
    }

    /// Makes `discovery` the known set. A pair missing from it is forgotten,
    /// so a later remount is reported as new again.
    pub fn commit(&mut self, discovery: &Discovery) {
        self.known = discovery.subsystems.iter().cloned().collect();
    }

    /// Pairs reported so far.
    pub fn known(&self) -> impl Iterator<Item = &Subsystem> {
        self.known.iter()
    }
}
