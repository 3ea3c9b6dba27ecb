//! Event schema delivered to the trace collector.
//!
//! Field names are the public contract. The transport encoding is up to the
//! sink (JSON lines, framed postcard log, in-memory).

use serde::{Deserialize, Serialize};

use super::value::ParsedValue;

/// How a group is referenced by an event.
///
/// `Id` is the default schema: compact ids bound to paths by `path_status`.
/// `Path` is the legacy schema where every event carries the full path.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    Id(u32),
    Path(String),
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupKey::Id(id) => write!(f, "#{}", id),
            GroupKey::Path(p) => f.write_str(p),
        }
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PathStatus {
    Initial,
    Added,
    Removed,
}

impl PathStatus {
    /// Numeric code used by older trace consumers: 0 initial, 1 added, -1 removed.
    pub fn code(self) -> i32 {
        match self {
            PathStatus::Initial => 0,
            PathStatus::Added => 1,
            PathStatus::Removed => -1,
        }
    }
}

/// A single change fact.
///
/// Externally tagged so the same representation works for self-describing
/// (JSON) and non-self-describing (postcard) encodings.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    SubsystemRoot {
        root: String,
        subsystem_name: String,
    },
    /// Also the path<->id binding in the id-keyed schema.
    PathStatus {
        path_id: GroupKey,
        path: String,
        status: PathStatus,
    },
    AttachedMembership {
        path_id: GroupKey,
        pids: Vec<u32>,
    },
    FileValueInteger {
        path_id: GroupKey,
        filename: String,
        value: i64,
    },
    FileValueUnsigned {
        path_id: GroupKey,
        filename: String,
        value: u64,
    },
    FileValueText {
        path_id: GroupKey,
        filename: String,
        value: String,
    },
    FileValueTextPair {
        path_id: GroupKey,
        filename: String,
        value1: String,
        value2: String,
    },
    FileValueDeviceIo {
        path_id: GroupKey,
        filename: String,
        major: i64,
        minor: i64,
        value: u64,
    },
    FileValueDeviceAccess {
        path_id: GroupKey,
        filename: String,
        device_type: String,
        major: String,
        minor: String,
        access: String,
    },
    FileValueEmpty {
        path_id: GroupKey,
        filename: String,
    },
}

impl Event {
    /// Builds the file-value event matching the record's shape.
    pub fn file_value(path_id: GroupKey, filename: &str, value: &ParsedValue) -> Self {
        let filename = filename.to_string();
        match value {
            ParsedValue::Integer(v) => Event::FileValueInteger {
                path_id,
                filename,
                value: *v,
            },
            ParsedValue::UnsignedInteger(v) => Event::FileValueUnsigned {
                path_id,
                filename,
                value: *v,
            },
            ParsedValue::Text(s) => Event::FileValueText {
                path_id,
                filename,
                value: s.clone(),
            },
            ParsedValue::TextPair(a, b) => Event::FileValueTextPair {
                path_id,
                filename,
                value1: a.clone(),
                value2: b.clone(),
            },
            ParsedValue::DeviceIo {
                major,
                minor,
                value,
            } => Event::FileValueDeviceIo {
                path_id,
                filename,
                major: *major,
                minor: *minor,
                value: *value,
            },
            ParsedValue::DeviceAccess {
                device_type,
                major,
                minor,
                access,
            } => Event::FileValueDeviceAccess {
                path_id,
                filename,
                device_type: device_type.clone(),
                major: major.clone(),
                minor: minor.clone(),
                access: access.clone(),
            },
            ParsedValue::Empty => Event::FileValueEmpty { path_id, filename },
        }
    }

    /// Schema name of the event, as used for the serde variant tag.
    pub fn name(&self) -> &'static str {
        match self {
            Event::SubsystemRoot { .. } => "subsystem_root",
            Event::PathStatus { .. } => "path_status",
            Event::AttachedMembership { .. } => "attached_membership",
            Event::FileValueInteger { .. } => "file_value_integer",
            Event::FileValueUnsigned { .. } => "file_value_unsigned",
            Event::FileValueText { .. } => "file_value_text",
            Event::FileValueTextPair { .. } => "file_value_text_pair",
            Event::FileValueDeviceIo { .. } => "file_value_device_io",
            Event::FileValueDeviceAccess { .. } => "file_value_device_access",
            Event::FileValueEmpty { .. } => "file_value_empty",
        }
    }
}

/// An event stamped with the cycle that produced it.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct EventRecord {
    /// Unix seconds at the start of the cycle.
    pub timestamp: i64,
    pub cycle: u64,
    pub event: Event,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_value_dispatch() {
        let ev = Event::file_value(GroupKey::Id(3), "cpu.shares", &ParsedValue::Integer(1024));
        assert_eq!(
            ev,
            Event::FileValueInteger {
                path_id: GroupKey::Id(3),
                filename: "cpu.shares".into(),
                value: 1024,
            }
        );
        assert_eq!(ev.name(), "file_value_integer");

        let unsigned = Event::file_value(
            GroupKey::Id(4),
            "notify_on_release",
            &ParsedValue::UnsignedInteger(1),
        );
        assert_eq!(
            unsigned,
            Event::FileValueUnsigned {
                path_id: GroupKey::Id(4),
                filename: "notify_on_release".into(),
                value: 1,
            }
        );
        assert_eq!(unsigned.name(), "file_value_unsigned");

        let io = Event::file_value(
            GroupKey::Path("/cg/blkio/a".into()),
            "blkio.throttle.read_bps_device",
            &ParsedValue::DeviceIo {
                major: 8,
                minor: 16,
                value: 5,
            },
        );
        assert_eq!(
            io,
            Event::FileValueDeviceIo {
                path_id: GroupKey::Path("/cg/blkio/a".into()),
                filename: "blkio.throttle.read_bps_device".into(),
                major: 8,
                minor: 16,
                value: 5,
            }
        );
        assert_eq!(io.name(), "file_value_device_io");

        let empty = Event::file_value(GroupKey::Id(2), "notify_on_release", &ParsedValue::Empty);
        assert_eq!(empty.name(), "file_value_empty");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(PathStatus::Initial.code(), 0);
        assert_eq!(PathStatus::Added.code(), 1);
        assert_eq!(PathStatus::Removed.code(), -1);
    }
}
