//! Parsed control-file values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One typed record parsed from a control file.
///
/// The set of shapes is closed: every allow-listed file maps to exactly one
/// of these via the dispatch table in `collector::cgroup::files`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub enum ParsedValue {
    Integer(i64),
    UnsignedInteger(u64),
    Text(String),
    TextPair(String, String),
    /// `MAJOR:MINOR VALUE`
    DeviceIo { major: i64, minor: i64, value: u64 },
    /// `TYPE MAJOR:MINOR ACCESS`, e.g. `c 1:3 rwm` or `a *:* rwm`
    DeviceAccess {
        device_type: String,
        major: String,
        minor: String,
        access: String,
    },
    /// Zero-byte file (unset control file).
    Empty,
}

impl fmt::Display for ParsedValue {
    /// Renders the record in the kernel's textual convention.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsedValue::Integer(v) => write!(f, "{}", v),
            ParsedValue::UnsignedInteger(v) => write!(f, "{}", v),
            ParsedValue::Text(s) => f.write_str(s),
            ParsedValue::TextPair(a, b) => write!(f, "{} {}", a, b),
            ParsedValue::DeviceIo {
                major,
                minor,
                value,
            } => write!(f, "{}:{} {}", major, minor, value),
            ParsedValue::DeviceAccess {
                device_type,
                major,
                minor,
                access,
            } => write!(f, "{} {}:{} {}", device_type, major, minor, access),
            ParsedValue::Empty => Ok(()),
        }
    }
}

/// Parsed content of a whole control file.
///
/// Single-valued files hold one record, line-oriented files one record per
/// line, an empty file holds a single [`ParsedValue::Empty`]. Equality over
/// this type is what drives change detection.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub struct ParsedFile {
    pub records: Vec<ParsedValue>,
}

impl ParsedFile {
    pub fn single(value: ParsedValue) -> Self {
        Self {
            records: vec![value],
        }
    }

    pub fn empty() -> Self {
        Self::single(ParsedValue::Empty)
    }

    pub fn is_empty(&self) -> bool {
        self.records.iter().all(|r| *r == ParsedValue::Empty)
    }

    /// Re-serializes the records, one per line, with a trailing newline.
    /// An empty file renders as an empty string.
    pub fn to_content(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let mut out = String::new();
        for record in &self.records {
            out.push_str(&record.to_string());
            out.push('\n');
        }
        out
    }
}

impl From<ParsedValue> for ParsedFile {
    fn from(value: ParsedValue) -> Self {
        Self::single(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_device_records() {
        let io = ParsedValue::DeviceIo {
            major: 8,
            minor: 16,
            value: 1048576,
        };
        assert_eq!(io.to_string(), "8:16 1048576");

        let access = ParsedValue::DeviceAccess {
            device_type: "a".into(),
            major: "*".into(),
            minor: "*".into(),
            access: "rwm".into(),
        };
        assert_eq!(access.to_string(), "a *:* rwm");
    }

    #[test]
    fn test_to_content_multiline() {
        let file = ParsedFile {
            records: vec![
                ParsedValue::TextPair("oom_kill_disable".into(), "0".into()),
                ParsedValue::TextPair("under_oom".into(), "0".into()),
            ],
        };
        assert_eq!(file.to_content(), "oom_kill_disable 0\nunder_oom 0\n");
    }

    #[test]
    fn test_empty_file_renders_empty() {
        assert!(ParsedFile::empty().is_empty());
        assert_eq!(ParsedFile::empty().to_content(), "");
        assert!(!ParsedFile::single(ParsedValue::Integer(0)).is_empty());
    }
}
