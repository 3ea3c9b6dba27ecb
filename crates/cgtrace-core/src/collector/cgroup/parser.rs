//! Parsers for cgroup control files.
//!
//! Pure functions over file content, dispatched on the [`ValueKind`] declared
//! by the allow-list. Any content that does not match the declared shape is a
//! [`ParseError`]; callers decide what to do with it.

use std::collections::BTreeSet;

use super::files::ValueKind;
use crate::storage::model::{ParsedFile, ParsedValue};

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// How device-keyed files (`blkio.*_device`, `devices.*`) are represented.
///
/// `Opaque` keeps the raw content as a single text record, which survives
/// format drift across kernel versions. `Structured` splits every line into
/// typed fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceRecordMode {
    #[default]
    Opaque,
    Structured,
}

/// Parses the content of a control file according to its kind.
pub fn parse_file(
    kind: ValueKind,
    mode: DeviceRecordMode,
    content: &str,
) -> Result<ParsedFile, ParseError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(ParsedFile::empty());
    }

    if kind.is_device_keyed() && mode == DeviceRecordMode::Opaque {
        return Ok(ParsedFile::single(ParsedValue::Text(trimmed.to_string())));
    }

    let records = match kind {
        ValueKind::Integer => vec![ParsedValue::Integer(parse_integer(trimmed)?)],
        ValueKind::Unsigned => vec![ParsedValue::UnsignedInteger(parse_unsigned(trimmed)?)],
        ValueKind::Text => vec![ParsedValue::Text(trimmed.to_string())],
        ValueKind::Pairs => parse_lines(trimmed, parse_pair)?,
        ValueKind::DeviceIo => parse_lines(trimmed, parse_device_io)?,
        ValueKind::DeviceAccess => parse_lines(trimmed, parse_device_access)?,
    };

    Ok(ParsedFile { records })
}

/// Applies `parse_line` to every non-blank line. One record per line, no
/// aggregation.
fn parse_lines(
    content: &str,
    parse_line: fn(&str) -> Result<ParsedValue, ParseError>,
) -> Result<Vec<ParsedValue>, ParseError> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(parse_line)
        .collect()
}

/// Parses a signed decimal value.
pub fn parse_integer(s: &str) -> Result<i64, ParseError> {
    s.parse::<i64>()
        .map_err(|e| ParseError::new(format!("invalid integer '{}': {}", s, e)))
}

/// Parses an unsigned decimal value.
///
/// Some kernel counters can read negative; negative values (including ones
/// below `i64::MIN`) saturate at zero.
pub fn parse_unsigned(s: &str) -> Result<u64, ParseError> {
    if let Ok(v) = s.parse::<u64>() {
        return Ok(v);
    }

    if let Some(digits) = s.strip_prefix('-')
        && !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
    {
        return Ok(0);
    }

    Err(ParseError::new(format!("invalid unsigned integer '{}'", s)))
}

/// Parses `KEY VALUE`.
pub fn parse_pair(line: &str) -> Result<ParsedValue, ParseError> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) => Ok(ParsedValue::TextPair(a.to_string(), b.to_string())),
        _ => Err(ParseError::new(format!("expected two tokens in '{}'", line))),
    }
}

/// Parses `MAJOR:MINOR VALUE`.
pub fn parse_device_io(line: &str) -> Result<ParsedValue, ParseError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 2 {
        return Err(ParseError::new(format!(
            "expected 'MAJOR:MINOR VALUE' in '{}'",
            line
        )));
    }

    let (major, minor) = parse_device_number(parts[0])?;
    let major = parse_integer(major)?;
    let minor = parse_integer(minor)?;
    let value = parse_unsigned(parts[1])?;

    Ok(ParsedValue::DeviceIo {
        major,
        minor,
        value,
    })
}

/// Parses `TYPE MAJOR:MINOR ACCESS`. Major and minor stay textual since `*`
/// is a valid wildcard.
pub fn parse_device_access(line: &str) -> Result<ParsedValue, ParseError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(ParseError::new(format!(
            "expected 'TYPE MAJOR:MINOR ACCESS' in '{}'",
            line
        )));
    }

    let (major, minor) = parse_device_number(parts[1])?;

    Ok(ParsedValue::DeviceAccess {
        device_type: parts[0].to_string(),
        major: major.to_string(),
        minor: minor.to_string(),
        access: parts[2].to_string(),
    })
}

fn parse_device_number(s: &str) -> Result<(&str, &str), ParseError> {
    match s.split_once(':') {
        Some((major, minor)) if !major.is_empty() && !minor.is_empty() => Ok((major, minor)),
        _ => Err(ParseError::new(format!(
            "invalid device number '{}'",
            s
        ))),
    }
}

/// Parses `cgroup.procs`: one pid per line.
pub fn parse_pids(content: &str) -> Result<BTreeSet<u32>, ParseError> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse::<u32>()
                .map_err(|e| ParseError::new(format!("invalid pid '{}': {}", line, e)))
        })
        .collect()
}
