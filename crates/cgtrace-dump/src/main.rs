use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;

use cgtrace_core::storage::EventLogReader;
use cgtrace_core::storage::model::{Event, EventRecord};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "cgtrace-dump", about = "Inspect cgtrace event logs")]
struct Cli {
    /// Path to a framed event log
    path: PathBuf,

    /// Print only the summary, not every event
    #[arg(long)]
    summary: bool,

    /// Only show events of this cycle
    #[arg(long)]
    cycle: Option<u64>,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();

    let reader = EventLogReader::open(&cli.path).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {e}", cli.path.display());
        std::process::exit(1);
    });

    let records: Vec<&EventRecord> = reader
        .records
        .iter()
        .filter(|r| cli.cycle.is_none_or(|c| r.cycle == c))
        .collect();

    if cli.json {
        let json = LogJson::new(&cli.path, &reader, &records, !cli.summary);
        match serde_json::to_string_pretty(&json) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("Error encoding JSON: {e}");
                std::process::exit(1);
            }
        }
    } else {
        print_text(&cli.path, &reader, &records, !cli.summary);
    }
}

// ── Formatting helpers ───────────────────────────────────────────────────────

fn human_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    let b = bytes as f64;
    if b >= GIB {
        format!("{:.1} GiB", b / GIB)
    } else if b >= MIB {
        format!("{:.1} MiB", b / MIB)
    } else if b >= KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{bytes} B")
    }
}

fn fmt_ts(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// One-line rendering of an event's fields.
fn describe_event(event: &Event) -> String {
    match event {
        Event::SubsystemRoot {
            root,
            subsystem_name,
        } => format!("{subsystem_name} at {root}"),
        Event::PathStatus {
            path_id,
            path,
            status,
        } => format!("{path_id} {path} {status:?} ({})", status.code()),
        Event::AttachedMembership { path_id, pids } => {
            let pids: Vec<String> = pids.iter().map(u32::to_string).collect();
            format!("{path_id} [{}]", pids.join(" "))
        }
        Event::FileValueInteger {
            path_id,
            filename,
            value,
        } => format!("{path_id} {filename} = {value}"),
        Event::FileValueUnsigned {
            path_id,
            filename,
            value,
        } => format!("{path_id} {filename} = {value}"),
        Event::FileValueText {
            path_id,
            filename,
            value,
        } => format!("{path_id} {filename} = {value:?}"),
        Event::FileValueTextPair {
            path_id,
            filename,
            value1,
            value2,
        } => format!("{path_id} {filename} = {value1} {value2}"),
        Event::FileValueDeviceIo {
            path_id,
            filename,
            major,
            minor,
            value,
        } => format!("{path_id} {filename} = {major}:{minor} {value}"),
        Event::FileValueDeviceAccess {
            path_id,
            filename,
            device_type,
            major,
            minor,
            access,
        } => format!("{path_id} {filename} = {device_type} {major}:{minor} {access}"),
        Event::FileValueEmpty { path_id, filename } => format!("{path_id} {filename} (empty)"),
    }
}

fn count_by_name(records: &[&EventRecord]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.event.name()).or_insert(0) += 1;
    }
    counts
}

fn cycle_range(records: &[&EventRecord]) -> Option<(u64, u64)> {
    let first = records.iter().map(|r| r.cycle).min()?;
    let last = records.iter().map(|r| r.cycle).max()?;
    Some((first, last))
}

// ── Text output ──────────────────────────────────────────────────────────────

fn print_text(path: &Path, reader: &EventLogReader, records: &[&EventRecord], events: bool) {
    let fname = path.file_name().unwrap_or_default().to_string_lossy();
    println!("File: {} ({})", fname, human_bytes(reader.file_size as u64));
    println!("Format: CRC32-framed event log, {} records", reader.records.len());
    if reader.trailing_garbage > 0 {
        println!(
            "Warning: {} trailing bytes after the last valid frame",
            reader.trailing_garbage
        );
    }

    if events && !records.is_empty() {
        println!();
        for record in records {
            println!(
                "{} #{:<5} {:<26} {}",
                fmt_ts(record.timestamp),
                record.cycle,
                record.event.name(),
                describe_event(&record.event)
            );
        }
    }

    if let Some((first, last)) = cycle_range(records) {
        println!("\nCycles: {} \u{2013} {}", first, last);
        if let (Some(a), Some(b)) = (records.first(), records.last()) {
            println!("Time range: {} \u{2013} {}", fmt_ts(a.timestamp), fmt_ts(b.timestamp));
        }
    }

    let counts = count_by_name(records);
    if !counts.is_empty() {
        println!("\nEvents:");
        for (name, count) in &counts {
            println!("  {:<26} {:>8}", name, count);
        }
    }
}

// ── JSON output ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct TimeRangeJson {
    first: String,
    last: String,
}

#[derive(Serialize)]
struct LogJson<'a> {
    file: String,
    file_size: usize,
    format: String,
    records: usize,
    trailing_garbage: usize,
    cycles: Option<(u64, u64)>,
    time_range: Option<TimeRangeJson>,
    counts: BTreeMap<&'static str, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    events: Option<Vec<&'a EventRecord>>,
}

impl<'a> LogJson<'a> {
    fn new(
        path: &Path,
        reader: &EventLogReader,
        records: &[&'a EventRecord],
        with_events: bool,
    ) -> Self {
        let time_range = match (records.first(), records.last()) {
            (Some(a), Some(b)) => Some(TimeRangeJson {
                first: fmt_ts(a.timestamp),
                last: fmt_ts(b.timestamp),
            }),
            _ => None,
        };

        Self {
            file: path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .into(),
            file_size: reader.file_size,
            format: "CRC32-framed event log".into(),
            records: reader.records.len(),
            trailing_garbage: reader.trailing_garbage,
            cycles: cycle_range(records),
            time_range,
            counts: count_by_name(records),
            events: with_events.then(|| records.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgtrace_core::storage::model::{GroupKey, PathStatus};

    fn record(cycle: u64, event: Event) -> EventRecord {
        EventRecord {
            timestamp: 1_700_000_000,
            cycle,
            event,
        }
    }

    #[test]
    fn test_describe_event() {
        let status = Event::PathStatus {
            path_id: GroupKey::Id(2),
            path: "/sys/fs/cgroup/cpu/svc1".into(),
            status: PathStatus::Removed,
        };
        assert_eq!(
            describe_event(&status),
            "#2 /sys/fs/cgroup/cpu/svc1 Removed (-1)"
        );

        let pids = Event::AttachedMembership {
            path_id: GroupKey::Path("/cg/a".into()),
            pids: vec![1, 42],
        };
        assert_eq!(describe_event(&pids), "/cg/a [1 42]");

        let io = Event::FileValueDeviceIo {
            path_id: GroupKey::Id(3),
            filename: "blkio.throttle.read_bps_device".into(),
            major: 8,
            minor: 0,
            value: 1048576,
        };
        assert_eq!(
            describe_event(&io),
            "#3 blkio.throttle.read_bps_device = 8:0 1048576"
        );
    }

    #[test]
    fn test_counts_and_cycle_range() {
        let a = record(
            1,
            Event::SubsystemRoot {
                root: "/cg/cpu".into(),
                subsystem_name: "cpu".into(),
            },
        );
        let b = record(
            3,
            Event::FileValueEmpty {
                path_id: GroupKey::Id(1),
                filename: "release_agent".into(),
            },
        );
        let c = record(
            3,
            Event::FileValueEmpty {
                path_id: GroupKey::Id(2),
                filename: "release_agent".into(),
            },
        );
        let records = vec![&a, &b, &c];

        let counts = count_by_name(&records);
        assert_eq!(counts["subsystem_root"], 1);
        assert_eq!(counts["file_value_empty"], 2);
        assert_eq!(cycle_range(&records), Some((1, 3)));
        assert_eq!(cycle_range(&[]), None);
    }

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.0 KiB");
        assert_eq!(human_bytes(3 * 1024 * 1024), "3.0 MiB");
    }

    #[test]
    fn test_fmt_ts() {
        assert_eq!(fmt_ts(0), "1970-01-01 00:00:00");
    }
}
