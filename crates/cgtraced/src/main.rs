//! cgtraced - cgroup hierarchy observer daemon.
//!
//! Scans the cgroup mounts on a fixed interval and writes change events
//! (topology, membership, control-file values) to a framed event log or as
//! JSON lines.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::fs::OpenOptions;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(not(target_os = "linux"))]
use cgtrace_core::collector::MockFs;
#[cfg(target_os = "linux")]
use cgtrace_core::collector::RealFs;
use cgtrace_core::collector::{
    DeviceRecordMode, FileSystem, ScanConfig, ScanError, ScanReport, Scanner, SchemaMode,
    TimeoutFs,
};
use cgtrace_core::emit::{EventEmitter, JsonLinesSink};
use cgtrace_core::storage::EventLogWriter;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// CRC32-framed postcard log (see cgtrace-dump).
    Log,
    /// One JSON object per line.
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DeviceRecords {
    /// Keep device-keyed files as one raw text value.
    Opaque,
    /// Split device-keyed files into typed per-line records.
    Structured,
}

impl From<DeviceRecords> for DeviceRecordMode {
    fn from(value: DeviceRecords) -> Self {
        match value {
            DeviceRecords::Opaque => DeviceRecordMode::Opaque,
            DeviceRecords::Structured => DeviceRecordMode::Structured,
        }
    }
}

/// cgroup hierarchy observer daemon.
#[derive(Parser)]
#[command(name = "cgtraced", about = "cgroup hierarchy observer daemon", version)]
struct Args {
    /// Scan interval in seconds.
    #[arg(short, long, default_value = "10", env = "CGTRACE_INTERVAL")]
    interval: u64,

    /// Output file. Defaults to ./events.log for the log format and to
    /// stdout for JSON.
    #[arg(short, long, env = "CGTRACE_OUTPUT")]
    output: Option<PathBuf>,

    /// Output encoding.
    #[arg(long, value_enum, default_value = "log", env = "CGTRACE_FORMAT")]
    format: OutputFormat,

    /// Mount table to read (mountinfo or /proc/mounts format).
    #[arg(long, default_value = "/proc/self/mountinfo", env = "CGTRACE_MOUNTS")]
    mounts: PathBuf,

    /// Per-file and per-directory read timeout in milliseconds.
    #[arg(long, default_value = "2000", env = "CGTRACE_READ_TIMEOUT_MS")]
    read_timeout_ms: u64,

    /// Number of reader threads.
    #[arg(long, default_value = "4", env = "CGTRACE_WORKERS")]
    workers: usize,

    /// Representation of device-keyed control files.
    #[arg(long, value_enum, default_value = "opaque", env = "CGTRACE_DEVICE_RECORDS")]
    device_records: DeviceRecords,

    /// Key every event by full path instead of a compact id (legacy schema).
    #[arg(long)]
    path_keyed: bool,

    /// Run a single scan and exit.
    #[arg(long)]
    once: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            interval: Duration::from_secs(self.interval),
            workers: self.workers.max(1),
            device_records: self.device_records.into(),
            schema: if self.path_keyed {
                SchemaMode::PathKeyed
            } else {
                SchemaMode::IdKeyed
            },
        }
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["cgtraced", "cgtrace_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    // Events may go to stdout; keep diagnostics on stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Opens the sink selected on the command line.
fn open_emitter(args: &Args) -> io::Result<Box<dyn EventEmitter>> {
    match (args.format, &args.output) {
        (OutputFormat::Log, path) => {
            let path = path.clone().unwrap_or_else(|| PathBuf::from("./events.log"));
            let writer = EventLogWriter::open(&path)?;
            info!("Writing framed event log to {}", path.display());
            Ok(Box::new(writer))
        }
        (OutputFormat::Json, Some(path)) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            info!("Writing JSON lines to {}", path.display());
            Ok(Box::new(JsonLinesSink::new(BufWriter::new(file))))
        }
        (OutputFormat::Json, None) => Ok(Box::new(JsonLinesSink::new(io::stdout()))),
    }
}

/// Describes a cycle for logging.
fn describe_report(report: &ScanReport) -> String {
    if report.discovery_failed {
        return "mount table unreadable, skipped".to_string();
    }

    let mut parts = vec![
        format!("{} roots", report.roots),
        format!("{} groups", report.groups),
        format!("{} events", report.events),
    ];
    if report.added > 0 {
        parts.push(format!("+{} groups", report.added));
    }
    if report.removed > 0 {
        parts.push(format!("-{} groups", report.removed));
    }
    if report.parse_errors > 0 {
        parts.push(format!("{} parse errors", report.parse_errors));
    }
    if report.read_timeouts > 0 {
        parts.push(format!("{} timeouts", report.read_timeouts));
    }
    if report.unreadable_roots > 0 {
        parts.push(format!("{} unreadable roots", report.unreadable_roots));
    }
    if report.incomplete > 0 {
        parts.push(format!("{} incomplete listings", report.incomplete));
    }

    parts.join(", ")
}

/// Scans until shutdown. Returns `false` if the loop stopped on a fatal error.
fn run<F: FileSystem>(
    scanner: &mut Scanner<F>,
    emitter: &mut dyn EventEmitter,
    running: &AtomicBool,
    shutdown: &AtomicBool,
    once: bool,
) -> bool {
    let interval = scanner.config().interval;

    while running.load(Ordering::SeqCst) {
        match scanner.scan(emitter, shutdown) {
            Ok(report) => {
                info!(
                    "Cycle #{}: {} ({:?})",
                    report.cycle,
                    describe_report(&report),
                    report.duration
                );
            }
            Err(ScanError::Cancelled) => {
                debug!("Cycle #{} cancelled", scanner.cycle());
                break;
            }
            Err(e @ ScanError::Emit(_)) => {
                error!("Stopping: {}", e);
                return false;
            }
        }

        if once {
            break;
        }

        // Sleep with periodic checks for shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    true
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    let config = args.scan_config();
    let read_timeout = args.read_timeout();
    info!("cgtraced {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: interval={}s, mounts={}, read_timeout={:?}, workers={}, device_records={:?}, schema={:?}",
        args.interval,
        args.mounts.display(),
        read_timeout,
        config.workers,
        config.device_records,
        config.schema
    );

    #[cfg(target_os = "linux")]
    let fs = TimeoutFs::new(
        RealFs::new().with_mounts_path(args.mounts.clone()),
        read_timeout,
    );
    #[cfg(not(target_os = "linux"))]
    let fs = {
        warn!("Not running on Linux: scanning an empty in-memory hierarchy");
        TimeoutFs::new(MockFs::new(), read_timeout)
    };

    let mut emitter = match open_emitter(&args) {
        Ok(emitter) => emitter,
        Err(e) => {
            error!("Cannot open output: {}", e);
            std::process::exit(1);
        }
    };

    let mut scanner = Scanner::new(fs, config);

    // Setup graceful shutdown. `running` stops the loop; `shutdown` aborts
    // a cycle in progress.
    let running = Arc::new(AtomicBool::new(true));
    let shutdown = Arc::new(AtomicBool::new(false));
    let (r, s) = (running.clone(), shutdown.clone());

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
        s.store(true, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    info!("Starting scan loop");
    let ok = run(
        &mut scanner,
        emitter.as_mut(),
        &running,
        &shutdown,
        args.once,
    );

    info!("Shutting down...");
    if let Err(e) = emitter.flush() {
        error!("Final flush failed: {}", e);
        std::process::exit(1);
    }
    if !ok {
        std::process::exit(1);
    }
    info!("Shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgtrace_core::collector::{FixedClock, MockFs};
    use cgtrace_core::emit::MemorySink;

    #[test]
    fn describe_report_lists_counts() {
        let report = ScanReport {
            cycle: 3,
            roots: 2,
            groups: 40,
            events: 7,
            added: 1,
            parse_errors: 2,
            unreadable_roots: 1,
            ..Default::default()
        };

        let desc = describe_report(&report);
        assert!(desc.contains("2 roots"));
        assert!(desc.contains("40 groups"));
        assert!(desc.contains("+1 groups"));
        assert!(desc.contains("2 parse errors"));
        assert!(desc.contains("1 unreadable roots"));
        assert!(!desc.contains("timeouts"));
    }

    #[test]
    fn describe_report_discovery_failure() {
        let report = ScanReport {
            discovery_failed: true,
            ..Default::default()
        };
        assert!(describe_report(&report).contains("skipped"));
    }

    #[test]
    fn args_map_to_scan_config() {
        let args = Args::parse_from([
            "cgtraced",
            "--interval",
            "5",
            "--device-records",
            "structured",
            "--path-keyed",
            "--workers",
            "0",
            "--read-timeout-ms",
            "750",
        ]);
        let config = args.scan_config();
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.device_records, DeviceRecordMode::Structured);
        assert_eq!(config.schema, SchemaMode::PathKeyed);
        assert_eq!(config.workers, 1);
        assert_eq!(args.read_timeout(), Duration::from_millis(750));
        assert_eq!(args.format, OutputFormat::Log);
    }

    #[test]
    fn run_once_scans_a_single_cycle() {
        let mut scanner =
            Scanner::new(MockFs::cgroup_v1_cpu(), ScanConfig::default()).with_clock(FixedClock(0));
        let mut sink = MemorySink::new();
        let running = AtomicBool::new(true);
        let shutdown = AtomicBool::new(false);

        assert!(run(&mut scanner, &mut sink, &running, &shutdown, true));
        assert_eq!(scanner.cycle(), 1);
        assert_eq!(sink.records.len(), 4);
    }
}
