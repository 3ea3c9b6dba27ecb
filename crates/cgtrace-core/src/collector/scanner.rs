//! One scan cycle, end to end.
//!
//! ```text
//! discover roots ─► walk each root ─► read groups (worker threads)
//!                                              │
//!        commit ◄─ release ids ◄─ emit+flush ◄─ diff
//! ```
//!
//! Workers only read the previous snapshot and fill their own buffers. The
//! registry, the emitter and the snapshot are touched by the calling thread
//! alone, after every worker has joined.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::collector::cgroup::{
    Cancelled, DeviceRecordMode, GroupRead, RootDiscovery, WalkedGroup, read_group, walk,
};
use crate::collector::diff::{DiffEngine, SchemaMode};
use crate::collector::traits::FileSystem;
use crate::emit::{EmitError, EventEmitter};
use crate::storage::PathRegistry;
use crate::storage::model::{EventRecord, GroupSnapshot, HierarchySnapshot};

/// Default time between cycles.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
/// Default number of reader threads.
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub interval: Duration,
    pub workers: usize,
    pub device_records: DeviceRecordMode,
    pub schema: SchemaMode,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            workers: DEFAULT_WORKERS,
            device_records: DeviceRecordMode::default(),
            schema: SchemaMode::default(),
        }
    }
}

/// Source of event timestamps (unix seconds).
pub trait Clock: Send {
    fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0
    }
}

#[derive(Debug)]
pub enum ScanError {
    /// Shutdown was requested mid-cycle. Nothing was emitted or committed.
    Cancelled,
    /// The emitter failed. The loop should stop.
    Emit(EmitError),
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::Cancelled => f.write_str("scan cancelled"),
            ScanError::Emit(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScanError::Cancelled => None,
            ScanError::Emit(e) => Some(e),
        }
    }
}

impl From<EmitError> for ScanError {
    fn from(e: EmitError) -> Self {
        ScanError::Emit(e)
    }
}

impl From<Cancelled> for ScanError {
    fn from(_: Cancelled) -> Self {
        ScanError::Cancelled
    }
}

/// Summary of one cycle.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub cycle: u64,
    pub roots: usize,
    pub groups: usize,
    pub events: usize,
    pub added: usize,
    pub removed: usize,
    pub parse_errors: usize,
    pub read_timeouts: usize,
    /// Listings that failed and had their previous subtree carried over.
    pub incomplete: usize,
    /// Mounted roots that could not be listed; they contribute no groups.
    pub unreadable_roots: usize,
    /// The mount table was unreadable; nothing was emitted or committed.
    pub discovery_failed: bool,
    pub duration: Duration,
}

/// Result of the parallel read phase.
#[derive(Default)]
struct ReadBatch {
    groups: Vec<(PathBuf, GroupSnapshot)>,
    parse_errors: usize,
    read_timeouts: usize,
}

pub struct Scanner<F: FileSystem> {
    fs: F,
    config: ScanConfig,
    clock: Box<dyn Clock>,
    discovery: RootDiscovery,
    registry: PathRegistry,
    engine: DiffEngine,
    previous: HierarchySnapshot,
    committed: bool,
    cycle: u64,
}

impl<F: FileSystem> Scanner<F> {
    pub fn new(fs: F, config: ScanConfig) -> Self {
        let engine = DiffEngine::new(config.schema);
        Self {
            fs,
            config,
            clock: Box::new(SystemClock),
            discovery: RootDiscovery::new(),
            registry: PathRegistry::new(),
            engine,
            previous: HierarchySnapshot::default(),
            committed: false,
            cycle: 0,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn registry(&self) -> &PathRegistry {
        &self.registry
    }

    /// Snapshot committed by the last successful cycle.
    pub fn previous(&self) -> &HierarchySnapshot {
        &self.previous
    }

    /// Number of cycles attempted so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Runs one cycle and hands its events to `emitter`.
    ///
    /// The previous snapshot stays authoritative unless the cycle completes:
    /// on cancellation, discovery failure or emit failure nothing is
    /// committed.
    pub fn scan(
        &mut self,
        emitter: &mut dyn EventEmitter,
        shutdown: &AtomicBool,
    ) -> Result<ScanReport, ScanError> {
        let started = Instant::now();
        self.cycle += 1;
        let timestamp = self.clock.now();
        let mut report = ScanReport {
            cycle: self.cycle,
            ..Default::default()
        };

        let discovery = match self.discovery.discover(&self.fs) {
            Ok(discovery) => discovery,
            Err(e) => {
                warn!("Cycle {} skipped: {}", self.cycle, e);
                report.discovery_failed = true;
                report.duration = started.elapsed();
                return Ok(report);
            }
        };
        let roots = discovery.roots();
        report.roots = roots.len();

        // Nested mounts would otherwise be walked twice; the first walk wins.
        let mut walked: BTreeMap<PathBuf, WalkedGroup> = BTreeMap::new();
        let mut incomplete = Vec::new();
        for root in &roots {
            let outcome = walk(&self.fs, root, shutdown)?;
            report.read_timeouts += outcome.timeouts;
            report.unreadable_roots += usize::from(outcome.root_unreadable);
            incomplete.extend(outcome.incomplete);
            for group in outcome.groups {
                walked.entry(group.path.clone()).or_insert(group);
            }
        }
        report.incomplete = incomplete.len();

        let mut current = HierarchySnapshot::new(timestamp);

        // Subtrees whose listing failed keep their previous state. A
        // directory never seen before is skipped until a listing succeeds.
        for dir in &incomplete {
            walked.remove(dir);
            let Some(own) = self.previous.get(dir) else {
                continue;
            };
            current.groups.insert(dir.clone(), own.clone());
            for (path, group) in self.previous.descendants(dir) {
                current.groups.insert(path.clone(), group.clone());
            }
        }
        let to_read: Vec<WalkedGroup> = walked
            .into_values()
            .filter(|g| !current.contains(&g.path))
            .collect();

        let batch = self.read_groups(&to_read, shutdown)?;
        report.parse_errors = batch.parse_errors;
        report.read_timeouts += batch.read_timeouts;
        current.groups.extend(batch.groups);
        report.groups = current.len();

        if shutdown.load(Ordering::Relaxed) {
            return Err(ScanError::Cancelled);
        }

        let diff = self.engine.diff(
            &self.previous,
            &current,
            &discovery.new,
            &mut self.registry,
            !self.committed,
        );
        report.removed = diff.removed.len();
        report.added = current
            .groups
            .keys()
            .filter(|p| !self.previous.contains(p))
            .count();

        for event in diff.events {
            emitter.emit(&EventRecord {
                timestamp,
                cycle: self.cycle,
                event,
            })?;
            report.events += 1;
        }
        emitter.flush()?;

        for path in &diff.removed {
            self.registry.release(path);
        }
        self.discovery.commit(&discovery);
        self.previous = current;
        self.committed = true;

        report.duration = started.elapsed();
        debug!(
            "Cycle {}: {} groups, {} events in {:?}",
            report.cycle, report.groups, report.events, report.duration
        );
        Ok(report)
    }

    /// Reads every group on up to `workers` scoped threads.
    fn read_groups(
        &self,
        groups: &[WalkedGroup],
        shutdown: &AtomicBool,
    ) -> Result<ReadBatch, Cancelled> {
        if groups.is_empty() {
            return Ok(ReadBatch::default());
        }

        let workers = self.config.workers.clamp(1, groups.len());
        let chunk_size = groups.len().div_ceil(workers);
        let previous = &self.previous;
        let fs = &self.fs;
        let mode = self.config.device_records;

        let results: Vec<Result<ReadBatch, Cancelled>> = thread::scope(|scope| {
            let handles: Vec<_> = groups
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        let mut batch = ReadBatch::default();
                        for group in chunk {
                            if shutdown.load(Ordering::Relaxed) {
                                return Err(Cancelled);
                            }
                            match read_group(fs, group, previous.get(&group.path), mode) {
                                GroupRead::Present(state) => {
                                    batch.parse_errors += state.parse_errors;
                                    batch.read_timeouts += state.read_timeouts;
                                    batch.groups.push((group.path.clone(), state.snapshot));
                                }
                                GroupRead::Vanished => {}
                            }
                        }
                        Ok(batch)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        });

        let mut merged = ReadBatch::default();
        for result in results {
            let batch = result?;
            merged.parse_errors += batch.parse_errors;
            merged.read_timeouts += batch.read_timeouts;
            merged.groups.extend(batch.groups);
        }
        Ok(merged)
    }
}
