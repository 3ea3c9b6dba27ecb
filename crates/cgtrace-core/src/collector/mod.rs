//! cgroup hierarchy scanner.
//!
//! This module discovers cgroup mounts, walks every hierarchy, reads
//! membership and control files, and turns the difference between two
//! consecutive snapshots into change events.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Scanner                            │
//! │  ┌───────────────┐  ┌───────────────┐  ┌────────────────┐   │
//! │  │ RootDiscovery │  │    walker     │  │  read_group    │   │
//! │  │ - mountinfo   │  │ - read_dir    │  │ - cgroup.procs │   │
//! │  └───────┬───────┘  └───────┬───────┘  │ - control files│   │
//! │          │                  │          └───────┬────────┘   │
//! │          └──────────────────┼──────────────────┘            │
//! │                             │        DiffEngine ─► emitter  │
//! │                      ┌──────▼──────┐                        │
//! │                      │  FileSystem │ (trait)                │
//! │                      └──────┬──────┘                        │
//! └─────────────────────────────┼───────────────────────────────┘
//!                               │
//!        ┌──────────────────────┼──────────────────────┐
//!        │                      │                      │
//! ┌──────▼──────┐        ┌──────▼──────┐        ┌──────▼──────┐
//! │   RealFs    │        │  TimeoutFs  │        │   MockFs    │
//! │  (Linux)    │        │ (wrapper)   │        │ (Testing)   │
//! └─────────────┘        └─────────────┘        └─────────────┘
//! ```
//!
//! # Usage
//!
//! ## Production (Linux)
//!
//! ```ignore
//! use cgtrace_core::collector::{
//!     DEFAULT_READ_TIMEOUT, RealFs, ScanConfig, Scanner, TimeoutFs,
//! };
//! use cgtrace_core::emit::MemorySink;
//!
//! // Reads are only bounded when the filesystem is wrapped.
//! let fs = TimeoutFs::new(RealFs::new(), DEFAULT_READ_TIMEOUT);
//! let mut scanner = Scanner::new(fs, ScanConfig::default());
//! let report = scanner.scan(&mut MemorySink::new(), &shutdown)?;
//! ```
//!
//! ## Testing (with MockFs)
//!
//! ```
//! use std::sync::atomic::AtomicBool;
//! use cgtrace_core::collector::{MockFs, ScanConfig, Scanner};
//! use cgtrace_core::emit::MemorySink;
//!
//! let fs = MockFs::cgroup_v1_cpu();
//! let mut scanner = Scanner::new(fs, ScanConfig::default());
//! let mut sink = MemorySink::new();
//! let report = scanner.scan(&mut sink, &AtomicBool::new(false)).unwrap();
//! assert_eq!(report.groups, 2);
//! assert!(!sink.records.is_empty());
//! ```

pub mod cgroup;
pub mod diff;
pub mod mock;
pub mod scanner;
pub mod timeout;
pub mod traits;

pub use cgroup::{DeviceRecordMode, DiscoveryError, ParseError};
pub use diff::{DiffEngine, SchemaMode};
pub use mock::{MockFs, V1_CPU_ROOT, V2_ROOT};
pub use scanner::{Clock, FixedClock, ScanConfig, ScanError, ScanReport, Scanner, SystemClock};
pub use timeout::{DEFAULT_READ_TIMEOUT, TimeoutFs};
pub use traits::{FileSystem, RealFs};
