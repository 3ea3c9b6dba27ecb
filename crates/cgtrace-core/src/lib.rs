//! cgtrace-core - cgroup hierarchy observer.
//!
//! Provides:
//! - `collector` - mount discovery, hierarchy walk, control-file parsing,
//!   snapshot diffing and the scan cycle that ties them together
//! - `emit` - event sinks (memory, JSON lines, framed log)
//! - `storage` - data model, path id registry, framed event log
//!
//! With `json` feature (default):
//! - `emit::JsonLinesSink` - one JSON object per event

pub mod collector;
pub mod emit;
pub mod storage;
