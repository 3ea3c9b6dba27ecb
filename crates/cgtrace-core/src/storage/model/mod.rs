//! Data model: parsed values, snapshots and the emitted event schema.

pub mod event;
pub mod snapshot;
pub mod value;

pub use event::{Event, EventRecord, GroupKey, PathStatus};
pub use snapshot::{FileState, GroupSnapshot, HierarchySnapshot, Subsystem};
pub use value::{ParsedFile, ParsedValue};
