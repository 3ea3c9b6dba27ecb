pub mod event_log;
pub mod model;
pub mod registry;

pub use event_log::{EventLogReader, EventLogWriter};
pub use model::{Event, EventRecord, HierarchySnapshot};
pub use registry::PathRegistry;
