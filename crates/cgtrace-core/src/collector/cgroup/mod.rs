//! cgroup filesystem readers: mount discovery, hierarchy walk, control-file
//! parsing and per-group state.

pub mod files;
pub mod mounts;
pub mod parser;
pub mod reader;
pub mod walker;

pub use mounts::{Discovery, DiscoveryError, RootDiscovery};
pub use parser::{DeviceRecordMode, ParseError};
pub use reader::{GroupRead, GroupState, read_group};
pub use walker::{Cancelled, WalkOutcome, WalkedGroup, walk};
