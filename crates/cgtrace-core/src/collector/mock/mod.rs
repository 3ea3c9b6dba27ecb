mod filesystem;
mod scenarios;

pub use filesystem::MockFs;
pub use scenarios::{V1_CPU_ROOT, V2_ROOT};
