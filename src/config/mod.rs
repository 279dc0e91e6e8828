#[cfg(feature = "cli")]
pub mod cli;
pub mod options;
pub mod project;

pub use options::{resolve_options, set_topology_serializer};
pub use project::{EnvConfig, LogConfig, ProjectConfig};
