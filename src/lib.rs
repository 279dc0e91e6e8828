pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::{Cli, RunPureArgs, SparseRunArgs};

pub use core::collector::{Emit, OutputCollector};
pub use core::local_cluster::{ClusterStats, LocalCluster};
pub use core::runtime::run_component;
pub use core::topology::{
    ComponentSpec, Grouping, InputSpec, Parallelism, StreamSpec, Topology, TopologyRegistry,
};
pub use domain::model::{StormConfig, TopologyContext, Tuple, TupleId, Values};
pub use domain::ports::{BatchingBolt, Bolt, Spout};
pub use utils::error::{Result, SparseError};
