pub mod acker;
pub mod batching;
pub mod bolt;
pub mod collector;
pub mod component;
pub mod local_cluster;
pub mod protocol;
pub mod runtime;
pub mod serializer;
pub mod spout;
pub mod topology;

pub use crate::domain::model::{StormConfig, TopologyContext, Tuple, TupleId, Values};
pub use crate::domain::ports::{BatchingBolt, Bolt, Spout};
pub use crate::utils::error::Result;
