pub mod run_pure;
pub mod topologies;

pub use run_pure::{run_pure, RunPureRequest};
pub use topologies::builtin_topologies;
