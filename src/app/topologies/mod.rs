pub mod pixel_count;
pub mod wordcount;

use crate::core::topology::TopologyRegistry;
use crate::utils::error::Result;

/// Topologies shipped with the binaries.
pub fn builtin_topologies() -> Result<TopologyRegistry> {
    let mut registry = TopologyRegistry::new();
    registry.register(wordcount::topology()?);
    registry.register(pixel_count::topology()?);
    Ok(registry)
}
