//! `sparse run_pure`: run a registered topology in this process.

use crate::config::options::{resolve_options, set_topology_serializer, SERIALIZER_OPTION};
use crate::config::project::ProjectConfig;
use crate::core::local_cluster::{ClusterStats, LocalCluster};
use crate::core::serializer::SUPPORTED_SERIALIZERS;
use crate::core::topology::TopologyRegistry;
use crate::domain::model::StormConfig;
use crate::utils::error::Result;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct RunPureRequest {
    pub name: Option<String>,
    pub env_name: Option<String>,
    pub options: StormConfig,
    pub config_file: Option<String>,
    pub override_name: Option<String>,
    /// `None` runs until Ctrl-C.
    pub running_time: Option<Duration>,
}

/// Final options for an in-process run: one worker, and one acker unless
/// acking was turned off with zero ackers.
pub fn pure_options(
    request: &RunPureRequest,
    project: &ProjectConfig,
    registry: &TopologyRegistry,
) -> Result<(String, StormConfig)> {
    let topology = registry.resolve(request.name.as_deref())?;
    let (env_name, env) = project.env_config(request.env_name.as_deref())?;
    // -N only picks the virtualenv; the run keeps the topology's name
    let virtualenv_name = request
        .override_name
        .as_deref()
        .unwrap_or(&topology.name);

    let mut options =
        resolve_options(&request.options, &env, &topology.config, virtualenv_name, true);
    set_topology_serializer(&mut options, &env, project);
    if let Some(serializer) = options.get(SERIALIZER_OPTION).and_then(Value::as_str) {
        if !SUPPORTED_SERIALIZERS.contains(&serializer) {
            tracing::warn!(
                "Serializer {} is not supported by sparse_run; only the local run will work",
                serializer
            );
        }
    }

    let ackers_off = options
        .get("topology.acker.executors")
        .and_then(Value::as_i64)
        == Some(0);
    options.insert(
        "topology.acker.executors".to_string(),
        Value::from(if ackers_off { 0 } else { 1 }),
    );
    options.insert("topology.workers".to_string(), Value::from(1));
    options.insert("topology.name".to_string(), Value::from(topology.name.as_str()));

    Ok((env_name, options))
}

pub async fn run_pure(
    request: RunPureRequest,
    registry: &TopologyRegistry,
) -> Result<ClusterStats> {
    let project = ProjectConfig::load(request.config_file.as_deref())?;
    let (env_name, options) = pure_options(&request, &project, registry)?;
    let topology = registry.resolve(request.name.as_deref())?;

    tracing::info!(
        "Running topology {} locally in environment {}",
        topology.name,
        env_name
    );
    match request.running_time {
        Some(time) => tracing::info!("Stopping after {:.1} seconds", time.as_secs_f64()),
        None => tracing::info!("Running until interrupted"),
    }

    let mut cluster = LocalCluster::start(topology, Some(&env_name), options).await?;
    cluster.run(request.running_time).await
}
