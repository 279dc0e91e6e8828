//! Storm option resolution.
//!
//! Options come from three places, later ones winning: the environment's
//! `options` in the project config, the topology's own config, then `-o`
//! flags on the command line.

use crate::config::project::{EnvConfig, ProjectConfig};
use crate::domain::model::StormConfig;
use crate::utils::error::{Result, SparseError};
use serde_json::Value;

pub const SERIALIZER_OPTION: &str = "topology.multilang.serializer";
const DEFAULT_SERIALIZER: &str = "json";

pub fn resolve_options(
    cli_options: &StormConfig,
    env: &EnvConfig,
    topology_config: &StormConfig,
    topology_name: &str,
    local_only: bool,
) -> StormConfig {
    let mut options = env.options.clone();

    if env.use_virtualenv.unwrap_or(true) {
        if let Some(root) = &env.virtualenv_root {
            let python_path =
                format!("{}/{}/bin/python", root.trim_end_matches('/'), topology_name);
            options.insert("topology.python.path".to_string(), Value::String(python_path));
        }
    }

    let log_path = env.log.path.as_ref().or(env.log_path.as_ref());
    let log_file = env.log.file.as_ref().or(env.log_file.as_ref());
    if let Some(path) = log_path {
        options.insert("sparse.log.path".to_string(), Value::from(path.as_str()));
    }
    if let Some(file) = log_file {
        options.insert("sparse.log.file".to_string(), Value::from(file.as_str()));
    }
    if let Some(max_bytes) = env.log.max_bytes {
        options.insert("sparse.log.max_bytes".to_string(), Value::from(max_bytes));
    }
    if let Some(backup_count) = env.log.backup_count {
        options.insert("sparse.log.backup_count".to_string(), Value::from(backup_count));
    }
    if let Some(level) = &env.log.level {
        options.insert("sparse.log.level".to_string(), Value::from(level.to_lowercase()));
    }

    insert_some(&mut options, "install_virtualenv", env.install_virtualenv.map(Value::from));
    insert_some(&mut options, "use_virtualenv", env.use_virtualenv.map(Value::from));
    insert_some(&mut options, "virtualenv_flags", env.virtualenv_flags.clone().map(Value::from));
    insert_some(&mut options, "virtualenv_root", env.virtualenv_root.clone().map(Value::from));
    insert_some(&mut options, "virtualenv_name", env.virtualenv_name.clone().map(Value::from));

    // the key is always present, so it stays null without an env user
    options.insert(
        "sudo_user".to_string(),
        env.user.clone().map(Value::from).unwrap_or(Value::Null),
    );

    options.extend(topology_config.clone());
    options.extend(cli_options.clone());

    if options.get("topology.debug").is_some_and(is_truthy) {
        options.insert("sparse.log.level".to_string(), Value::from("debug"));
    }

    let num_workers = if local_only {
        options.insert("storm.workers.list".to_string(), Value::Array(Vec::new()));
        1
    } else {
        let workers: Vec<Value> = match options.get("storm.workers.list") {
            Some(Value::String(list)) if !list.is_empty() => list
                .split(',')
                .map(|worker| Value::from(worker.trim()))
                .collect(),
            Some(Value::Array(list)) if !list.is_empty() => list.clone(),
            _ => env.workers.iter().map(|w| Value::from(w.as_str())).collect(),
        };
        let count = workers.len();
        options.insert("storm.workers.list".to_string(), Value::Array(workers));
        count
    };
    for key in ["topology.acker.executors", "topology.workers"] {
        if options.get(key).map_or(true, Value::is_null) {
            options.insert(key.to_string(), Value::from(num_workers));
        }
    }

    options
}

/// Sets `topology.multilang.serializer` unless already given, from the
/// environment, then the project, then `json`.
pub fn set_topology_serializer(
    options: &mut StormConfig,
    env: &EnvConfig,
    project: &ProjectConfig,
) {
    if options.contains_key(SERIALIZER_OPTION) {
        return;
    }
    let serializer = env
        .serializer
        .clone()
        .or_else(|| project.serializer.clone())
        .unwrap_or_else(|| DEFAULT_SERIALIZER.to_string());
    options.insert(SERIALIZER_OPTION.to_string(), Value::String(serializer));
}

/// Parses a `key=value` option. Values that parse as JSON keep their type,
/// everything else becomes a string.
pub fn parse_option(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw.split_once('=').ok_or_else(|| {
        SparseError::InvalidConfigValueError {
            field: "option".to_string(),
            value: raw.to_string(),
            reason: "Options must look like key=value".to_string(),
        }
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(SparseError::InvalidConfigValueError {
            field: "option".to_string(),
            value: raw.to_string(),
            reason: "Option key cannot be empty".to_string(),
        });
    }

    let value = value.trim();
    let parsed =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), parsed))
}

pub fn parse_options<I, S>(raw: I) -> Result<StormConfig>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = StormConfig::new();
    for option in raw {
        let (key, value) = parse_option(option.as_ref())?;
        options.insert(key, value);
    }
    Ok(options)
}

fn insert_some(options: &mut StormConfig, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        options.insert(key.to_string(), value);
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Null => false,
        _ => true,
    }
}
