use crate::domain::model::StormConfig;
use crate::utils::error::{Result, SparseError};
use crate::utils::validation::{
    validate_extension, validate_non_empty_string, validate_one_of, validate_path,
    validate_required_field, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Project level settings, usually `config.json` at the project root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub serializer: Option<String>,
    #[serde(default = "default_topology_specs")]
    pub topology_specs: String,
    #[serde(default = "default_virtualenv_specs")]
    pub virtualenv_specs: String,
    #[serde(default)]
    pub envs: BTreeMap<String, EnvConfig>,
}

fn default_topology_specs() -> String {
    "topologies/".to_string()
}

fn default_virtualenv_specs() -> String {
    "virtualenvs/".to_string()
}

/// One deployment environment (`envs.<name>`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvConfig {
    pub user: Option<String>,
    pub nimbus: Option<String>,
    #[serde(default)]
    pub workers: Vec<String>,
    #[serde(default)]
    pub log: LogConfig,
    pub log_path: Option<String>,
    pub log_file: Option<String>,
    pub virtualenv_root: Option<String>,
    pub virtualenv_name: Option<String>,
    pub virtualenv_flags: Option<String>,
    pub install_virtualenv: Option<bool>,
    pub use_virtualenv: Option<bool>,
    pub serializer: Option<String>,
    #[serde(default)]
    pub options: StormConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    pub path: Option<String>,
    pub file: Option<String>,
    pub max_bytes: Option<u64>,
    pub backup_count: Option<u32>,
    pub level: Option<String>,
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "warning", "error", "critical"];

impl ProjectConfig {
    /// Loads `.json` or `.toml` by extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let extension = validate_extension("config", path, &["json", "toml"])?;

        let content = std::fs::read_to_string(path)?;
        let config = if extension == "toml" {
            Self::from_toml_str(&content)?
        } else {
            Self::from_json_str(&content)?
        };
        config.validate()?;
        tracing::debug!("Loaded project config from {}", path.display());
        Ok(config)
    }

    /// Loads `path`, or the default `config.json` when no path is given.
    /// A missing default file yields an empty config.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => {
                tracing::warn!(
                    "No {} found, using default project settings",
                    DEFAULT_CONFIG_FILE
                );
                Ok(Self::default_project())
            }
        }
    }

    pub fn default_project() -> Self {
        Self {
            serializer: None,
            topology_specs: default_topology_specs(),
            virtualenv_specs: default_virtualenv_specs(),
            envs: BTreeMap::new(),
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let processed = substitute_env_vars(content)?;
        serde_json::from_str(&processed).map_err(|e| SparseError::InvalidConfigValueError {
            field: "config".to_string(),
            value: "json".to_string(),
            reason: format!("JSON parsing error: {}", e),
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = substitute_env_vars(content)?;
        Ok(toml::from_str(&processed)?)
    }

    /// Picks the environment to use.
    ///
    /// An explicit name must exist. Without one, a single configured
    /// environment is used, and no environments at all means defaults.
    pub fn env_config(&self, name: Option<&str>) -> Result<(String, EnvConfig)> {
        if let Some(name) = name {
            return self
                .envs
                .get(name)
                .map(|env| (name.to_string(), env.clone()))
                .ok_or_else(|| {
                    SparseError::config(format!(
                        "Environment \"{}\" not found in config. Known environments: {}",
                        name,
                        self.env_names().join(", ")
                    ))
                });
        }

        match self.envs.len() {
            0 => Ok(("local".to_string(), EnvConfig::default())),
            1 => Ok(self
                .envs
                .iter()
                .next()
                .map(|(name, env)| (name.clone(), env.clone()))
                .unwrap_or_default()),
            _ => Err(SparseError::config(format!(
                "Found more than one environment ({}); specify one with -e",
                self.env_names().join(", ")
            ))),
        }
    }

    pub fn env_names(&self) -> Vec<&str> {
        self.envs.keys().map(String::as_str).collect()
    }
}

/// Replaces `${VAR}` with the environment value; unknown vars are kept.
fn substitute_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| SparseError::config(format!("invalid substitution pattern: {}", e)))?;

    let result = re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
    });
    Ok(result.into_owned())
}

impl Validate for ProjectConfig {
    fn validate(&self) -> Result<()> {
        if let Some(serializer) = &self.serializer {
            validate_non_empty_string("serializer", serializer)?;
        }
        for (name, env) in &self.envs {
            validate_non_empty_string("envs", name)?;
            env.validate().map_err(|e| {
                SparseError::config(format!("environment \"{}\": {}", name, e))
            })?;
        }
        Ok(())
    }
}

impl Validate for EnvConfig {
    fn validate(&self) -> Result<()> {
        if let Some(level) = &self.log.level {
            validate_one_of("log.level", &level.to_lowercase(), LOG_LEVELS)?;
        }
        if self.install_virtualenv == Some(true) {
            validate_required_field("virtualenv_root", &self.virtualenv_root)?;
        }
        if let Some(root) = &self.virtualenv_root {
            validate_path("virtualenv_root", root)?;
        }
        for worker in &self.workers {
            validate_non_empty_string("workers", worker)?;
        }
        if let Some(serializer) = &self.serializer {
            validate_non_empty_string("serializer", serializer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    const JSON_CONFIG: &str = r#"{
        "serializer": "json",
        "topology_specs": "topologies/",
        "virtualenv_specs": "virtualenvs/",
        "envs": {
            "prod": {
                "user": "storm",
                "nimbus": "nimbus.example.com",
                "workers": ["worker1.example.com", "worker2.example.com"],
                "log": {"path": "/var/log/storm", "max_bytes": 1000000, "level": "INFO"},
                "virtualenv_root": "/data/virtualenvs",
                "options": {"topology.max.spout.pending": 500}
            }
        }
    }"#;

    #[test]
    fn test_parse_json_config() {
        let config = ProjectConfig::from_json_str(JSON_CONFIG).unwrap();
        let (name, env) = config.env_config(None).unwrap();

        assert_eq!(name, "prod");
        assert_eq!(env.user.as_deref(), Some("storm"));
        assert_eq!(env.workers.len(), 2);
        assert_eq!(env.log.max_bytes, Some(1_000_000));
        assert_eq!(env.options["topology.max.spout.pending"], 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml_config() {
        let toml_content = r#"
serializer = "json"

[envs.dev]
user = "me"
log_path = "/tmp/logs"

[envs.dev.options]
"topology.debug" = true
"#;

        let config = ProjectConfig::from_toml_str(toml_content).unwrap();
        let (_, env) = config.env_config(Some("dev")).unwrap();
        assert_eq!(env.log_path.as_deref(), Some("/tmp/logs"));
        assert_eq!(env.options["topology.debug"], true);
        assert_eq!(config.topology_specs, "topologies/");
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("SPARSE_TEST_NIMBUS", "nimbus.internal");

        let raw = r#"{"envs": {"prod": {
            "nimbus": "${SPARSE_TEST_NIMBUS}",
            "user": "${SPARSE_UNSET_VAR}"
        }}}"#;
        let config = ProjectConfig::from_json_str(raw).unwrap();
        let env = &config.envs["prod"];
        assert_eq!(env.nimbus.as_deref(), Some("nimbus.internal"));
        assert_eq!(env.user.as_deref(), Some("${SPARSE_UNSET_VAR}"));

        std::env::remove_var("SPARSE_TEST_NIMBUS");
    }

    #[test]
    fn test_env_selection() {
        let config = ProjectConfig::from_json_str(
            r#"{"envs": {"prod": {}, "staging": {}}}"#,
        )
        .unwrap();

        assert!(config.env_config(None).is_err());
        assert!(config.env_config(Some("missing")).is_err());
        assert_eq!(config.env_config(Some("staging")).unwrap().0, "staging");

        let (name, env) = ProjectConfig::default_project().env_config(None).unwrap();
        assert_eq!(name, "local");
        assert_eq!(env, EnvConfig::default());
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let config = ProjectConfig::from_json_str(
            r#"{"envs": {"prod": {"log": {"level": "loud"}}}}"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_install_virtualenv_needs_root() {
        let config = ProjectConfig::from_json_str(
            r#"{"envs": {"prod": {"install_virtualenv": true}}}"#,
        )
        .unwrap();
        assert!(matches!(
            config.envs["prod"].validate(),
            Err(SparseError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = Builder::new().suffix(".json").tempfile().unwrap();
        temp_file.write_all(JSON_CONFIG.as_bytes()).unwrap();

        let config = ProjectConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.serializer.as_deref(), Some("json"));

        let yaml = Builder::new().suffix(".yaml").tempfile().unwrap();
        assert!(ProjectConfig::from_file(yaml.path()).is_err());
    }

    #[test]
    fn test_toml_config_from_file() {
        let mut temp_file = Builder::new().suffix(".toml").tempfile().unwrap();
        temp_file
            .write_all(b"serializer = \"msgpack\"\n\n[envs.prod]\nuser = \"storm\"\n")
            .unwrap();

        let config = ProjectConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.serializer.as_deref(), Some("msgpack"));
        assert_eq!(config.envs["prod"].user.as_deref(), Some("storm"));
    }
}
