use crate::app::run_pure::RunPureRequest;
use crate::config::options::parse_options;
use crate::utils::error::Result;
use crate::utils::validation::{validate_non_empty_string, Validate};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "sparse")]
#[command(about = "Run and inspect Storm multilang topologies")]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a topology in this process without Storm
    #[command(name = "run_pure")]
    RunPure(RunPureArgs),
    /// List the built-in topologies and their components
    List,
}

#[derive(Debug, Clone, Args)]
pub struct RunPureArgs {
    /// Name of the topology to run
    #[arg(short, long)]
    pub name: Option<String>,

    /// The environment to use from the project config
    #[arg(short, long)]
    pub environment: Option<String>,

    /// Storm option as key=value, may be repeated
    #[arg(short, long = "option", value_name = "KEY=VALUE")]
    pub options: Vec<String>,

    /// Number of acker executors
    #[arg(short, long)]
    pub ackers: Option<u32>,

    /// Set topology.debug, optionally to an explicit value
    #[arg(short, long, num_args = 0..=1, default_missing_value = "true")]
    pub debug: Option<bool>,

    /// Number of Storm workers
    #[arg(short, long)]
    pub workers: Option<u32>,

    /// Run the topology under a different name
    #[arg(short = 'N', long)]
    pub override_name: Option<String>,

    /// Path to config.json or config.toml
    #[arg(long)]
    pub config: Option<String>,

    /// Seconds to keep running; 0 or less runs until Ctrl-C
    #[arg(short, long, default_value_t = 0.0)]
    pub time: f64,

    /// Log process CPU and memory usage
    #[arg(long)]
    pub monitor: bool,
}

impl RunPureArgs {
    /// `-o` flags with the `-a`, `-d` and `-w` aliases folded in.
    pub fn storm_options(&self) -> Result<crate::domain::model::StormConfig> {
        let mut options = parse_options(&self.options)?;
        if let Some(ackers) = self.ackers {
            options.insert("topology.acker.executors".to_string(), Value::from(ackers));
        }
        if let Some(debug) = self.debug {
            options.insert("topology.debug".to_string(), Value::from(debug));
        }
        if let Some(workers) = self.workers {
            options.insert("topology.workers".to_string(), Value::from(workers));
        }
        Ok(options)
    }

    pub fn running_time(&self) -> Option<Duration> {
        if self.time > 0.0 {
            Duration::try_from_secs_f64(self.time).ok()
        } else {
            None
        }
    }

    pub fn to_request(&self) -> Result<RunPureRequest> {
        self.validate()?;
        Ok(RunPureRequest {
            name: self.name.clone(),
            env_name: self.environment.clone(),
            options: self.storm_options()?,
            config_file: self.config.clone(),
            override_name: self.override_name.clone(),
            running_time: self.running_time(),
        })
    }
}

impl Validate for RunPureArgs {
    fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_non_empty_string("name", name)?;
        }
        if let Some(name) = &self.override_name {
            validate_non_empty_string("override_name", name)?;
        }
        if let Some(env) = &self.environment {
            validate_non_empty_string("environment", env)?;
        }
        Ok(())
    }
}

/// Arguments of `sparse_run`, the executable Storm starts for each task.
#[derive(Debug, Clone, Parser)]
#[command(name = "sparse_run")]
#[command(about = "Run one topology component over the Storm multilang protocol")]
pub struct SparseRunArgs {
    /// Component name, optionally qualified as topology.component
    pub component: String,

    /// Topology that owns the component
    #[arg(short, long)]
    pub topology: Option<String>,

    /// Multilang serializer
    #[arg(short, long, default_value = "json")]
    pub serializer: String,

    /// Log level for the component process
    #[arg(long)]
    pub log_level: Option<String>,
}

impl SparseRunArgs {
    /// Parses the command line Storm hands to a multilang subprocess.
    ///
    /// Storm 1.0.3 and later pass the component and its flags as a single
    /// argument, e.g. `"count_bolt --serializer=msgpack"`.
    pub fn from_storm_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::parse_from(split_storm_args(args))
    }
}

fn split_storm_args<I, T>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    let mut args = args.into_iter().map(Into::into);
    let mut split: Vec<String> = args.next().into_iter().collect();
    for arg in args {
        if arg.contains(char::is_whitespace) {
            split.extend(arg.split_whitespace().map(str::to_string));
        } else {
            split.push(arg);
        }
    }
    split
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
        SparseRunArgs::command().debug_assert();
    }

    #[test]
    fn test_run_pure_flags() {
        let cli = Cli::parse_from([
            "sparse",
            "run_pure",
            "-n",
            "wordcount",
            "-o",
            "topology.max.spout.pending=10",
            "-o",
            "sparse.log.path=/tmp/logs",
            "-a",
            "0",
            "-d",
            "-t",
            "2.5",
        ]);

        let Commands::RunPure(args) = cli.command else {
            panic!("expected run_pure");
        };
        let options = args.storm_options().unwrap();
        assert_eq!(options["topology.max.spout.pending"], 10);
        assert_eq!(options["sparse.log.path"], "/tmp/logs");
        assert_eq!(options["topology.acker.executors"], 0);
        assert_eq!(options["topology.debug"], true);
        assert_eq!(args.running_time(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_non_positive_time_runs_forever() {
        let cli = Cli::parse_from(["sparse", "run_pure", "-t", "0"]);
        let Commands::RunPure(args) = cli.command else {
            panic!("expected run_pure");
        };
        assert_eq!(args.running_time(), None);
        assert!(args.debug.is_none());
    }

    #[test]
    fn test_sparse_run_args() {
        let args = SparseRunArgs::parse_from(["sparse_run", "count_bolt", "-t", "wordcount"]);
        assert_eq!(args.component, "count_bolt");
        assert_eq!(args.topology.as_deref(), Some("wordcount"));
        assert_eq!(args.serializer, "json");
    }

    #[test]
    fn test_sparse_run_args_joined_by_storm() {
        let args =
            SparseRunArgs::from_storm_args(["sparse_run", "count_bolt --serializer=msgpack"]);
        assert_eq!(args.component, "count_bolt");
        assert_eq!(args.serializer, "msgpack");

        let args = SparseRunArgs::from_storm_args(["sparse_run", "wordcount.count_bolt"]);
        assert_eq!(args.component, "wordcount.count_bolt");
        assert_eq!(args.serializer, "json");
    }
}
