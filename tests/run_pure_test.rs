use serde_json::json;
use sparse::app::run_pure::pure_options;
use sparse::app::{builtin_topologies, run_pure, RunPureRequest};
use sparse::config::ProjectConfig;
use std::io::Write;
use std::time::Duration;
use tempfile::{Builder, NamedTempFile};

const CONFIG: &str = r#"{
    "serializer": "json",
    "topology_specs": "topologies/",
    "virtualenv_specs": "virtualenvs/",
    "envs": {
        "prod": {
            "user": "storm",
            "nimbus": "nimbus.example.com",
            "workers": ["w1.example.com", "w2.example.com"],
            "log": {"path": "/var/log/storm", "level": "WARNING"},
            "virtualenv_root": "/data/virtualenvs",
            "options": {"topology.max.spout.pending": 10, "topology.acker.executors": 2}
        },
        "dev": {
            "options": {"topology.tick.tuple.freq.secs": 0.05}
        }
    }
}"#;

fn config_file() -> NamedTempFile {
    let mut file = Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();
    file
}

#[test]
fn test_env_options_flow_into_pure_run() {
    let file = config_file();
    let project = ProjectConfig::from_file(file.path()).unwrap();
    let registry = builtin_topologies().unwrap();

    let mut request = RunPureRequest {
        name: Some("wordcount".to_string()),
        env_name: Some("prod".to_string()),
        ..Default::default()
    };
    request
        .options
        .insert("topology.debug".to_string(), json!(true));

    let (env_name, options) = pure_options(&request, &project, &registry).unwrap();
    assert_eq!(env_name, "prod");
    // the topology's own setting beats the environment
    assert_eq!(options["topology.max.spout.pending"], 100);
    assert_eq!(options["topology.acker.executors"], 1);
    assert_eq!(options["storm.workers.list"], json!([]));
    assert_eq!(options["sparse.log.level"], "debug");
    assert_eq!(options["sparse.log.path"], "/var/log/storm");
    assert_eq!(options["sudo_user"], "storm");
    assert_eq!(
        options["topology.python.path"],
        "/data/virtualenvs/wordcount/bin/python"
    );
}

#[test]
fn test_ambiguous_environment_needs_a_name() {
    let file = config_file();
    let project = ProjectConfig::from_file(file.path()).unwrap();
    let registry = builtin_topologies().unwrap();

    let request = RunPureRequest {
        name: Some("wordcount".to_string()),
        ..Default::default()
    };
    assert!(pure_options(&request, &project, &registry).is_err());
}

#[tokio::test]
async fn test_run_pure_pixel_count_with_config_file() {
    let file = config_file();
    let registry = builtin_topologies().unwrap();

    let mut request = RunPureRequest {
        name: Some("pixel_count".to_string()),
        env_name: Some("dev".to_string()),
        config_file: Some(file.path().to_str().unwrap().to_string()),
        running_time: Some(Duration::from_millis(300)),
        ..Default::default()
    };
    request.options.insert(
        "pixel_count.secs_between_batches".to_string(),
        json!(0.05),
    );

    let stats = run_pure(request, &registry).await.unwrap();
    let spout = stats.get("pixel_spout", "default");
    assert!(spout.emitted > 0);
    assert!(spout.acked > 0);
    assert!(stats.get("pixel_counter", "default").emitted > 0);
}

#[tokio::test]
async fn test_run_pure_missing_config_file_fails() {
    let registry = builtin_topologies().unwrap();
    let request = RunPureRequest {
        name: Some("wordcount".to_string()),
        config_file: Some("/definitely/not/here/config.json".to_string()),
        running_time: Some(Duration::from_millis(10)),
        ..Default::default()
    };
    assert!(run_pure(request, &registry).await.is_err());
}
