use clap::Parser;
use sparse::app::{builtin_topologies, run_pure};
use sparse::config::cli::{Cli, Commands, RunPureArgs};
use sparse::core::topology::{ComponentKind, TopologyRegistry};
use sparse::utils::error::SparseError;
use sparse::utils::logger;
use sparse::utils::monitor::SystemMonitor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logger::init_cli_logger(cli.verbose);
    tracing::debug!("CLI args: {:?}", cli);

    let registry = match builtin_topologies() {
        Ok(registry) => registry,
        Err(e) => exit_with(e),
    };

    match cli.command {
        Commands::List => list_topologies(&registry),
        Commands::RunPure(args) => {
            if let Err(e) = run(&args, &registry).await {
                exit_with(e);
            }
        }
    }

    Ok(())
}

async fn run(args: &RunPureArgs, registry: &TopologyRegistry) -> sparse::Result<()> {
    let request = args.to_request()?;

    let mut monitor = SystemMonitor::new(args.monitor);
    if let Some(monitor) = monitor.as_mut() {
        tracing::info!("System monitoring enabled");
        monitor.log_sample("Start");
    }

    let stats = run_pure(request, registry).await?;

    if let Some(monitor) = monitor.as_mut() {
        monitor.log_summary(&stats);
    }

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn list_topologies(registry: &TopologyRegistry) {
    for topology in registry.topologies() {
        println!("{}", topology.name);
        for spec in topology.specs() {
            let kind = match spec.kind {
                ComponentKind::Spout => "spout",
                ComponentKind::Bolt => "bolt",
            };
            let inputs: Vec<String> = spec
                .inputs
                .iter()
                .map(|input| format!("{}:{} ({:?})", input.component, input.stream, input.grouping))
                .collect();
            println!(
                "  {:<16} {:<6} par={:<3} {}",
                spec.name,
                kind,
                spec.parallelism.for_env(None),
                inputs.join(", ")
            );
        }
    }
}

fn exit_with(e: SparseError) -> ! {
    tracing::error!("sparse failed: {} (Severity: {:?})", e, e.severity());
    tracing::error!("Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("{}", e);
    eprintln!("Suggestion: {}", e.recovery_suggestion());
    std::process::exit(e.exit_code().max(1));
}
