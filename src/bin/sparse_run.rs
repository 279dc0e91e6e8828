use sparse::app::builtin_topologies;
use sparse::config::cli::SparseRunArgs;
use sparse::core::runtime::run_component;
use sparse::core::serializer::Serializer;
use sparse::utils::logger;
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = SparseRunArgs::from_storm_args(std::env::args());

    logger::init_component_logger(args.log_level.as_deref());

    if let Err(e) = run(&args).await {
        tracing::error!(
            "Component {} stopped: {} (Severity: {:?})",
            args.component,
            e,
            e.severity()
        );
        tracing::error!("Recovery suggestion: {}", e.recovery_suggestion());
        std::process::exit(e.exit_code().max(1));
    }
    Ok(())
}

async fn run(args: &SparseRunArgs) -> sparse::Result<()> {
    let serializer: Serializer = args.serializer.parse()?;

    let registry = builtin_topologies()?;
    let lookup = match &args.topology {
        Some(topology) => format!("{}.{}", topology, args.component),
        None => args.component.clone(),
    };
    let (topology, spec) = registry.find_component(&lookup)?;
    tracing::info!("Starting {} from topology {}", spec.name, topology.name);

    run_component(
        &spec.name,
        spec.instantiate(),
        serializer,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
}
