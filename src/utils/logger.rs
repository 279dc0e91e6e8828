use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

pub fn init_cli_logger(verbose: bool) {
    let filter = if verbose {
        env_filter("sparse=debug,info")
    } else {
        env_filter("sparse=info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

/// JSON lines logger for a component process started by Storm. stdout is
/// the multilang channel, so logs go to stderr.
///
/// `level` takes the `sparse.log.level` spellings, including `warning`
/// and `critical`.
pub fn init_component_logger(level: Option<&str>) {
    let filter = env_filter(&format!("sparse={}", tracing_level(level.unwrap_or("info"))));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .json(),
        )
        .init();
}

pub fn tracing_level(level: &str) -> &'static str {
    match level.to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" | "critical" => "error",
        _ => "info",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_level_accepts_storm_spellings() {
        assert_eq!(tracing_level("WARNING"), "warn");
        assert_eq!(tracing_level("critical"), "error");
        assert_eq!(tracing_level("debug"), "debug");
        assert_eq!(tracing_level("chatty"), "info");
    }
}
