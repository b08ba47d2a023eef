use tracing_subscriber::{fmt, EnvFilter};

/// Output format of the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    /// One JSON object per line.
    Json,
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `default_level` (e.g. "info",
/// "pw_daemon=debug,warn"). Only the first call installs anything; later
/// calls are no-ops, which keeps tests that share a process well-behaved.
pub fn init(service_name: &str, default_level: &str, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let installed = match format {
        LogFormat::Human => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .try_init()
            .is_ok(),
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .try_init()
            .is_ok(),
    };

    if installed {
        tracing::info!(service = service_name, format = ?format, "logging initialised");
    }
}

/// Human-readable logging.
pub fn init_logging(service_name: &str, default_level: &str) {
    init(service_name, default_level, LogFormat::Human);
}

/// JSON logging, for log shippers.
pub fn init_logging_json(service_name: &str, default_level: &str) {
    init(service_name, default_level, LogFormat::Json);
}
