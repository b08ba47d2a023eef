//! pipewatch: serves a live, read-only view of a pipeline project's state.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pw_core::WatchConfig;
use pw_daemon::daemon::Daemon;
use pw_telemetry::logging;
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Watch a pipeline project directory and serve its state over HTTP.
#[derive(Parser, Debug)]
#[command(name = "pipewatch", version, about)]
struct Cli {
    /// Project directory containing `.claude/`, `.state/` and `.outputs/`.
    project_dir: PathBuf,

    /// Port to listen on.
    #[arg(long, default_value_t = 8420)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Poll interval in seconds.
    #[arg(long, default_value_t = 30)]
    interval: u64,

    /// Enable periodic LLM summaries.
    #[arg(long)]
    llm: bool,

    /// Seconds between LLM summaries.
    #[arg(long, default_value_t = 300)]
    llm_interval: u64,

    /// Path to the summarisation tool directory [default: <project>/../claude-local].
    #[arg(long)]
    claude_local: Option<PathBuf>,

    #[arg(long, default_value = "llama3.2:3b")]
    llm_model: String,

    #[arg(long, default_value = "ollama")]
    llm_provider: String,

    /// Summary generation timeout in seconds.
    #[arg(long, default_value_t = 60)]
    llm_timeout: u64,

    /// Do not open the viewer automatically.
    #[arg(long)]
    no_browser: bool,

    /// Open the viewer as a small popup window.
    #[arg(long)]
    popup: bool,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn into_config(self) -> WatchConfig {
        let mut cfg = WatchConfig::new(self.project_dir);
        cfg.host = self.host;
        cfg.port = self.port;
        cfg.poll_interval_secs = self.interval;
        cfg.summary.enabled = self.llm;
        cfg.summary.interval_secs = self.llm_interval;
        cfg.summary.tool_dir = self.claude_local;
        cfg.summary.model = self.llm_model;
        cfg.summary.provider = self.llm_provider;
        cfg.summary.timeout_secs = self.llm_timeout;
        cfg.viewer.launch = !self.no_browser;
        cfg.viewer.popup = self.popup;
        cfg
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.log_json {
        logging::init_logging_json("pipewatch", "info");
    } else {
        logging::init_logging("pipewatch", "info");
    }

    let config = cli
        .into_config()
        .resolve()
        .context("invalid configuration")?;

    info!(
        project = %config.project_dir.display(),
        url = %format!("http://localhost:{}", config.port),
        poll_secs = config.poll_interval_secs,
        cache_window_secs = config.cache_window().as_secs_f64(),
        summaries = config.summary.enabled,
        "pipewatch starting"
    );
    if let Some(dir) = config.summary.tool_dir.as_ref().filter(|_| config.summary.enabled) {
        info!(
            tool_dir = %dir.display(),
            interval_secs = config.summary.interval_secs,
            "LLM summaries enabled"
        );
    }

    let daemon = Daemon::new(config);
    let shutdown = daemon.shutdown_handle();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("ctrl-c received, shutting down");
        shutdown.trigger();
    });

    if daemon.config().viewer.launch {
        let url = daemon.config().viewer_url();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            let target = url.clone();
            match tokio::task::spawn_blocking(move || open::that(&target)).await {
                Ok(Ok(())) => info!(%url, "viewer opened"),
                Ok(Err(e)) => warn!(%url, error = %e, "could not open viewer"),
                Err(e) => warn!(error = %e, "viewer launch task failed"),
            }
        });
    }

    daemon.run().await
}
