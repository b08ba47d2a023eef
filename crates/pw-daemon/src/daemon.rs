use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use pw_bridge::http_api::{api_router, ApiState};
use pw_core::WatchConfig;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::coordinator::Coordinator;
use crate::shutdown::ShutdownSignal;
use crate::summary::{ProcessBackend, SummaryBackend, SummaryGenerator};

/// Wires the Coordinator, optional Summary Generator and HTTP server for one
/// monitored project.
pub struct Daemon {
    config: Arc<WatchConfig>,
    coordinator: Coordinator,
    shutdown: ShutdownSignal,
}

impl Daemon {
    /// Build a daemon using the external-process summary backend when
    /// summaries are enabled. Must be called from within a tokio runtime.
    pub fn new(config: WatchConfig) -> Self {
        let backend = config.summary.tool_dir.clone().map(|dir| {
            Arc::new(ProcessBackend::from_config(&config.summary, dir)) as Arc<dyn SummaryBackend>
        });
        Self::with_backend(config, backend)
    }

    /// Build a daemon with an explicit summary backend. `None`, or summaries
    /// disabled in `config`, leaves `llm_summary` out of the document.
    pub fn with_backend(config: WatchConfig, backend: Option<Arc<dyn SummaryBackend>>) -> Self {
        let summary = backend.filter(|_| config.summary.enabled).map(|backend| {
            SummaryGenerator::new(backend, config.summary_cycles(), Handle::current())
        });
        if config.summary.enabled && summary.is_none() {
            warn!("summaries enabled but no summary tool configured");
        }
        let coordinator = Coordinator::new(&config, summary);
        Self {
            config: Arc::new(config),
            coordinator,
            shutdown: ShutdownSignal::new(),
        }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn router(&self) -> Router {
        let state = ApiState::new(Arc::new(self.coordinator.clone()), Arc::clone(&self.config));
        api_router(Arc::new(state))
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<()> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        self.run_with_listener(listener).await
    }

    /// Serve on an already-bound listener until the shutdown signal fires.
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr().context("listener has no local address")?;
        info!(%local, project = %self.config.project_dir.display(), "API server listening");

        let shutdown = self.shutdown.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await
            .context("API server error")?;

        info!("API server stopped");
        Ok(())
    }
}
