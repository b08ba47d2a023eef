use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Process-wide configuration, resolved once at start-up and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    pub project_dir: PathBuf,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
}

impl WatchConfig {
    /// Defaults for everything except the project directory.
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            host: default_host(),
            port: default_port(),
            poll_interval_secs: default_poll_interval(),
            summary: SummaryConfig::default(),
            viewer: ViewerConfig::default(),
        }
    }

    /// Canonicalise the project directory, fill in derived defaults and
    /// validate the result.
    pub fn resolve(mut self) -> Result<Self, ConfigError> {
        if !self.project_dir.is_dir() {
            return Err(ConfigError::ProjectDir(self.project_dir));
        }
        self.project_dir = self
            .project_dir
            .canonicalize()
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        if self.summary.enabled && self.summary.tool_dir.is_none() {
            self.summary.tool_dir = Some(default_tool_dir(&self.project_dir));
        }
        self.validate()?;
        Ok(self)
    }

    /// Semantic validation for settings that are not fully expressible via type checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "poll interval must be at least 1 second".to_string(),
            ));
        }
        self.summary.validate()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Window within which a computed document is reused: half the poll
    /// interval, never less than two seconds.
    pub fn cache_window(&self) -> Duration {
        Duration::from_secs_f64((self.poll_interval_secs as f64 / 2.0).max(2.0))
    }

    /// Number of refresh cycles between summary generations (at least one).
    pub fn summary_cycles(&self) -> u64 {
        (self.summary.interval_secs / self.poll_interval_secs.max(1)).max(1)
    }

    /// URL the viewer is opened at.
    pub fn viewer_url(&self) -> String {
        let base = format!("http://localhost:{}/", self.port);
        if self.viewer.popup {
            format!("{base}?popup=1")
        } else {
            base
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("project directory not found: {}", .0.display())]
    ProjectDir(PathBuf),
    #[error("io: {0}")]
    Io(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_summary_interval")]
    pub interval_secs: u64,
    /// Working directory of the external summarisation tool.
    #[serde(default)]
    pub tool_dir: Option<PathBuf>,
    #[serde(default = "default_summary_model")]
    pub model: String,
    #[serde(default = "default_summary_provider")]
    pub provider: String,
    #[serde(default = "default_summary_timeout")]
    pub timeout_secs: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_summary_interval(),
            tool_dir: None,
            model: default_summary_model(),
            provider: default_summary_provider(),
            timeout_secs: default_summary_timeout(),
        }
    }
}

impl SummaryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "summary interval must be at least 1 second".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "summary timeout must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[serde(default = "default_true")]
    pub launch: bool,
    #[serde(default)]
    pub popup: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            launch: true,
            popup: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8420
}
fn default_poll_interval() -> u64 {
    30
}
fn default_summary_interval() -> u64 {
    300
}
fn default_summary_model() -> String {
    "llama3.2:3b".into()
}
fn default_summary_provider() -> String {
    "ollama".into()
}
fn default_summary_timeout() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

/// `claude-local` next to the project directory.
fn default_tool_dir(project_dir: &Path) -> PathBuf {
    project_dir
        .parent()
        .unwrap_or(project_dir)
        .join("claude-local")
}
