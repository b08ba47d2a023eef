//! Summary Generator: periodic natural-language digests of pipeline state.
//!
//! Generation runs on a detached task; the refresh path only bumps a cycle
//! counter and, every N cycles, fires off a new run. Readers take the last
//! finished result from a single-slot cell and never wait on a run.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use pw_core::config::SummaryConfig;
use pw_core::timefmt::format_duration;
use pw_core::types::{Snapshot, SummaryView};
use pw_telemetry::metrics::global_metrics;
use serde_json::{json, Value};
use tokio::process::Command;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Stderr is cut to this many characters in failure text.
const STDERR_LIMIT: usize = 200;

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Why a summary could not be produced. The `Display` text is what clients
/// see in place of a summary.
#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("(LLM path not found)")]
    ToolMissing,
    #[error("LLM error: {0}")]
    Failed(String),
    #[error("LLM unavailable: {0}")]
    Unavailable(String),
}

impl SummaryError {
    fn outcome(&self) -> &'static str {
        match self {
            SummaryError::ToolMissing => "missing",
            SummaryError::Failed(_) => "error",
            SummaryError::Unavailable(_) => "unavailable",
        }
    }
}

#[async_trait]
pub trait SummaryBackend: Send + Sync {
    async fn summarize(&self, prompt: &str) -> Result<String, SummaryError>;
}

/// Runs `python -m local_launcher` in the tool directory.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    pub program: String,
    pub tool_dir: PathBuf,
    pub provider: String,
    pub model: String,
    pub timeout: Duration,
}

impl ProcessBackend {
    pub fn from_config(cfg: &SummaryConfig, tool_dir: PathBuf) -> Self {
        Self {
            program: "python".to_string(),
            tool_dir,
            provider: cfg.provider.clone(),
            model: cfg.model.clone(),
            timeout: cfg.timeout(),
        }
    }
}

#[async_trait]
impl SummaryBackend for ProcessBackend {
    async fn summarize(&self, prompt: &str) -> Result<String, SummaryError> {
        if !self.tool_dir.is_dir() {
            return Err(SummaryError::ToolMissing);
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(["-m", "local_launcher", "--provider"])
            .arg(&self.provider)
            .arg("--model")
            .arg(&self.model)
            .args(["--max-turns", "1", "-p", prompt])
            .current_dir(&self.tool_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                return Err(SummaryError::Unavailable(format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                )))
            }
            Ok(Err(e)) => return Err(SummaryError::Unavailable(e.to_string())),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr: String = String::from_utf8_lossy(&output.stderr)
                .chars()
                .take(STDERR_LIMIT)
                .collect();
            return Err(SummaryError::Failed(stderr.trim_end().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// Reduced view of a snapshot: per-phase status, formatted duration and task
/// counts by status, plus the session counters.
pub fn compact_state(snapshot: &Snapshot) -> Value {
    let phases: Vec<Value> = snapshot
        .phases
        .iter()
        .map(|p| {
            let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
            for t in &p.tasks {
                *counts.entry(t.status.as_str()).or_default() += 1;
            }
            json!({
                "id": p.id,
                "name": p.name,
                "status": p.status,
                "duration": format_duration(p.duration),
                "tasks": counts,
            })
        })
        .collect();
    let s = &snapshot.session;
    json!({
        "session_id": s.session_id,
        "started_at": s.started_at,
        "tasks_completed": s.tasks_completed,
        "tasks_failed": s.tasks_failed,
        "phases": phases,
    })
}

pub fn build_prompt(snapshot: &Snapshot) -> String {
    let body = serde_json::to_string_pretty(&compact_state(snapshot)).unwrap_or_default();
    format!(
        "Summarize this pipeline state concisely in 2-3 sentences. \
         Highlight current progress, any failures or warnings, and what's next.\n\n{body}"
    )
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

pub struct SummaryGenerator {
    backend: Arc<dyn SummaryBackend>,
    cycles: u64,
    polls: AtomicU64,
    latest: Arc<Mutex<SummaryView>>,
    running: Arc<AtomicBool>,
    runtime: Handle,
}

impl SummaryGenerator {
    /// `cycles` is the number of [`maybe_update`](Self::maybe_update) calls
    /// between runs; zero is treated as one.
    pub fn new(backend: Arc<dyn SummaryBackend>, cycles: u64, runtime: Handle) -> Self {
        Self {
            backend,
            cycles: cycles.max(1),
            polls: AtomicU64::new(0),
            latest: Arc::new(Mutex::new(SummaryView::default())),
            running: Arc::new(AtomicBool::new(false)),
            runtime,
        }
    }

    /// Count one refresh cycle and, on every `cycles`-th call, start a
    /// detached run. Never blocks. A run still in flight suppresses the
    /// next trigger rather than stacking up processes.
    pub fn maybe_update(&self, snapshot: &Snapshot) {
        let n = self.polls.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.cycles != 0 {
            return;
        }
        if self.running.swap(true, Ordering::AcqRel) {
            debug!("summary still running; skipping trigger");
            return;
        }

        let prompt = build_prompt(snapshot);
        let backend = Arc::clone(&self.backend);
        let latest = Arc::clone(&self.latest);
        let running = Arc::clone(&self.running);
        self.runtime.spawn(async move {
            let text = match backend.summarize(&prompt).await {
                Ok(text) => {
                    info!(chars = text.len(), "summary generated");
                    record_outcome("ok");
                    text
                }
                Err(e) => {
                    warn!(error = %e, "summary generation failed");
                    record_outcome(e.outcome());
                    e.to_string()
                }
            };
            *latest.lock().unwrap_or_else(PoisonError::into_inner) = SummaryView {
                text: Some(text),
                generated_at: Some(Utc::now()),
            };
            running.store(false, Ordering::Release);
        });
    }

    /// Last finished summary; both fields are `None` before the first run.
    pub fn get_summary(&self) -> SummaryView {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn record_outcome(outcome: &str) {
    global_metrics().increment_counter("pipewatch_summary_runs_total", &[("outcome", outcome)]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pw_core::SnapshotReader;

    #[test]
    fn compact_state_counts_tasks_by_status() {
        let snap = SnapshotReader::new("/nonexistent/compact").read();
        let v = compact_state(&snap);
        assert_eq!(v["tasks_completed"], 0);
        assert!(v["session_id"].is_null());
        let setup = &v["phases"][0];
        assert_eq!(setup["id"], "0-setup");
        assert_eq!(setup["status"], "pending");
        assert_eq!(setup["duration"], "-");
        assert_eq!(setup["tasks"]["pending"], 9);
        assert!(setup.get("closeout").is_none());
    }

    #[test]
    fn prompt_embeds_compact_json() {
        let snap = SnapshotReader::new("/nonexistent/compact").read();
        let prompt = build_prompt(&snap);
        assert!(prompt.starts_with("Summarize this pipeline state concisely in 2-3 sentences."));
        assert!(prompt.contains("\"9-release\""));
    }

    #[test]
    fn failure_text_matches_client_contract() {
        assert_eq!(SummaryError::ToolMissing.to_string(), "(LLM path not found)");
        assert_eq!(
            SummaryError::Failed("boom".into()).to_string(),
            "LLM error: boom"
        );
        assert_eq!(
            SummaryError::Unavailable("timed out after 60s".into()).to_string(),
            "LLM unavailable: timed out after 60s"
        );
    }

    #[tokio::test]
    async fn missing_tool_dir_is_reported() {
        let backend = ProcessBackend {
            program: "python".into(),
            tool_dir: PathBuf::from("/nonexistent/claude-local"),
            provider: "ollama".into(),
            model: "m".into(),
            timeout: Duration::from_secs(1),
        };
        let err = backend.summarize("hi").await.unwrap_err();
        assert!(matches!(err, SummaryError::ToolMissing));
    }

    /// Backend whose `program` is a shell script written into a fresh tool dir.
    #[cfg(unix)]
    fn script_backend(dir: &tempfile::TempDir, body: &str, timeout: Duration) -> ProcessBackend {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.path().join("launcher.sh");
        std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        ProcessBackend {
            program: script.to_string_lossy().into_owned(),
            tool_dir: dir.path().to_path_buf(),
            provider: "ollama".into(),
            model: "m".into(),
            timeout,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_run_returns_trimmed_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let backend = script_backend(&dir, "echo '  phase 0 done  '", Duration::from_secs(5));
        assert_eq!(backend.summarize("hi").await.unwrap(), "phase 0 done");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_reports_capped_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let noise = "x".repeat(300);
        let backend = script_backend(
            &dir,
            &format!("echo {noise} >&2\nexit 1"),
            Duration::from_secs(5),
        );
        match backend.summarize("hi").await.unwrap_err() {
            SummaryError::Failed(stderr) => {
                assert_eq!(stderr.chars().count(), STDERR_LIMIT);
                assert!(stderr.chars().all(|c| c == 'x'));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_process_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let backend = script_backend(&dir, "exec sleep 10", Duration::from_secs(1));
        let started = std::time::Instant::now();
        let err = backend.summarize("hi").await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(err, SummaryError::Unavailable(_)));
        assert_eq!(err.to_string(), "LLM unavailable: timed out after 1s");
    }
}
