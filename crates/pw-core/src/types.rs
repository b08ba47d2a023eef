use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Status of a phase or task.
///
/// Phases only ever derive one of the four named variants. Tasks carry
/// whatever the pipeline recorded; strings outside the known set are kept
/// verbatim in [`Status::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    #[default]
    Pending,
    InProgress,
    Complete,
    Failed,
    Other(String),
}

impl Status {
    pub fn as_str(&self) -> &str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in_progress",
            Status::Complete => "complete",
            Status::Failed => "failed",
            Status::Other(s) => s,
        }
    }

    /// A transition out of `complete` back to open work.
    pub fn is_reopening(from: &Status, to: &Status) -> bool {
        *from == Status::Complete && matches!(to, Status::InProgress | Status::Pending)
    }
}

impl From<&str> for Status {
    fn from(s: &str) -> Self {
        match s {
            "pending" => Status::Pending,
            "in_progress" => Status::InProgress,
            "complete" => Status::Complete,
            "failed" => Status::Failed,
            other => Status::Other(other.to_string()),
        }
    }
}

impl From<String> for Status {
    fn from(s: String) -> Self {
        Status::from(s.as_str())
    }
}

impl From<Status> for String {
    fn from(s: Status) -> Self {
        match s {
            Status::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Session / meta
// ---------------------------------------------------------------------------

/// Session record. Known counters are typed; anything else the pipeline
/// writes is passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    #[serde(default, deserialize_with = "crate::lenient::opt_string")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "crate::lenient::opt_string")]
    pub started_at: Option<String>,
    #[serde(default, deserialize_with = "crate::lenient::u64_or_zero")]
    pub tasks_completed: u64,
    #[serde(default, deserialize_with = "crate::lenient::u64_or_zero")]
    pub tasks_failed: u64,
    #[serde(default, deserialize_with = "crate::lenient::opt_string")]
    pub current_phase: Option<String>,
    #[serde(default, deserialize_with = "crate::lenient::opt_string")]
    pub current_task: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Most recent current-phase / current-task pointer from the task-state record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStateMeta {
    pub current_phase: Option<String>,
    pub current_task: Option<String>,
}

impl TaskStateMeta {
    /// `"phase:task"` key used for activity attribution, when both are known.
    pub fn activity_key(&self) -> Option<String> {
        match (self.current_phase.as_deref(), self.current_task.as_deref()) {
            (Some(p), Some(t)) if !p.is_empty() && !t.is_empty() => Some(format!("{p}:{t}")),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Phase / task views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: String,
    pub name: String,
    pub status: Status,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub artifacts: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseView {
    pub id: String,
    pub name: String,
    pub status: Status,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    /// Seconds; `None` when the phase never started and has no closeout.
    pub duration: Option<f64>,
    pub tasks: Vec<TaskView>,
    pub closeout: Option<Value>,
}

// ---------------------------------------------------------------------------
// Change events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    PhaseStatus,
    PhaseRedo,
    TaskStatus,
    TaskRedo,
}

/// A status transition observed between two consecutive snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub phase: String,
    pub task: Option<String>,
    pub task_name: Option<String>,
    pub from: Status,
    pub to: Status,
    pub reverse: bool,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One complete observation of pipeline state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub project_name: String,
    pub session: SessionInfo,
    pub phases: Vec<PhaseView>,
    pub task_state_meta: TaskStateMeta,
    pub audit_results: Vec<Value>,
    pub artifacts: Vec<Value>,
    pub timestamp: DateTime<Utc>,
    pub changes: Vec<ChangeEvent>,
}

impl Snapshot {
    /// Attach the change list computed against the previous observation.
    pub fn with_changes(self, changes: Vec<ChangeEvent>) -> Self {
        Self { changes, ..self }
    }

    pub fn phase(&self, id: &str) -> Option<&PhaseView> {
        self.phases.iter().find(|p| p.id == id)
    }
}

// ---------------------------------------------------------------------------
// Activity
// ---------------------------------------------------------------------------

/// An attributable unit of background work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityEvent {
    /// A worker process ran.
    Invocation {
        time: String,
        task: String,
        provider: String,
        model: String,
        /// Seconds.
        duration: u64,
        exit: u32,
        output: String,
    },
    FileCreated {
        time: DateTime<Utc>,
        path: String,
    },
    FileModified {
        time: DateTime<Utc>,
        path: String,
    },
}

/// `"phase:task"` -> events attributed to that task, oldest first.
pub type TaskActivity = BTreeMap<String, Vec<ActivityEvent>>;

// ---------------------------------------------------------------------------
// Summary + outward document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryView {
    pub text: Option<String>,
    pub generated_at: Option<DateTime<Utc>>,
}

/// The document served to clients: a snapshot plus activity and summary
/// merged in at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(flatten)]
    pub snapshot: Snapshot,
    pub task_activity: TaskActivity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_summary: Option<SummaryView>,
}
