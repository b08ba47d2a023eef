//! Snapshot Reader: overlays recorded pipeline state onto the manifest.
//!
//! Every source is optional. A missing file, a file that vanished between
//! listing and reading, or a document that does not parse is treated as
//! absent and the merge supplies defaults. [`SnapshotReader::read`] never
//! fails.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::lenient;
use crate::manifest::{PhaseSpec, PHASES};
use crate::timefmt::elapsed_seconds;
use crate::types::{PhaseView, SessionInfo, Snapshot, Status, TaskStateMeta, TaskView};

const PROJECT_CONFIG: &str = ".outputs/0-setup/project-config.json";
const SESSION: &str = ".state/session.json";
const TASK_STATE: &str = ".claude/task-state.json";
const OUTPUTS_DIR: &str = ".outputs";
const AUDIT_CACHE_DIR: &str = ".state/audit-cache";
const AUDIT_PREFIX: &str = "result-phase";
const ARTIFACTS_INDEX: &str = ".state/context/artifacts.json";

// ---------------------------------------------------------------------------
// Recorded shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RecordedTaskState {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    current_phase: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    current_task: Option<String>,
    #[serde(default, deserialize_with = "lenient::object_or_empty")]
    phases: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RecordedPhase {
    #[serde(default, deserialize_with = "lenient::bool_or_false")]
    completed: bool,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    started_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    completed_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::object_or_empty")]
    tasks: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RecordedTask {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    status: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    started_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    completed_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    artifacts: Vec<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    error: Option<String>,
}

/// Decode `value` as `T`, or fall back to `T::default()` for any shape mismatch.
fn decode_or_default<T>(value: Option<&Value>) -> T
where
    T: for<'de> Deserialize<'de> + Default,
{
    value
        .and_then(|v| T::deserialize(v).ok())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Status derivation
// ---------------------------------------------------------------------------

/// Derive a phase status from its recorded flags.
///
/// Precedence: completed flag, then any failed task, then any in-progress
/// task or a start timestamp, else pending.
pub fn derive_phase_status(
    completed: bool,
    any_failed: bool,
    any_in_progress: bool,
    started: bool,
) -> Status {
    if completed {
        Status::Complete
    } else if any_failed {
        Status::Failed
    } else if any_in_progress || started {
        Status::InProgress
    } else {
        Status::Pending
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Reads the on-disk state of one pipeline instance.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    project_dir: PathBuf,
}

impl SnapshotReader {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Observe the current state. The change list is always empty; see
    /// [`crate::diff::ChangeTracker`].
    pub fn read(&self) -> Snapshot {
        self.read_at(Utc::now())
    }

    /// Observe the current state, using `now` as the observation time and
    /// as the end of any still-open phase duration.
    pub fn read_at(&self, now: DateTime<Utc>) -> Snapshot {
        let session = decode_or_default::<SessionInfo>(self.load(SESSION).as_ref());
        let task_state = decode_or_default::<RecordedTaskState>(self.load(TASK_STATE).as_ref());

        let phases = PHASES
            .iter()
            .map(|entry| self.phase_view(entry, task_state.phases.get(entry.id), now))
            .collect();

        Snapshot {
            project_name: self.project_name(),
            session,
            phases,
            task_state_meta: TaskStateMeta {
                current_phase: task_state.current_phase,
                current_task: task_state.current_task,
            },
            audit_results: self.audit_results(),
            artifacts: self.artifacts(),
            timestamp: now,
            changes: Vec::new(),
        }
    }

    fn phase_view(&self, entry: &PhaseSpec, recorded: Option<&Value>, now: DateTime<Utc>) -> PhaseView {
        let recorded: RecordedPhase = decode_or_default(recorded);
        let tasks = merge_tasks(entry, &recorded.tasks);

        let any_failed = tasks.iter().any(|t| t.status == Status::Failed);
        let any_in_progress = tasks.iter().any(|t| t.status == Status::InProgress);
        let status = derive_phase_status(
            recorded.completed,
            any_failed,
            any_in_progress,
            recorded.started_at.is_some(),
        );

        let closeout = self.load(&format!("{OUTPUTS_DIR}/{}/closeout.json", entry.id));
        let duration = closeout_duration(closeout.as_ref()).or_else(|| {
            recorded
                .started_at
                .as_deref()
                .and_then(|start| elapsed_seconds(start, recorded.completed_at.as_deref(), now))
        });

        PhaseView {
            id: entry.id.to_string(),
            name: entry.name.to_string(),
            status,
            started_at: recorded.started_at,
            completed_at: recorded.completed_at,
            duration,
            tasks,
            closeout,
        }
    }

    fn project_name(&self) -> String {
        self.load(PROJECT_CONFIG)
            .as_ref()
            .and_then(|v| v.pointer("/project/name"))
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                self.project_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| self.project_dir.display().to_string())
            })
    }

    /// Every `result-phase*.json` in the audit cache, sorted by file name,
    /// each tagged with `_file`.
    fn audit_results(&self) -> Vec<Value> {
        let dir = self.project_dir.join(AUDIT_CACHE_DIR);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                log_unreadable(&dir, &e);
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|n| n.starts_with(AUDIT_PREFIX) && n.ends_with(".json"))
            .collect();
        names.sort();

        names
            .into_iter()
            .filter_map(|name| match read_json(&dir.join(&name)) {
                Some(Value::Object(mut obj)) => {
                    obj.insert("_file".to_string(), Value::String(name));
                    Some(Value::Object(obj))
                }
                _ => None,
            })
            .collect()
    }

    fn artifacts(&self) -> Vec<Value> {
        match self.load(ARTIFACTS_INDEX) {
            Some(Value::Object(mut obj)) => match obj.remove("artifacts") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    fn load(&self, rel: &str) -> Option<Value> {
        read_json(&self.project_dir.join(rel))
    }
}

/// Manifest tasks in manifest order, then recorded extras sorted by id.
fn merge_tasks(entry: &PhaseSpec, recorded: &Map<String, Value>) -> Vec<TaskView> {
    let mut tasks: Vec<TaskView> = entry
        .tasks
        .iter()
        .map(|(id, name)| task_view(id, name, recorded.get(*id)))
        .collect();

    let mut extras: Vec<&String> = recorded.keys().filter(|id| !entry.has_task(id)).collect();
    extras.sort();
    tasks.extend(
        extras
            .into_iter()
            .map(|id| task_view(id, &format!("Task {id}"), recorded.get(id))),
    );
    tasks
}

fn task_view(id: &str, fallback_name: &str, recorded: Option<&Value>) -> TaskView {
    let recorded: RecordedTask = decode_or_default(recorded);
    TaskView {
        id: id.to_string(),
        name: recorded
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| fallback_name.to_string()),
        status: recorded.status.map(Status::from).unwrap_or_default(),
        started_at: recorded.started_at,
        completed_at: recorded.completed_at,
        artifacts: recorded.artifacts,
        error: recorded.error,
    }
}

/// A non-zero `duration_seconds` in the closeout record.
fn closeout_duration(closeout: Option<&Value>) -> Option<f64> {
    closeout?
        .get("duration_seconds")?
        .as_f64()
        .filter(|d| *d != 0.0)
}

fn read_json(path: &Path) -> Option<Value> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            log_unreadable(path, &e);
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(v) => Some(v),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "ignoring malformed state file");
            None
        }
    }
}

fn log_unreadable(path: &Path, e: &io::Error) {
    if e.kind() == io::ErrorKind::NotFound {
        trace!(path = %path.display(), "state file absent");
    } else {
        debug!(path = %path.display(), error = %e, "state file unreadable");
    }
}
