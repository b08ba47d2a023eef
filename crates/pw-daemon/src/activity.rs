//! Activity Monitor: attributes background work to the current task.
//!
//! Each poll tails the worker logs and rescans the output trees, turning
//! new bytes and new or modified files into [`ActivityEvent`]s. Events are
//! kept per `"phase:task"` key for at most [`MAX_LIVE_KEYS`] keys and
//! [`MAX_EVENTS_PER_KEY`] events each.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use pw_core::types::{ActivityEvent, TaskActivity, TaskStateMeta};
use pw_telemetry::metrics::global_metrics;
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::log_line::parse_log_line;

pub const MAX_EVENTS_PER_KEY: usize = 30;
/// The current task plus two predecessors.
pub const MAX_LIVE_KEYS: usize = 3;

const LOG_DIR: &str = ".logs";
const LOG_EXT: &str = "log";
const OBSERVED_TREES: [&str; 2] = [".outputs", ".state"];
/// Directory levels below an observed root that are still descended into.
const MAX_TREE_DEPTH: usize = 4;
/// Modification-time increases at or below this are write noise.
const MODIFIED_THRESHOLD: Duration = Duration::from_millis(500);

pub struct ActivityMonitor {
    project_dir: PathBuf,
    log_offsets: AHashMap<PathBuf, u64>,
    file_mtimes: AHashMap<PathBuf, SystemTime>,
    events: AHashMap<String, Vec<ActivityEvent>>,
    /// Live keys, least recently active first.
    order: VecDeque<String>,
    baselined: bool,
}

impl ActivityMonitor {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            log_offsets: AHashMap::new(),
            file_mtimes: AHashMap::new(),
            events: AHashMap::new(),
            order: VecDeque::new(),
            baselined: false,
        }
    }

    /// Collect activity since the previous poll and attribute it to the
    /// task `meta` names as current.
    ///
    /// The first poll only records log offsets and file modification times
    /// and never yields new events.
    pub fn poll(&mut self, meta: &TaskStateMeta) -> TaskActivity {
        let fresh = if self.baselined {
            let mut fresh = self.read_new_log_lines();
            fresh.extend(self.scan_files());
            fresh
        } else {
            self.baseline();
            Vec::new()
        };

        if !fresh.is_empty() {
            match meta.activity_key() {
                Some(key) => self.attribute(key, fresh),
                None => trace!(count = fresh.len(), "no current task; activity dropped"),
            }
        }
        self.evict();
        global_metrics().set_gauge("pipewatch_activity_keys", &[], self.order.len() as i64);

        self.events
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn attribute(&mut self, key: String, fresh: Vec<ActivityEvent>) {
        debug!(key = %key, count = fresh.len(), "attributing activity");
        let list = self.events.entry(key.clone()).or_default();
        list.extend(fresh);
        if list.len() > MAX_EVENTS_PER_KEY {
            list.drain(..list.len() - MAX_EVENTS_PER_KEY);
        }
        self.order.retain(|k| *k != key);
        self.order.push_back(key);
    }

    fn evict(&mut self) {
        while self.order.len() > MAX_LIVE_KEYS {
            if let Some(old) = self.order.pop_front() {
                debug!(key = %old, "evicting activity");
                self.events.remove(&old);
            }
        }
    }

    fn baseline(&mut self) {
        for log in self.log_files() {
            if let Ok(meta) = fs::metadata(&log) {
                self.log_offsets.insert(log, meta.len());
            }
        }
        self.file_mtimes = self.walk_trees().into_iter().collect();
        self.baselined = true;
        debug!(
            logs = self.log_offsets.len(),
            files = self.file_mtimes.len(),
            "activity baseline recorded"
        );
    }

    // -- logs ---------------------------------------------------------------

    fn log_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.project_dir.join(LOG_DIR)) else {
            return Vec::new();
        };
        let mut logs: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == LOG_EXT) && p.is_file())
            .collect();
        logs.sort();
        logs
    }

    fn read_new_log_lines(&mut self) -> Vec<ActivityEvent> {
        let mut out = Vec::new();
        for log in self.log_files() {
            let offset = self.log_offsets.get(&log).copied().unwrap_or(0);
            let Some((text, next)) = read_complete_lines(&log, offset) else {
                continue;
            };
            self.log_offsets.insert(log, next);
            out.extend(text.lines().filter_map(|line| {
                let ev = parse_log_line(line, &self.project_dir);
                if ev.is_none() && !line.trim().is_empty() {
                    trace!(line, "skipping unrecognised log line");
                }
                ev
            }));
        }
        out
    }

    // -- files --------------------------------------------------------------

    /// Rescan the observed trees. The modification-time table is replaced by
    /// what is on disk now, so vanished files are forgotten.
    fn scan_files(&mut self) -> Vec<ActivityEvent> {
        let current = self.walk_trees();
        let mut out = Vec::new();
        for (path, mtime) in &current {
            let kind = match self.file_mtimes.get(path) {
                None => FileChange::Created,
                Some(prev) if exceeds_threshold(*prev, *mtime) => FileChange::Modified,
                Some(_) => continue,
            };
            let rel = path
                .strip_prefix(&self.project_dir)
                .unwrap_or(path)
                .to_string_lossy()
                .into_owned();
            let time = DateTime::<Utc>::from(*mtime);
            out.push(match kind {
                FileChange::Created => ActivityEvent::FileCreated { time, path: rel },
                FileChange::Modified => ActivityEvent::FileModified { time, path: rel },
            });
        }
        self.file_mtimes = current.into_iter().collect();
        out
    }

    /// Files under the observed trees with their modification times, in
    /// walk order. Hidden subdirectories are not entered.
    fn walk_trees(&self) -> Vec<(PathBuf, SystemTime)> {
        let mut files = Vec::new();
        for tree in OBSERVED_TREES {
            let root = self.project_dir.join(tree);
            if !root.is_dir() {
                continue;
            }
            let walker = WalkDir::new(&root)
                .max_depth(MAX_TREE_DEPTH + 1)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !(e.file_type().is_dir() && is_hidden(e.path())));
            for entry in walker.filter_map(Result::ok) {
                // Symlinked files are reported with their target's mtime;
                // symlinked directories are not entered.
                let meta = if entry.path_is_symlink() {
                    fs::metadata(entry.path()).ok()
                } else {
                    entry.metadata().ok()
                };
                // Vanished since listing: skip for this cycle.
                let Some(meta) = meta.filter(|m| m.is_file()) else {
                    continue;
                };
                if let Ok(mtime) = meta.modified() {
                    files.push((entry.into_path(), mtime));
                }
            }
        }
        files
    }
}

enum FileChange {
    Created,
    Modified,
}

fn exceeds_threshold(prev: SystemTime, now: SystemTime) -> bool {
    now.duration_since(prev)
        .is_ok_and(|d| d > MODIFIED_THRESHOLD)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Bytes appended after `offset` up to and including the last newline, and
/// the offset to resume from. A partially written final line is left for
/// the next poll. A file shorter than `offset` was truncated and is re-read
/// from the start.
fn read_complete_lines(path: &Path, offset: u64) -> Option<(String, u64)> {
    let mut file = File::open(path).ok()?;
    let len = file.metadata().ok()?.len();
    let start = if len < offset { 0 } else { offset };
    if len == start {
        return None;
    }
    file.seek(SeekFrom::Start(start)).ok()?;
    let mut buf = Vec::with_capacity((len - start) as usize);
    file.read_to_end(&mut buf).ok()?;
    let end = buf.iter().rposition(|b| *b == b'\n')? + 1;
    buf.truncate(end);
    Some((
        String::from_utf8_lossy(&buf).into_owned(),
        start + end as u64,
    ))
}
