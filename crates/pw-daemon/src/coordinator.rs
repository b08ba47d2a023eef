//! Snapshot Cache / Coordinator.
//!
//! Serialises refreshes so that, within one cache window, at most one
//! read + diff + activity poll cycle runs no matter how many callers ask.
//! Callers arriving while a refresh is in flight get the last completed
//! document when one exists.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, TryLockError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pw_bridge::source::{SourceError, StateSource};
use pw_core::types::StateDocument;
use pw_core::{ChangeTracker, SnapshotReader, WatchConfig};
use pw_telemetry::metrics::global_metrics;
use tracing::debug;

use crate::activity::ActivityMonitor;
use crate::summary::SummaryGenerator;

/// State touched only by the single writer holding the refresh lock.
struct RefreshState {
    tracker: ChangeTracker,
    activity: ActivityMonitor,
}

struct Cached {
    doc: Arc<StateDocument>,
    at: Instant,
}

struct Shared {
    reader: SnapshotReader,
    window: Duration,
    refresh: Mutex<RefreshState>,
    cached: RwLock<Option<Cached>>,
    summary: Option<SummaryGenerator>,
    refreshes: AtomicU64,
}

/// Cheap to clone; clones share one cache.
#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
}

impl Coordinator {
    pub fn new(config: &WatchConfig, summary: Option<SummaryGenerator>) -> Self {
        Self::with_window(config, config.cache_window(), summary)
    }

    /// As [`new`](Self::new) with an explicit cache window.
    pub fn with_window(
        config: &WatchConfig,
        window: Duration,
        summary: Option<SummaryGenerator>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                reader: SnapshotReader::new(&config.project_dir),
                window,
                refresh: Mutex::new(RefreshState {
                    tracker: ChangeTracker::new(),
                    activity: ActivityMonitor::new(&config.project_dir),
                }),
                cached: RwLock::new(None),
                summary,
                refreshes: AtomicU64::new(0),
            }),
        }
    }

    /// The current document, refreshing from disk if the cache has expired.
    ///
    /// Blocks for the duration of a disk read; async callers go through
    /// [`StateSource::current_state`].
    pub fn get_state(&self) -> Arc<StateDocument> {
        let s = &self.shared;
        if let Some(doc) = s.fresh() {
            return doc;
        }

        let mut guard = match s.refresh.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => {
                if let Some(doc) = s.latest() {
                    return doc;
                }
                // Nothing computed yet: wait for the in-flight refresh.
                s.refresh.lock().unwrap_or_else(PoisonError::into_inner)
            }
        };

        // Another caller may have refreshed while we waited for the lock.
        if let Some(doc) = s.fresh() {
            return doc;
        }
        s.refresh_locked(&mut guard)
    }

    pub fn refresh_count(&self) -> u64 {
        self.shared.refreshes.load(Ordering::Acquire)
    }
}

impl Shared {
    fn fresh(&self) -> Option<Arc<StateDocument>> {
        let cached = self.cached.read().unwrap_or_else(PoisonError::into_inner);
        cached
            .as_ref()
            .filter(|c| c.at.elapsed() < self.window)
            .map(|c| Arc::clone(&c.doc))
    }

    fn latest(&self) -> Option<Arc<StateDocument>> {
        let cached = self.cached.read().unwrap_or_else(PoisonError::into_inner);
        cached.as_ref().map(|c| Arc::clone(&c.doc))
    }

    fn refresh_locked(&self, state: &mut RefreshState) -> Arc<StateDocument> {
        let started = Instant::now();

        let snapshot = state.tracker.observe(self.reader.read());
        let task_activity = state.activity.poll(&snapshot.task_state_meta);
        let llm_summary = self.summary.as_ref().map(|g| {
            g.maybe_update(&snapshot);
            g.get_summary()
        });

        let changes = snapshot.changes.len();
        let doc = Arc::new(StateDocument {
            snapshot,
            task_activity,
            llm_summary,
        });
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = Some(Cached {
            doc: Arc::clone(&doc),
            at: Instant::now(),
        });
        let n = self.refreshes.fetch_add(1, Ordering::AcqRel) + 1;

        let elapsed = started.elapsed();
        let m = global_metrics();
        m.increment_counter("pipewatch_refresh_total", &[]);
        m.record_histogram("pipewatch_refresh_duration_seconds", &[], elapsed.as_secs_f64());
        debug!(
            refresh = n,
            changes,
            elapsed_ms = elapsed.as_millis() as u64,
            "state refreshed"
        );
        doc
    }
}

#[async_trait]
impl StateSource for Coordinator {
    async fn current_state(&self) -> Result<Arc<StateDocument>, SourceError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.get_state())
            .await
            .map_err(|e| SourceError::Aborted(e.to_string()))
    }

    fn refresh_count(&self) -> u64 {
        Coordinator::refresh_count(self)
    }
}
