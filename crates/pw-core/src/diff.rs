//! Change Detector: status transitions between consecutive snapshots.

use std::collections::HashMap;

use crate::types::{ChangeEvent, ChangeKind, PhaseView, Snapshot, Status};

/// Status transitions from `prev` to `curr`, stamped with `curr.timestamp`.
///
/// Phases are matched by id; a phase or task present only in `curr` is a
/// baseline and yields nothing. Events come out in phase order, and within
/// a phase the phase event precedes its task events in task order.
pub fn diff(prev: &Snapshot, curr: &Snapshot) -> Vec<ChangeEvent> {
    let prev_phases: HashMap<&str, &PhaseView> =
        prev.phases.iter().map(|p| (p.id.as_str(), p)).collect();

    let mut events = Vec::new();
    for phase in &curr.phases {
        let Some(old) = prev_phases.get(phase.id.as_str()) else {
            continue;
        };

        if old.status != phase.status {
            let reverse = Status::is_reopening(&old.status, &phase.status);
            events.push(ChangeEvent {
                timestamp: curr.timestamp,
                kind: if reverse {
                    ChangeKind::PhaseRedo
                } else {
                    ChangeKind::PhaseStatus
                },
                phase: phase.id.clone(),
                task: None,
                task_name: None,
                from: old.status.clone(),
                to: phase.status.clone(),
                reverse,
            });
        }

        let old_tasks: HashMap<&str, &Status> = old
            .tasks
            .iter()
            .map(|t| (t.id.as_str(), &t.status))
            .collect();
        for task in &phase.tasks {
            let Some(&from) = old_tasks.get(task.id.as_str()) else {
                continue;
            };
            if *from == task.status {
                continue;
            }
            let reverse = Status::is_reopening(from, &task.status);
            events.push(ChangeEvent {
                timestamp: curr.timestamp,
                kind: if reverse {
                    ChangeKind::TaskRedo
                } else {
                    ChangeKind::TaskStatus
                },
                phase: phase.id.clone(),
                task: Some(task.id.clone()),
                task_name: Some(task.name.clone()),
                from: from.clone(),
                to: task.status.clone(),
                reverse,
            });
        }
    }
    events
}

/// Holds the previous observation and stamps each new one with its changes.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    previous: Option<Snapshot>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach changes since the last observed snapshot (none on the first
    /// call) and remember `current` for the next call.
    pub fn observe(&mut self, current: Snapshot) -> Snapshot {
        let changes = match &self.previous {
            Some(prev) => diff(prev, &current),
            None => Vec::new(),
        };
        let current = current.with_changes(changes);
        self.previous = Some(current.clone());
        current
    }
}
