use std::fs;
use std::path::Path;

use chrono::{TimeZone, Utc};
use pw_core::manifest::PHASES;
use pw_core::types::Status;
use pw_core::SnapshotReader;
use serde_json::json;

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn write_json(root: &Path, rel: &str, value: serde_json::Value) {
    write(root, rel, &serde_json::to_string_pretty(&value).unwrap());
}

#[test]
fn empty_project_is_all_pending() {
    let tmp = tempfile::tempdir().unwrap();
    let project = tmp.path().join("acme-pipeline");
    fs::create_dir(&project).unwrap();

    let snap = SnapshotReader::new(&project).read();

    assert_eq!(snap.project_name, "acme-pipeline");
    assert_eq!(snap.phases.len(), PHASES.len());
    assert!(snap.phases.iter().all(|p| p.status == Status::Pending));
    assert!(snap.phases.iter().all(|p| p.duration.is_none()));
    assert!(snap
        .phases
        .iter()
        .flat_map(|p| &p.tasks)
        .all(|t| t.status == Status::Pending && t.started_at.is_none()));
    assert_eq!(snap.session.tasks_completed, 0);
    assert_eq!(snap.session.tasks_failed, 0);
    assert!(snap.session.session_id.is_none());
    assert!(snap.audit_results.is_empty());
    assert!(snap.artifacts.is_empty());
    assert!(snap.changes.is_empty());
}

#[test]
fn every_documented_key_is_present_when_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let snap = SnapshotReader::new(tmp.path()).read();
    let v = serde_json::to_value(&snap).unwrap();
    for key in [
        "project_name",
        "session",
        "phases",
        "task_state_meta",
        "audit_results",
        "artifacts",
        "timestamp",
        "changes",
    ] {
        assert!(v.get(key).is_some(), "missing {key}");
    }
    for key in [
        "session_id",
        "started_at",
        "tasks_completed",
        "tasks_failed",
        "current_phase",
        "current_task",
    ] {
        assert!(v["session"].get(key).is_some(), "missing session.{key}");
    }
    let task = &v["phases"][0]["tasks"][0];
    assert!(task["started_at"].is_null());
    assert!(task["error"].is_null());
    assert_eq!(task["artifacts"], json!([]));
}

#[test]
fn project_label_from_config() {
    let tmp = tempfile::tempdir().unwrap();
    write_json(
        tmp.path(),
        ".outputs/0-setup/project-config.json",
        json!({"project": {"name": "Widget Factory"}}),
    );
    let snap = SnapshotReader::new(tmp.path()).read();
    assert_eq!(snap.project_name, "Widget Factory");
}

#[test]
fn failed_task_marks_phase_failed() {
    let tmp = tempfile::tempdir().unwrap();
    write_json(
        tmp.path(),
        ".claude/task-state.json",
        json!({
            "current_phase": "1-discovery",
            "current_task": "106",
            "phases": {
                "1-discovery": {
                    "completed": false,
                    "tasks": {
                        "101": {"status": "complete"},
                        "106": {"status": "failed", "error": "timeout"}
                    }
                }
            }
        }),
    );

    let snap = SnapshotReader::new(tmp.path()).read();
    let phase = snap.phase("1-discovery").unwrap();
    assert_eq!(phase.status, Status::Failed);
    let t = phase.tasks.iter().find(|t| t.id == "106").unwrap();
    assert_eq!(t.error.as_deref(), Some("timeout"));
    assert_eq!(snap.task_state_meta.current_task.as_deref(), Some("106"));
}

#[test]
fn completed_flag_wins_over_failed_task() {
    let tmp = tempfile::tempdir().unwrap();
    write_json(
        tmp.path(),
        ".claude/task-state.json",
        json!({"phases": {"2-prd": {"completed": true, "tasks": {"203": {"status": "failed"}}}}}),
    );
    let snap = SnapshotReader::new(tmp.path()).read();
    assert_eq!(snap.phase("2-prd").unwrap().status, Status::Complete);
}

#[test]
fn start_timestamp_alone_means_in_progress_with_live_duration() {
    let tmp = tempfile::tempdir().unwrap();
    write_json(
        tmp.path(),
        ".claude/task-state.json",
        json!({"phases": {"3-tasking": {"started_at": "2024-01-01T00:00:00Z"}}}),
    );
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();
    let snap = SnapshotReader::new(tmp.path()).read_at(now);
    let phase = snap.phase("3-tasking").unwrap();
    assert_eq!(phase.status, Status::InProgress);
    assert_eq!(phase.duration, Some(300.0));
    assert_eq!(snap.timestamp, now);
}

#[test]
fn closeout_duration_takes_precedence() {
    let tmp = tempfile::tempdir().unwrap();
    write_json(
        tmp.path(),
        ".claude/task-state.json",
        json!({"phases": {"0-setup": {
            "completed": true,
            "started_at": "2024-01-01T00:00:00Z",
            "completed_at": "2024-01-01T01:00:00Z"
        }}}),
    );
    write_json(
        tmp.path(),
        ".outputs/0-setup/closeout.json",
        json!({"duration_seconds": 42, "summary": "done"}),
    );
    let snap = SnapshotReader::new(tmp.path()).read();
    let phase = snap.phase("0-setup").unwrap();
    assert_eq!(phase.duration, Some(42.0));
    assert_eq!(phase.closeout.as_ref().unwrap()["summary"], "done");
}

#[test]
fn completed_phase_duration_uses_completion_time() {
    let tmp = tempfile::tempdir().unwrap();
    write_json(
        tmp.path(),
        ".claude/task-state.json",
        json!({"phases": {"0-setup": {
            "completed": true,
            "started_at": "2024-01-01T00:00:00",
            "completed_at": "2024-01-01T00:02:30"
        }}}),
    );
    let snap = SnapshotReader::new(tmp.path()).read();
    assert_eq!(snap.phase("0-setup").unwrap().duration, Some(150.0));
}

#[test]
fn unparseable_completion_time_gives_no_duration() {
    let tmp = tempfile::tempdir().unwrap();
    write_json(
        tmp.path(),
        ".claude/task-state.json",
        json!({"phases": {"0-setup": {
            "completed": true,
            "started_at": "2024-01-01T00:00:00Z",
            "completed_at": "not-a-time"
        }}}),
    );
    let reader = SnapshotReader::new(tmp.path());
    for hour in [1, 2] {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap();
        let snap = reader.read_at(now);
        let phase = snap.phase("0-setup").unwrap();
        assert_eq!(phase.status, Status::Complete);
        assert_eq!(phase.duration, None);
    }
}

#[test]
fn malformed_files_are_treated_as_absent() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), ".state/session.json", "{ not json");
    write(tmp.path(), ".claude/task-state.json", "[1, 2");
    write(tmp.path(), ".state/context/artifacts.json", "\"just a string\"");

    let snap = SnapshotReader::new(tmp.path()).read();
    assert!(snap.phases.iter().all(|p| p.status == Status::Pending));
    assert!(snap.session.session_id.is_none());
    assert!(snap.artifacts.is_empty());
}

#[test]
fn audit_results_sorted_and_tagged() {
    let tmp = tempfile::tempdir().unwrap();
    write_json(
        tmp.path(),
        ".state/audit-cache/result-phase2.json",
        json!({"passed": false}),
    );
    write_json(
        tmp.path(),
        ".state/audit-cache/result-phase1.json",
        json!({"passed": true}),
    );
    write_json(tmp.path(), ".state/audit-cache/other.json", json!({"x": 1}));
    write(tmp.path(), ".state/audit-cache/result-phase3.json", "oops");

    let snap = SnapshotReader::new(tmp.path()).read();
    assert_eq!(snap.audit_results.len(), 2);
    assert_eq!(snap.audit_results[0]["_file"], "result-phase1.json");
    assert_eq!(snap.audit_results[0]["passed"], true);
    assert_eq!(snap.audit_results[1]["_file"], "result-phase2.json");
}

#[test]
fn artifacts_and_session_are_loaded() {
    let tmp = tempfile::tempdir().unwrap();
    write_json(
        tmp.path(),
        ".state/context/artifacts.json",
        json!({"artifacts": [{"path": "docs/prd.md"}, {"path": "docs/arch.md"}]}),
    );
    write_json(
        tmp.path(),
        ".state/session.json",
        json!({"session_id": "abc", "started_at": "2024-01-01T00:00:00Z", "tasks_completed": 12, "tasks_failed": 1}),
    );
    let snap = SnapshotReader::new(tmp.path()).read();
    assert_eq!(snap.artifacts.len(), 2);
    assert_eq!(snap.session.session_id.as_deref(), Some("abc"));
    assert_eq!(snap.session.tasks_completed, 12);
    assert_eq!(snap.session.tasks_failed, 1);
}
