//! Persistence: snapshots survive reopen, corruption is reported, writes
//! are atomic.

use crate::harness::{MockClock, ScriptedBackend, TestWorkspace};
use insight_core::{CodeFile, Inspection, InsightError, InsightProject, MetricKind};
use std::fs;

#[test]
fn test_state_survives_process_restart() {
    let backend = ScriptedBackend::start();
    let ws = TestWorkspace::with_sample_project().unwrap();

    {
        let project = ws.init_project(&backend.base_url()).unwrap();
        project
            .relations()
            .add_relation("src/main.rs", "src/lib.rs")
            .unwrap();
        project
            .inspections()
            .put_inspection(
                Inspection::with_id("persisted-1", "Survives restarts", "p"),
                vec![
                    CodeFile::new("src/main.rs", "fn main() {}"),
                    CodeFile::new("src/lib.rs", "pub fn greet() {}"),
                ],
            )
            .unwrap();
    } // lock released, pool joined

    let reopened = ws.open_project().unwrap();
    assert_eq!(
        reopened.relations().related_files("src/main.rs"),
        vec!["src/lib.rs".to_string()]
    );
    let inspection = reopened.inspections().inspection("persisted-1").unwrap();
    assert_eq!(inspection.description, "Survives restarts");
    assert_eq!(
        reopened.inspections().files_for("persisted-1").unwrap().len(),
        2
    );
}

#[test]
fn test_corrupt_snapshot_is_reported_and_removable() {
    let backend = ScriptedBackend::start();
    let ws = TestWorkspace::with_sample_project().unwrap();
    {
        ws.init_project(&backend.base_url()).unwrap();
    }

    fs::write(ws.path().join(".insight/inspections.json"), "{ torn write").unwrap();

    let result = ws.open_project();
    let err = result.expect_err("corrupt snapshot must fail open");
    let core = err.downcast_ref::<InsightError>().unwrap();
    assert!(matches!(core, InsightError::SnapshotCorrupt { .. }));
    assert!(core.recovery_suggestion().is_some());

    // The documented recovery: remove the snapshot, reopen empty.
    fs::remove_file(ws.path().join(".insight/inspections.json")).unwrap();
    let reopened = ws.open_project().unwrap();
    assert_eq!(reopened.inspections().count(), 0);
}

#[test]
fn test_snapshot_writes_leave_no_temp_files() {
    let backend = ScriptedBackend::start();
    let ws = TestWorkspace::with_sample_project().unwrap();
    let project = ws.init_project(&backend.base_url()).unwrap();

    for i in 0..10 {
        project
            .relations()
            .add_relation(&format!("src/file{}.rs", i), "src/lib.rs")
            .unwrap();
    }
    project
        .inspections()
        .put_inspection(Inspection::new("d", "p"), vec![])
        .unwrap();

    for entry in fs::read_dir(ws.path().join(".insight")).unwrap() {
        let path = entry.unwrap().path();
        assert_ne!(
            path.extension().and_then(|s| s.to_str()),
            Some("tmp"),
            "leftover temp file: {:?}",
            path
        );
    }
}

#[test]
fn test_concurrent_open_is_refused() {
    let backend = ScriptedBackend::start();
    let ws = TestWorkspace::with_sample_project().unwrap();
    let _project = ws.init_project(&backend.base_url()).unwrap();

    let second = ws.open_project();
    let err = second.expect_err("second open must be locked out");
    let core = err.downcast_ref::<InsightError>().unwrap();
    assert!(matches!(core, InsightError::ProjectLocked));
}

#[test]
fn test_injected_clock_stamps_metrics() {
    let backend = ScriptedBackend::start();
    let ws = TestWorkspace::with_sample_project().unwrap();
    {
        ws.init_project(&backend.base_url()).unwrap();
    }

    let clock = MockClock::at(1_700_000_000);
    let project = InsightProject::with_time_provider(ws.path(), clock.as_provider()).unwrap();
    project
        .metrics()
        .record(MetricKind::AnalysisStarted, [("scope", "files")]);

    let entries = project.metrics().snapshot();
    assert_eq!(entries[0].timestamp, "2023-11-14T22:13:20+00:00");
}
