//! Tool-call interpretation: apply, unknown tools, malformed args, ceiling.

use crate::harness::{backend, ScriptedBackend, TestWorkspace};
use insight_core::{
    Action, AnalysisScope, CancelToken, Inspection, InspectionState, MetricKind,
};
use serde_json::json;
use std::time::{Duration, Instant};

fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn test_apply_inspection_launches_fix_over_bundle() {
    let backend = ScriptedBackend::start();
    let ws = TestWorkspace::with_sample_project().unwrap();
    let project = ws.init_project(&backend.base_url()).unwrap();

    let store = project.inspections();
    store
        .put_inspection(
            Inspection::with_id("insp-1", "Known finding", "fix it"),
            vec![],
        )
        .unwrap();

    // Analysis reply routes the bundle into insp-1; the background fix it
    // launches then gets a corrected file back.
    backend.push_body(backend::tool_call_body(
        "apply_inspection",
        json!({"inspection_id": "insp-1"}),
    ));
    backend.push_body(backend::content_body(
        "[{\"path\":\"src/lib.rs\",\"content\":\"pub fn greet() { println!(\\\"hi\\\"); }\"}]",
    ));

    let orchestrator = project.orchestrator().unwrap();
    let report = orchestrator.run(
        &AnalysisScope::Files(vec!["src/main.rs".to_string()]),
        &CancelToken::new(),
        |_| {},
    );

    assert_eq!(report.files_processed, 1);
    assert_eq!(report.inspections_created, 0);
    assert!(matches!(report.actions[0], Action::ApplyInspection(_)));
    assert_eq!(project.metrics().count_of(MetricKind::InspectionApplied), 1);

    wait_until("fix completion", || {
        store.state_of("insp-1") == Some(InspectionState::FixApplied)
    });
    let files = store.files_for("insp-1").unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path, "src/lib.rs");
    assert!(files[0].content.contains("println!"));
}

#[test]
fn test_unknown_tool_is_ignored_and_metered() {
    let backend = ScriptedBackend::start();
    let ws = TestWorkspace::with_sample_project().unwrap();
    let project = ws.init_project(&backend.base_url()).unwrap();

    backend.push_body(backend::tool_call_body("summon_reviewer", json!({})));

    let orchestrator = project.orchestrator().unwrap();
    let report = orchestrator.run(
        &AnalysisScope::Files(vec!["src/main.rs".to_string()]),
        &CancelToken::new(),
        |_| {},
    );

    assert_eq!(report.files_processed, 1);
    assert!(report.actions.is_empty());
    assert_eq!(project.inspections().count(), 0);
    assert_eq!(project.metrics().count_of(MetricKind::UnknownTool), 1);
}

#[test]
fn test_malformed_arguments_surface_as_error_action() {
    let backend = ScriptedBackend::start();
    let ws = TestWorkspace::with_sample_project().unwrap();
    let project = ws.init_project(&backend.base_url()).unwrap();

    // add_inspection with arguments that are not valid JSON.
    backend.push_body(
        json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_0",
                        "type": "function",
                        "function": {
                            "name": "add_inspection",
                            "arguments": "definitely not json"
                        }
                    }]
                }
            }]
        })
        .to_string(),
    );

    let orchestrator = project.orchestrator().unwrap();
    let report = orchestrator.run(
        &AnalysisScope::Files(vec!["src/main.rs".to_string()]),
        &CancelToken::new(),
        |_| {},
    );

    assert_eq!(report.files_processed, 1);
    assert!(matches!(report.actions[0], Action::Error { .. }));
    assert_eq!(project.inspections().count(), 0);
}

#[test]
fn test_inspection_ceiling_cancels_analysis() {
    let backend = ScriptedBackend::start();
    let ws = TestWorkspace::with_sample_project().unwrap();
    let project = ws
        .init_project_with(&backend.base_url(), |config| {
            config.inspections.max_open = 1;
        })
        .unwrap();

    project
        .inspections()
        .put_inspection(Inspection::new("pre-existing", "p"), vec![])
        .unwrap();
    backend.push_body(backend::tool_call_body(
        "add_inspection",
        json!({"description": "one too many", "fix_prompt": "p"}),
    ));

    let orchestrator = project.orchestrator().unwrap();
    let report = orchestrator.run(
        &AnalysisScope::Files(vec![
            "src/main.rs".to_string(),
            "src/lib.rs".to_string(),
        ]),
        &CancelToken::new(),
        |_| {},
    );

    // The breaker aborts dispatch and cancels the whole run: the second
    // file is never attempted.
    assert!(report.cancelled);
    assert!(report.actions.is_empty());
    assert_eq!(backend.request_count(), 1);
    assert_eq!(project.inspections().count(), 1);
    assert_eq!(project.metrics().count_of(MetricKind::CeilingExceeded), 1);
    assert_eq!(
        project.metrics().count_of(MetricKind::AnalysisCancelled),
        1
    );
}
