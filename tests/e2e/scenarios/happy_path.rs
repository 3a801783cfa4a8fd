//! Full lifecycle: init, index, analyze, persist, reopen.

use crate::harness::{backend, ScriptedBackend, TestWorkspace};
use insight_core::{AnalysisScope, CancelToken, RelationIndexHandler};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_init_index_analyze_persist() {
    let backend = ScriptedBackend::start();
    let ws = TestWorkspace::with_sample_project().unwrap();
    let project = ws.init_project(&backend.base_url()).unwrap();

    // Index: the usage of greet() in main.rs records main.rs -> lib.rs.
    let handler = Arc::new(RelationIndexHandler::new(
        project.model().clone(),
        project.relations().clone(),
    ));
    assert!(project.indexer().start_indexing(handler.clone(), |_| {}));
    let snapshot = handler
        .wait_outcome(Duration::from_secs(10))
        .expect("index run finished")
        .expect("index run succeeded");
    assert_eq!(snapshot.files_walked, 3);
    assert_eq!(
        project.relations().related_files("src/main.rs"),
        vec!["src/lib.rs".to_string()]
    );

    // Analyze: the backend reports one finding.
    backend.push_body(backend::tool_call_body(
        "add_inspection",
        json!({
            "description": "Greeting lacks output",
            "fix_prompt": "Make greet print a message"
        }),
    ));
    let orchestrator = project.orchestrator().unwrap();
    let report = orchestrator.run(
        &AnalysisScope::Files(vec!["src/main.rs".to_string()]),
        &CancelToken::new(),
        |_| {},
    );

    assert_eq!(report.files_processed, 1);
    assert_eq!(report.inspections_created, 1);
    assert!(!report.cancelled);

    let store = project.inspections();
    assert_eq!(store.count(), 1);
    let inspection = store.inspections().remove(0);
    assert_eq!(inspection.description, "Greeting lacks output");
    // The whole bundle (source + related) is attached.
    let files = store.files_for(&inspection.id).unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].path, "src/main.rs");
    assert_eq!(files[1].path, "src/lib.rs");

    // Everything survives a reopen.
    drop(project);
    let reopened = ws.open_project().unwrap();
    assert_eq!(reopened.inspections().count(), 1);
    assert_eq!(
        reopened.relations().related_files("src/main.rs"),
        vec!["src/lib.rs".to_string()]
    );
}

#[test]
fn test_analysis_request_carries_bundle_and_tools() {
    let backend = ScriptedBackend::start();
    let ws = TestWorkspace::with_sample_project().unwrap();
    let project = ws.init_project(&backend.base_url()).unwrap();

    let orchestrator = project.orchestrator().unwrap();
    orchestrator.run(
        &AnalysisScope::Files(vec!["src/main.rs".to_string()]),
        &CancelToken::new(),
        |_| {},
    );

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request["model"], "gpt-4o-mini");
    assert_eq!(request["tool_choice"], "auto");
    assert_eq!(request["tools"].as_array().unwrap().len(), 3);

    let user = request["messages"][1]["content"].as_str().unwrap();
    assert!(user.contains("src/main.rs"));
    assert!(user.contains("src/lib.rs"));
    assert!(user.contains("greet"));
}

#[test]
fn test_isolated_file_skipped_without_request() {
    let backend = ScriptedBackend::start();
    let ws = TestWorkspace::with_sample_project().unwrap();
    let project = ws.init_project(&backend.base_url()).unwrap();

    let orchestrator = project.orchestrator().unwrap();
    let report = orchestrator.run(
        &AnalysisScope::Files(vec!["src/island.rs".to_string()]),
        &CancelToken::new(),
        |_| {},
    );

    assert_eq!(report.files_skipped, 1);
    assert_eq!(report.files_processed, 0);
    assert_eq!(backend.request_count(), 0);
}

#[test]
fn test_all_related_scope_covers_indexed_sources() {
    let backend = ScriptedBackend::start();
    let ws = TestWorkspace::with_sample_project().unwrap();
    let project = ws.init_project(&backend.base_url()).unwrap();

    let handler = Arc::new(RelationIndexHandler::new(
        project.model().clone(),
        project.relations().clone(),
    ));
    project.indexer().start_indexing(handler.clone(), |_| {});
    handler
        .wait_outcome(Duration::from_secs(10))
        .expect("index run finished")
        .expect("index run succeeded");

    let orchestrator = project.orchestrator().unwrap();
    let report = orchestrator.run(&AnalysisScope::AllRelated, &CancelToken::new(), |_| {});

    // Only main.rs has a recorded relation entry; its crawl resolves and
    // the (default "{}") backend answer means no suggestions.
    assert_eq!(report.files_processed, 1);
    assert_eq!(report.files_failed, 0);
    assert!(report.actions.is_empty());
}
