//! Cooperative cancellation across the analysis and fix paths.

use crate::harness::{backend, ScriptedBackend, TestWorkspace};
use insight_core::{
    AnalysisScope, CancelToken, CodeFile, Inspection, InspectionState, MetricKind, StoreEvent,
};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn bundle() -> Vec<CodeFile> {
    vec![
        CodeFile::new("src/main.rs", "fn main() {\n    greet();\n}\n"),
        CodeFile::new("src/lib.rs", "pub fn greet() {}\n"),
    ]
}

#[test]
fn test_fired_token_stops_analysis_before_any_request() {
    let backend = ScriptedBackend::start();
    let ws = TestWorkspace::with_sample_project().unwrap();
    let project = ws.init_project(&backend.base_url()).unwrap();

    let token = CancelToken::new();
    token.cancel();

    let orchestrator = project.orchestrator().unwrap();
    let report = orchestrator.run(
        &AnalysisScope::Files(vec!["src/main.rs".to_string()]),
        &token,
        |_| {},
    );

    assert!(report.cancelled);
    assert_eq!(report.files_processed, 0);
    assert_eq!(backend.request_count(), 0);
    assert_eq!(
        project.metrics().count_of(MetricKind::AnalysisCancelled),
        1
    );
    // Cancellation is not failure.
    assert_eq!(project.metrics().count_of(MetricKind::Error), 0);
}

#[test]
fn test_cancelled_fix_restores_prior_state() {
    let backend = ScriptedBackend::start();
    let ws = TestWorkspace::with_sample_project().unwrap();
    let project = ws.init_project(&backend.base_url()).unwrap();
    project.gateway().unwrap();

    let store = project.inspections();
    store
        .put_inspection(Inspection::with_id("slow-1", "desc", "do it"), bundle())
        .unwrap();
    assert_eq!(store.state_of("slow-1"), Some(InspectionState::FilesAttached));

    let (event_tx, event_rx) = mpsc::channel();
    let event_tx = Mutex::new(event_tx);
    project.events().subscribe(Arc::new(move |event: &StoreEvent| {
        if matches!(event, StoreEvent::InspectionCancelled { .. }) {
            let _ = event_tx.lock().unwrap().send(event.clone());
        }
    }));

    // The first reply is held long enough to cancel mid-flight; it is also
    // undecodable, so without cancellation the loop would retry.
    backend.push_delayed(backend::content_body("not json"), Duration::from_millis(500));

    let (done_tx, done_rx) = mpsc::channel();
    let token = store
        .perform_fix_with_progress("slow-1", bundle(), move |corrected| {
            let _ = done_tx.send(corrected);
        })
        .unwrap();
    assert!(store.is_fix_in_flight("slow-1"));

    thread::sleep(Duration::from_millis(100));
    token.cancel();

    // The dedicated cancellation signal fires; completion never does.
    event_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("InspectionCancelled event");
    assert!(done_rx.recv_timeout(Duration::from_millis(200)).is_err());

    assert_eq!(store.state_of("slow-1"), Some(InspectionState::FilesAttached));
    assert!(!store.is_fix_in_flight("slow-1"));
}

#[test]
fn test_cancel_fix_via_store() {
    let backend = ScriptedBackend::start();
    let ws = TestWorkspace::with_sample_project().unwrap();
    let project = ws.init_project(&backend.base_url()).unwrap();
    project.gateway().unwrap();

    let store = project.inspections();
    store
        .put_inspection(Inspection::with_id("slow-2", "desc", "do it"), bundle())
        .unwrap();

    backend.push_delayed(backend::content_body("not json"), Duration::from_millis(500));

    let (event_tx, event_rx) = mpsc::channel();
    let event_tx = Mutex::new(event_tx);
    project.events().subscribe(Arc::new(move |event: &StoreEvent| {
        if matches!(event, StoreEvent::InspectionCancelled { .. }) {
            let _ = event_tx.lock().unwrap().send(());
        }
    }));

    store
        .perform_fix_with_progress("slow-2", bundle(), |_| {})
        .unwrap();
    thread::sleep(Duration::from_millis(100));
    assert!(store.cancel_fix("slow-2"));

    event_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("InspectionCancelled event");
    assert!(!store.is_fix_in_flight("slow-2"));

    // Cancelling when nothing runs reports false.
    assert!(!store.cancel_fix("slow-2"));
}

#[test]
fn test_stop_indexing_aborts_walk() {
    let backend = ScriptedBackend::start();
    let ws = TestWorkspace::with_sample_project().unwrap();
    let project = ws.init_project(&backend.base_url()).unwrap();

    // Cancel immediately; the walk checks the token per file and per
    // element, so it aborts at its first checkpoint.
    let handler = Arc::new(insight_core::RelationIndexHandler::new(
        project.model().clone(),
        project.relations().clone(),
    ));
    assert!(project.indexer().start_indexing(handler.clone(), |_| {}));
    project.indexer().stop_indexing();

    match handler.wait_outcome(Duration::from_secs(10)) {
        Some(Err(e)) => assert!(e.is_cancellation()),
        Some(Ok(_)) => {
            // The walk can win the race and finish first; that is fine.
        }
        None => panic!("index run never reported"),
    }
    assert!(!project.indexer().is_indexing());
}
