//! The fix round trip: retries, exhaustion, empty answers.

use crate::harness::{backend, ScriptedBackend, TestWorkspace};
use insight_core::{CodeFile, Inspection, InspectionState, MetricKind};
use std::sync::mpsc;
use std::time::Duration;

fn bundle() -> Vec<CodeFile> {
    vec![
        CodeFile::new("src/main.rs", "fn main() {\n    greet();\n}\n"),
        CodeFile::new("src/lib.rs", "pub fn greet() {}\n"),
    ]
}

#[test]
fn test_fix_retries_transport_and_decode_failures() {
    let backend = ScriptedBackend::start();
    let ws = TestWorkspace::with_sample_project().unwrap();
    let project = ws.init_project(&backend.base_url()).unwrap();
    project.gateway().unwrap();

    let store = project.inspections();
    store
        .put_inspection(Inspection::with_id("fix-1", "desc", "do it"), bundle())
        .unwrap();

    // Attempt 1: HTTP failure. Attempt 2: undecodable payload. Attempt 3: good.
    backend.push_status(500, r#"{"error": "internal"}"#);
    backend.push_body(backend::content_body("sorry, here is prose instead"));
    backend.push_body(backend::content_body(
        "```json\n[{\"path\":\"src/lib.rs\",\"content\":\"pub fn greet() { todo!() }\"}]\n```",
    ));

    let (tx, rx) = mpsc::channel();
    store
        .perform_fix_with_progress("fix-1", bundle(), move |corrected| {
            let _ = tx.send(corrected);
        })
        .unwrap();
    let corrected = rx.recv_timeout(Duration::from_secs(10)).unwrap();

    assert_eq!(corrected.len(), 1);
    assert_eq!(corrected[0].path, "src/lib.rs");
    assert_eq!(backend.request_count(), 3);
    assert_eq!(store.state_of("fix-1"), Some(InspectionState::FixApplied));
    assert_eq!(project.metrics().count_of(MetricKind::FixRequested), 1);
    assert_eq!(project.metrics().count_of(MetricKind::FixFailed), 0);
}

#[test]
fn test_fix_exhaustion_yields_empty_result() {
    let backend = ScriptedBackend::start();
    let ws = TestWorkspace::with_sample_project().unwrap();
    let project = ws.init_project(&backend.base_url()).unwrap();
    project.gateway().unwrap();

    let store = project.inspections();
    store
        .put_inspection(Inspection::with_id("fix-2", "desc", "do it"), bundle())
        .unwrap();

    for _ in 0..3 {
        backend.push_body(backend::content_body("still not json"));
    }

    let (tx, rx) = mpsc::channel();
    store
        .perform_fix_with_progress("fix-2", bundle(), move |corrected| {
            let _ = tx.send(corrected);
        })
        .unwrap();
    let corrected = rx.recv_timeout(Duration::from_secs(10)).unwrap();

    // Exhaustion surfaces as an empty correction set, not an error.
    assert!(corrected.is_empty());
    assert_eq!(backend.request_count(), 3);
    assert_eq!(project.metrics().count_of(MetricKind::FixFailed), 1);
    assert!(!store.is_fix_in_flight("fix-2"));
}

#[test]
fn test_fix_accepts_empty_answer_without_retry() {
    let backend = ScriptedBackend::start();
    let ws = TestWorkspace::with_sample_project().unwrap();
    let project = ws.init_project(&backend.base_url()).unwrap();
    project.gateway().unwrap();

    let store = project.inspections();
    store
        .put_inspection(Inspection::with_id("fix-3", "desc", "do it"), bundle())
        .unwrap();

    backend.push_body(backend::content_body("[]"));

    let (tx, rx) = mpsc::channel();
    store
        .perform_fix_with_progress("fix-3", bundle(), move |corrected| {
            let _ = tx.send(corrected);
        })
        .unwrap();
    let corrected = rx.recv_timeout(Duration::from_secs(10)).unwrap();

    assert!(corrected.is_empty());
    // "Nothing to change" is a valid first answer; no retries follow.
    assert_eq!(backend.request_count(), 1);
    assert_eq!(project.metrics().count_of(MetricKind::FixFailed), 0);
    assert_eq!(store.state_of("fix-3"), Some(InspectionState::FixApplied));
}

#[test]
fn test_fix_request_carries_prompt_and_files() {
    let backend = ScriptedBackend::start();
    let ws = TestWorkspace::with_sample_project().unwrap();
    let project = ws.init_project(&backend.base_url()).unwrap();
    project.gateway().unwrap();

    let store = project.inspections();
    store
        .put_inspection(
            Inspection::with_id("fix-4", "Greeting silent", "make greet loud"),
            bundle(),
        )
        .unwrap();
    backend.push_body(backend::content_body("[]"));

    let (tx, rx) = mpsc::channel();
    store
        .perform_fix_with_progress("fix-4", bundle(), move |corrected| {
            let _ = tx.send(corrected);
        })
        .unwrap();
    rx.recv_timeout(Duration::from_secs(10)).unwrap();

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    // Fix requests offer no tools; the answer is plain content.
    assert!(request.get("tools").is_none());
    let user = request["messages"][1]["content"].as_str().unwrap();
    assert!(user.contains("make greet loud"));
    assert!(user.contains("src/main.rs"));
    assert!(user.contains("src/lib.rs"));
    let system = request["messages"][0]["content"].as_str().unwrap();
    assert!(system.contains("JSON array"));
}
