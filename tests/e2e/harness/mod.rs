//! E2E test harness.
//!
//! This module contains test infrastructure with intentionally unused
//! helpers that will be used as more e2e scenarios are written.

#![allow(dead_code)]

pub mod backend;
pub mod clock;
pub mod workspace;

pub use backend::ScriptedBackend;
pub use clock::MockClock;
pub use workspace::TestWorkspace;
