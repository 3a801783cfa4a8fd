//! Core data types for the inspection engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A captured project file: stable path plus the text it held at capture time.
///
/// Value type; two captures are equal only when both path and content match.
/// There is no automatic invalidation — if the underlying file changes after
/// capture, callers must refetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFile {
    /// Stable URL-like identifier (project-relative path).
    pub path: String,
    /// Full text content at capture time.
    pub content: String,
}

impl CodeFile {
    /// Creates a new captured file.
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// A proposed code improvement.
///
/// Identity is `id`; the description is logically mutable but implemented as
/// value-replace (remove and reinsert under the same id, carrying the file
/// set forward).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inspection {
    /// UUID identifying this inspection across edits.
    pub id: String,
    /// Human-readable summary (kept short by convention, not enforced).
    pub description: String,
    /// Machine-directed prompt used when applying the fix.
    pub fix_prompt: String,
}

impl Inspection {
    /// Creates an inspection with a fresh UUID.
    pub fn new(description: impl Into<String>, fix_prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            fix_prompt: fix_prompt.into(),
        }
    }

    /// Creates an inspection under an existing id (load path, description edits).
    pub fn with_id(
        id: impl Into<String>,
        description: impl Into<String>,
        fix_prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            fix_prompt: fix_prompt.into(),
        }
    }
}

/// Inspection lifecycle states.
///
/// `Removed` is terminal; no further mutation is permitted once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InspectionState {
    /// Created, no files attached yet.
    Created,
    /// Files are attached; the inspection is idle.
    FilesAttached,
    /// A background fix operation is running.
    FixInProgress,
    /// The last fix operation completed successfully.
    FixApplied,
    /// The last fix operation failed after exhausting retries.
    FixFailed,
    /// Removed by the user; terminal.
    Removed,
}

impl InspectionState {
    /// Whether the state machine admits a transition from `self` to `next`.
    pub fn can_transition_to(&self, next: InspectionState) -> bool {
        use InspectionState::*;
        match (self, next) {
            // Removal is allowed from any live state, including mid-fix.
            (Removed, _) => false,
            (_, Removed) => true,
            (Created, FilesAttached) | (Created, FixInProgress) => true,
            (FilesAttached, FilesAttached) | (FilesAttached, FixInProgress) => true,
            (FixInProgress, FixApplied) | (FixInProgress, FixFailed) => true,
            // A cancelled fix reverts to idle.
            (FixInProgress, FilesAttached) => true,
            (FixApplied, FilesAttached) | (FixApplied, FixInProgress) => true,
            (FixFailed, FilesAttached) | (FixFailed, FixInProgress) => true,
            _ => false,
        }
    }

    /// Short name used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            InspectionState::Created => "created",
            InspectionState::FilesAttached => "files-attached",
            InspectionState::FixInProgress => "fix-in-progress",
            InspectionState::FixApplied => "fix-applied",
            InspectionState::FixFailed => "fix-failed",
            InspectionState::Removed => "removed",
        }
    }
}

/// Result of interpreting one backend tool-call.
///
/// One response may yield zero or more actions; an unknown tool name yields
/// none at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// A new inspection was created and registered.
    AddInspection(Inspection),
    /// An existing inspection had the current file bundle applied to it.
    ApplyInspection(Inspection),
    /// The backend asked for additional context; informational only.
    RequestContext {
        /// Kind of context requested (free-form string from the backend).
        context_type: String,
    },
    /// A known tool-call could not be interpreted.
    Error {
        /// Human-readable description of what went wrong.
        message: String,
    },
}

/// Outcome of one backend round trip, decoupled from transport.
#[derive(Debug, Clone, Default)]
pub struct AnalysisResult {
    /// Free-text content from the backend, when present.
    pub content: Option<String>,
    /// Actions produced by tool-call interpretation, in call order.
    pub actions: Vec<Action>,
    /// Transport or backend failure, when the round trip failed.
    pub error: Option<String>,
}

impl AnalysisResult {
    /// Result representing a failed round trip.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            content: None,
            actions: Vec::new(),
            error: Some(message.into()),
        }
    }

    /// True when the round trip failed.
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}
