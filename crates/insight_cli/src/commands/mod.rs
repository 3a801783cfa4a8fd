//! CLI commands.

pub mod analyze;
pub mod fix;
pub mod index;
pub mod init;
pub mod inspections;
pub mod metrics;
pub mod relations;

use anyhow::{Context, Result};
use insight_core::{InsightError, InsightProject};

/// Opens the project at the current directory, mapping failures to terse
/// user-facing messages with a recovery hint when the core provides one.
pub(crate) fn open_project() -> Result<InsightProject> {
    match InsightProject::open(".") {
        Ok(project) => Ok(project),
        Err(e) => {
            if let Some(hint) = e.recovery_suggestion() {
                Err(anyhow::Error::new(e).context(format!("Hint: {}", hint)))
            } else {
                Err(e).context("Not an insight project (run 'insight init' first)")
            }
        }
    }
}

/// Maps a core error to anyhow, attaching its recovery suggestion.
pub(crate) fn with_hint(e: InsightError) -> anyhow::Error {
    match e.recovery_suggestion() {
        Some(hint) => anyhow::Error::new(e).context(format!("Hint: {}", hint)),
        None => anyhow::Error::new(e),
    }
}
