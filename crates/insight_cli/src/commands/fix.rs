//! Fix command: runs the AI fix loop for one inspection.

use super::{open_project, with_hint};
use anyhow::{anyhow, Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use insight_core::{InsightError, InspectionState};
use std::fs;
use std::sync::mpsc;
use std::time::Duration;

/// How long to wait for the background fix before giving up.
const FIX_WAIT: Duration = Duration::from_secs(600);

/// Request corrected files for the inspection's attached bundle.
///
/// Without `--write` the corrections are only summarized; with it they are
/// written back into the project tree.
pub fn run(id: &str, write: bool) -> Result<()> {
    let project = open_project()?;
    // Binds the backend as the store's fix runner.
    project.gateway().map_err(with_hint)?;

    let store = project.inspections();
    let inspection = store
        .inspection(id)
        .ok_or_else(|| with_hint(InsightError::InspectionNotFound(id.to_string())))?;
    let files = store.files_for(id).unwrap_or_default();
    if files.is_empty() {
        return Err(anyhow!("inspection {} has no attached files", id));
    }

    println!("Fixing: {}", style(&inspection.description).bold());
    println!("  {} file(s) in the bundle", files.len());

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message("Waiting for the backend...");
    pb.enable_steady_tick(Duration::from_millis(120));

    let (tx, rx) = mpsc::channel();
    store
        .perform_fix_with_progress(id, files, move |corrected| {
            let _ = tx.send(corrected);
        })
        .map_err(with_hint)?;

    let corrected = rx
        .recv_timeout(FIX_WAIT)
        .map_err(|_| anyhow!("fix did not finish within {:?}", FIX_WAIT))?;
    pb.finish_and_clear();

    if store.state_of(id) == Some(InspectionState::FixFailed) {
        println!(
            "{} Fix failed after exhausting retries; no corrections produced.",
            style("×").red()
        );
        println!("Check RUST_LOG=insight_core=debug output for the backend exchange.");
        return Ok(());
    }

    if corrected.is_empty() {
        println!(
            "{} Backend returned no corrections; the files may already be fine.",
            style("✓").green()
        );
        return Ok(());
    }

    println!("{}", style("Corrected files:").bold());
    for file in &corrected {
        println!("  {} ({} bytes)", file.path, file.content.len());
    }

    if write {
        for file in &corrected {
            let path = project.root().join(&file.path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(&path, &file.content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            // Keep the in-memory structure in step with the disk.
            project.model().update_file(&file.path, &file.content);
        }
        println!();
        println!(
            "{} Wrote {} file(s) to disk.",
            style("✓").green(),
            corrected.len()
        );
    } else {
        println!();
        println!(
            "Run with {} to apply the corrections.",
            style("--write").cyan()
        );
    }

    Ok(())
}
