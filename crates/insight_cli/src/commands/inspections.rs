//! Inspection management commands.

use super::{open_project, with_hint};
use anyhow::Result;
use console::style;

/// List every live inspection.
pub fn list() -> Result<()> {
    let project = open_project()?;
    let store = project.inspections();
    let mut inspections = store.inspections();
    inspections.sort_by(|a, b| a.id.cmp(&b.id));

    if inspections.is_empty() {
        println!("No inspections tracked. Run 'insight analyze' to create some.");
        return Ok(());
    }

    for inspection in &inspections {
        let state = store
            .state_of(&inspection.id)
            .map(|s| s.name())
            .unwrap_or("unknown");
        let files = store
            .files_for(&inspection.id)
            .map(|f| f.len())
            .unwrap_or(0);
        println!(
            "{}  [{}]  {} file(s)",
            style(&inspection.id).cyan(),
            state,
            files
        );
        println!("    {}", inspection.description);
    }
    println!();
    println!("{} inspection(s) tracked.", inspections.len());

    Ok(())
}

/// Show one inspection in full.
pub fn show(id: &str) -> Result<()> {
    let project = open_project()?;
    let store = project.inspections();
    let inspection = store
        .inspection(id)
        .ok_or_else(|| with_hint(insight_core::InsightError::InspectionNotFound(id.into())))?;

    println!("{}", style(&inspection.id).cyan().bold());
    if let Some(state) = store.state_of(id) {
        println!("  State:       {}", state.name());
    }
    println!("  Description: {}", inspection.description);
    println!("  Fix prompt:  {}", inspection.fix_prompt);
    if let Some(files) = store.files_for(id) {
        println!("  Files:");
        for file in &files {
            println!("    {} ({} bytes)", file.path, file.content.len());
        }
    }

    Ok(())
}

/// Remove an inspection.
pub fn remove(id: &str) -> Result<()> {
    let project = open_project()?;
    project.inspections().remove_inspection(id).map_err(with_hint)?;
    println!("{} Removed inspection {}", style("✓").green(), id);
    Ok(())
}

/// Replace an inspection's description.
pub fn set_description(id: &str, description: &str) -> Result<()> {
    let project = open_project()?;
    project
        .inspections()
        .set_description(id, description)
        .map_err(with_hint)?;
    println!("{} Updated description of {}", style("✓").green(), id);
    Ok(())
}

/// Detach one file from an inspection.
pub fn remove_file(id: &str, path: &str) -> Result<()> {
    let project = open_project()?;
    let removed = project
        .inspections()
        .remove_file_from_inspection(id, path)
        .map_err(with_hint)?;

    if removed {
        println!("{} Detached {} from {}", style("✓").green(), path, id);
    } else {
        println!("{} {} was not attached to {}", style("⚠").yellow(), path, id);
    }
    Ok(())
}
