//! Relation graph commands.

use super::open_project;
use anyhow::Result;
use console::style;

/// List every recorded relation, grouped by source file.
pub fn list() -> Result<()> {
    let project = open_project()?;
    let relations = project.relations().all_relations();

    if relations.is_empty() {
        println!("No relations recorded. Run 'insight index' to build the graph.");
        return Ok(());
    }

    for (source, targets) in &relations {
        println!("{}", style(source).bold());
        for target in targets {
            println!("  → {}", target.path);
        }
    }
    println!();
    println!("{} source files tracked.", relations.len());

    Ok(())
}

/// Record one relation edge.
pub fn add(source: &str, related: &str) -> Result<()> {
    let project = open_project()?;
    project.relations().add_relation(source, related)?;
    println!(
        "{} Recorded relation {} → {}",
        style("✓").green(),
        source,
        related
    );
    Ok(())
}

/// Remove one relation edge.
pub fn remove(source: &str, related: &str) -> Result<()> {
    let project = open_project()?;
    project.relations().remove_relation(source, related)?;
    println!(
        "{} Removed relation {} → {}",
        style("✓").green(),
        source,
        related
    );
    Ok(())
}

/// Prune relations referencing files that no longer exist.
pub fn cleanup() -> Result<()> {
    let project = open_project()?;
    let pruned = project.relations().cleanup()?;

    if pruned == 0 {
        println!("{} Nothing to prune.", style("✓").green());
    } else {
        println!(
            "{} Pruned {} stale relation entries.",
            style("✓").green(),
            pruned
        );
    }
    Ok(())
}
