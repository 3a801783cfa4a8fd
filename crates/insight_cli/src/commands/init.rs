//! Initialize an insight project.

use anyhow::{Context, Result};
use insight_core::{InsightProject, ProjectHost};

/// Initialize an insight project in the current directory.
pub fn run() -> Result<()> {
    let project = InsightProject::init(".").context("Failed to initialize insight project")?;

    let file_count = project.model().files().len();

    println!("Initialized insight project in .insight/");
    println!();
    println!("Directory structure:");
    println!("  .insight/config.toml       - Backend and engine configuration");
    println!("  .insight/relations.json    - Persisted relation graph");
    println!("  .insight/inspections.json  - Persisted inspections");
    println!();
    println!("Indexed {} source files.", file_count);
    println!();
    println!("Next steps:");
    println!("  1. Set your API key: export OPENAI_API_KEY=...");
    println!("  2. Build the relation graph: insight index");
    println!("  3. Analyze files: insight analyze src/main.rs");

    Ok(())
}
