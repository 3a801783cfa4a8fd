//! Index command: builds the relation graph from project structure.

use super::open_project;
use anyhow::{anyhow, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use insight_core::{ProjectHost, RelationIndexHandler};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long to wait for the background walk before giving up.
const INDEX_WAIT: Duration = Duration::from_secs(600);

/// Walk the project and record cross-file usage relations.
pub fn run() -> Result<()> {
    let start = Instant::now();
    let project = open_project()?;

    let total = project.model().files().len();
    println!("Indexing {} source files...", total);

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg:30} [{bar:40.cyan/blue}] {percent}%")
            .unwrap()
            .progress_chars("█▓▒░  "),
    );

    let handler = Arc::new(RelationIndexHandler::new(
        project.model().clone(),
        project.relations().clone(),
    ));
    let pb_clone = pb.clone();
    let started = project
        .indexer()
        .start_indexing(handler.clone(), move |progress| {
            pb_clone.set_position((progress.fraction * 100.0) as u64);
            pb_clone.set_message(progress.current_file);
        });
    if !started {
        pb.finish_and_clear();
        return Err(anyhow!("an index run is already in flight"));
    }

    let outcome = handler
        .wait_outcome(INDEX_WAIT)
        .ok_or_else(|| anyhow!("index run did not finish within {:?}", INDEX_WAIT))?;
    pb.finish_and_clear();

    let snapshot = outcome?;

    println!();
    println!("{}", style("Index Report:").bold());
    println!("  Files walked:      {}", style(snapshot.files_walked).cyan());
    println!(
        "  Elements indexed:  {}",
        style(snapshot.elements_indexed).green()
    );
    println!(
        "  Elements failed:   {}",
        if snapshot.elements_failed > 0 {
            style(snapshot.elements_failed).yellow()
        } else {
            style(snapshot.elements_failed).green()
        }
    );
    println!(
        "  Relations tracked: {}",
        style(project.relations().len()).cyan()
    );
    println!();
    println!(
        "{} Indexed in {:.2}s",
        style("✓").green(),
        start.elapsed().as_secs_f64()
    );

    Ok(())
}
