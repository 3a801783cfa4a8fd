//! Analyze command: drives the AI analysis pipeline.

use super::{open_project, with_hint};
use anyhow::{anyhow, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use insight_core::{Action, AnalysisScope, CancelToken};
use std::time::Instant;

/// Run AI analysis over the given files, or over every related file.
pub fn run(files: Vec<String>, all_related: bool) -> Result<()> {
    let scope = if all_related {
        AnalysisScope::AllRelated
    } else if files.is_empty() {
        return Err(anyhow!(
            "no files given; pass file paths or use --all-related"
        ));
    } else {
        AnalysisScope::Files(files)
    };

    let start = Instant::now();
    let project = open_project()?;
    let orchestrator = project.orchestrator().map_err(with_hint)?;

    let pb = ProgressBar::new(1);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg:30} [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap()
            .progress_chars("█▓▒░  "),
    );

    let pb_clone = pb.clone();
    let report = orchestrator.run(&scope, &CancelToken::new(), move |progress| {
        pb_clone.set_length(progress.total as u64);
        pb_clone.set_position(progress.index as u64 + 1);
        pb_clone.set_message(progress.current_file);
    });
    pb.finish_and_clear();

    if report.cancelled {
        println!(
            "{} Analysis cancelled (inspection ceiling reached or stop requested).",
            style("⚠").yellow()
        );
    }

    println!();
    println!("{}", style("Analysis Report:").bold());
    println!(
        "  Files processed:     {}",
        style(report.files_processed).green()
    );
    println!(
        "  Files skipped:       {}",
        style(report.files_skipped).cyan()
    );
    println!(
        "  Files failed:        {}",
        if report.files_failed > 0 {
            style(report.files_failed).yellow()
        } else {
            style(report.files_failed).green()
        }
    );
    println!(
        "  Inspections created: {}",
        style(report.inspections_created).green()
    );

    let applied = report
        .actions
        .iter()
        .filter(|a| matches!(a, Action::ApplyInspection(_)))
        .count();
    if applied > 0 {
        println!("  Inspections updated: {}", style(applied).cyan());
    }

    println!();
    println!(
        "{} Analyzed in {:.2}s",
        style("✓").green(),
        start.elapsed().as_secs_f64()
    );

    if report.inspections_created > 0 {
        println!();
        println!(
            "Review findings with {}",
            style("insight inspections list").cyan()
        );
    }

    Ok(())
}
