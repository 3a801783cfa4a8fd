//! Metrics command.

use super::open_project;
use anyhow::Result;
use console::style;

/// Print every metric recorded during this invocation.
///
/// The log is process-local, so this mostly shows the open/load path; it is
/// useful for checking snapshot recovery and configuration issues.
pub fn run() -> Result<()> {
    let project = open_project()?;
    let entries = project.metrics().snapshot();

    if entries.is_empty() {
        println!("No metrics recorded in this invocation.");
        return Ok(());
    }

    for metric in &entries {
        let params = metric
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "{}  {:?}  {}",
            style(&metric.timestamp).dim(),
            metric.id,
            params
        );
    }
    println!();
    println!("{} metric(s).", entries.len());

    Ok(())
}
