//! Read-only views — `seoflow status`, `phases` and `reports`.

use anyhow::{Context, Result};
use console::style;

use seoflow::config::Config;
use seoflow::ui::icons::PROGRESS;
use seoflow::{PhaseId, Pipeline};

use super::super::Cli;

pub async fn cmd_status(cli: &Cli, config: &Config, subject: &str) -> Result<()> {
    let pipeline = Pipeline::from_config(config);
    let summary = pipeline
        .orchestrator(subject, None)
        .summary()
        .await
        .with_context(|| format!("Failed to read workflow state for {}", subject))?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
        );
        return Ok(());
    }

    println!();
    println!("{}Workflow Status: {}", PROGRESS, subject);
    println!("{}", "=".repeat(40));
    println!();
    println!("Status:    {}", summary.status);
    println!(
        "Current:   {}",
        summary
            .current_phase
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!(
        "Progress:  {:.0}% ({}/{} phases)",
        summary.progress_percentage,
        summary.completed_phases.len(),
        summary.total_phases
    );
    println!();

    for phase in PhaseId::ALL {
        let mark = if summary.completed_phases.contains(&phase) {
            style("done").green()
        } else if summary.current_phase == Some(phase) {
            style("current").yellow()
        } else {
            style("pending").dim()
        };
        println!("  {:<22} {}", phase.as_str(), mark);
    }
    println!();
    Ok(())
}

pub fn cmd_phases(config: &Config) {
    let pipeline = Pipeline::from_config(config);
    println!();
    println!("Canonical phases");
    println!("================");
    println!();
    for phase in PhaseId::ALL {
        let mode = if pipeline.registry().is_implemented(phase) {
            style("implemented").green()
        } else {
            style("degraded").yellow()
        };
        println!(
            "  {}. {:<22} {:<28} {}",
            phase.number(),
            phase.as_str(),
            phase.title(),
            mode
        );
    }
    println!();
}

pub fn cmd_reports(cli: &Cli, config: &Config, subject: &str) -> Result<()> {
    let pipeline = Pipeline::from_config(config);
    let reports = pipeline.store().list_reports(subject)?;

    if cli.json {
        let paths: Vec<String> = reports.iter().map(|p| p.display().to_string()).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&paths).context("Failed to serialize report list")?
        );
        return Ok(());
    }

    if reports.is_empty() {
        println!("No reports found for {}", subject);
        return Ok(());
    }
    for path in &reports {
        match pipeline.store().load_report(path) {
            Ok(report) => println!("{}  {}", path.display(), report.status()),
            Err(e) => println!("{}  (unreadable: {})", path.display(), e),
        }
    }
    Ok(())
}
