//! Workflow execution — `seoflow run`, `resume`, `from` and `phase`.

use anyhow::{Context, Result};
use std::sync::Arc;

use seoflow::config::Config;
use seoflow::orchestrator::{FinalResults, WorkflowStatus};
use seoflow::ui::{PipelineUI, render_summary};
use seoflow::{PhaseId, Pipeline};

use super::super::Cli;

/// Which orchestrator entry point a command maps to.
pub enum RunMode {
    Complete,
    Resume,
    From(String),
    Single(String),
}

pub async fn run_workflow(cli: &Cli, config: &Config, subject: &str, mode: RunMode) -> Result<()> {
    let pipeline = Pipeline::from_config(config);
    let ui = (!cli.quiet && !cli.json)
        .then(|| Arc::new(PipelineUI::new(PhaseId::COUNT as u64, cli.verbose)));
    let orchestrator = pipeline.orchestrator(subject, ui);

    let results = match mode {
        RunMode::Complete => orchestrator.run_complete_workflow().await,
        RunMode::Resume => orchestrator.resume_workflow().await,
        RunMode::From(name) => orchestrator.run_named_phases_from(&name).await,
        RunMode::Single(name) => {
            let phase: PhaseId = name.parse()?;
            orchestrator.run_single_phase(phase).await
        }
    };

    print_results(cli, &results)?;

    // A single phase leaves the run open, so only a failure or a rejection
    // counts against the exit code.
    if results.rejected.is_some() || results.status() == WorkflowStatus::Failed {
        anyhow::bail!(
            "{}",
            results.error_message().unwrap_or("workflow did not complete")
        );
    }
    Ok(())
}

pub fn print_results(cli: &Cli, results: &FinalResults) -> Result<()> {
    if cli.json {
        let json = serde_json::to_string_pretty(results).context("Failed to serialize results")?;
        println!("{}", json);
    } else {
        println!();
        print!("{}", render_summary(results));
    }
    Ok(())
}
