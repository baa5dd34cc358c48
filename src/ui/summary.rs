//! Plain-text rendering of final results for the console.

use console::style;
use seoflow_common::{PhaseId, string_list};
use serde_json::Value;
use std::fmt::Write;

use crate::orchestrator::{FinalResults, WorkflowStatus};
use crate::ui::icons::{CHECK, CROSS, SKIPPED};

/// One-line digest of a phase payload, if it has the fields we know about.
pub fn phase_digest(phase: PhaseId, data: &Value) -> Option<String> {
    let count = |field: &str| data.get(field).and_then(string_list).map(|v| v.len());
    let number = |field: &str| data.get(field).and_then(Value::as_u64);

    match phase {
        PhaseId::Tuning => count("final_keywords").map(|n| format!("{} final keywords", n)),
        PhaseId::Market => {
            number("avg_search_volume").map(|v| format!("Avg volume {}/month", v))
        }
        PhaseId::RealityCheck => {
            number("keywords_with_rankings").map(|n| format!("{} keywords ranked", n))
        }
        PhaseId::GapClassification => {
            count("untapped_gold").map(|n| format!("{} untapped gold opportunities", n))
        }
        PhaseId::Competitors => {
            number("keywords_analyzed").map(|n| format!("{} competitor analyses", n))
        }
    }
}

pub fn render_summary(results: &FinalResults) -> String {
    let summary = &results.workflow_summary;
    let mut out = String::new();

    let _ = writeln!(out, "Workflow Summary");
    let _ = writeln!(out, "{}", "─".repeat(40));
    let _ = writeln!(out, "Subject:   {}", results.subject_id);

    if let Some(reason) = &results.rejected {
        let _ = writeln!(out, "Status:    {}", style("REJECTED").red().bold());
        let _ = writeln!(out, "{}Rejected: {}", CROSS, reason);
        return out;
    }

    let status = summary.status.as_str().to_uppercase();
    let status = match summary.status {
        WorkflowStatus::Completed => style(status).green().bold(),
        WorkflowStatus::Failed => style(status).red().bold(),
        _ => style(status).yellow(),
    };
    let _ = writeln!(out, "Status:    {}", status);
    let _ = writeln!(
        out,
        "Progress:  {:.0}% ({}/{} phases)",
        summary.progress_percentage,
        summary.completed_phases.len(),
        summary.total_phases
    );
    let _ = writeln!(out);

    for phase in PhaseId::ALL {
        let label = format!("Phase {}: {}", phase.number(), phase.title());
        match results.phase_outputs.get(&phase) {
            Some(output) => {
                let digest = phase_digest(phase, output.data())
                    .map(|d| format!(" - {}", d))
                    .unwrap_or_default();
                let _ = writeln!(out, "{}{}{}", CHECK, label, digest);
            }
            None if results.failed_phase() == Some(phase) => {
                let reason = results
                    .failed_output
                    .as_ref()
                    .and_then(|o| o.error())
                    .unwrap_or("unknown error");
                let _ = writeln!(out, "{}{} - failed: {}", CROSS, label, reason);
            }
            None => {
                let _ = writeln!(out, "{}{} - not run", SKIPPED, label);
            }
        }
    }

    if let Some(error) = &results.error {
        let _ = writeln!(out);
        let _ = writeln!(out, "Error: {}", error);
    }
    out
}
