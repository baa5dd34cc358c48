use crate::orchestrator::FinalResults;
use crate::ui::icons::{CHECK, CROSS, DEGRADED, REPORT, RESUME, SPARKLE};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use seoflow_common::{PhaseId, PhaseOutput};
use std::path::Path;

/// Terminal UI for a pipeline run, rendered via `indicatif`.
///
/// A single bar tracks how many of the canonical phases have completed;
/// per-phase events are printed above it.
pub struct PipelineUI {
    multi: MultiProgress,
    phase_bar: ProgressBar,
    verbose: bool,
}

impl PipelineUI {
    /// Create the UI with a phase bar sized to `total_phases`.
    ///
    /// When `verbose` is set, each completed phase also prints a one-line
    /// digest of its payload.
    pub fn new(total_phases: u64, verbose: bool) -> Self {
        Self::with_target(total_phases, verbose, ProgressDrawTarget::stderr())
    }

    /// A UI that draws nothing; used for `--quiet` and in tests.
    pub fn hidden() -> Self {
        Self::with_target(
            PhaseId::COUNT as u64,
            false,
            ProgressDrawTarget::hidden(),
        )
    }

    fn with_target(total_phases: u64, verbose: bool, target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);

        let phase_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let phase_bar = multi.add(ProgressBar::new(total_phases));
        phase_bar.set_style(phase_style);
        phase_bar.set_prefix("Phases");

        Self {
            multi,
            phase_bar,
            verbose,
        }
    }

    /// Print through the progress renderer, falling back to stderr.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn print_header(&self, subject_id: &str, business: Option<&str>, keyword_count: usize) {
        self.print_line("");
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
        self.print_line(format!(
            "{} Keyword pipeline for {}",
            style("▶").green().bold(),
            style(subject_id).yellow().bold()
        ));
        if let Some(business) = business {
            self.print_line(format!("{}  {}", style("Business:").dim(), business));
        }
        self.print_line(format!(
            "{}  {} selected",
            style("Keywords:").dim(),
            keyword_count
        ));
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
        self.print_line("");
    }

    /// Announce a continuation and move the bar past the completed phases.
    pub fn resuming(&self, from: PhaseId, completed: usize) {
        self.phase_bar.set_position(completed as u64);
        self.print_line(format!(
            "{} Resuming from {} ({} phase(s) already complete)",
            RESUME,
            style(from).yellow(),
            completed
        ));
    }

    pub fn start_phase(&self, phase: PhaseId, degraded: bool) {
        let suffix = if degraded {
            format!(" {}", style("(degraded)").dim())
        } else {
            String::new()
        };
        self.phase_bar.set_message(format!(
            "Phase {}: {}{}",
            style(phase.number()).yellow(),
            phase.title(),
            suffix
        ));
        if degraded && self.verbose {
            self.print_line(format!(
                "    {} {} has no handler, using degraded output",
                DEGRADED,
                phase.title()
            ));
        }
    }

    pub fn phase_complete(&self, output: &PhaseOutput) {
        self.phase_bar.inc(1);
        let phase = output.phase();
        self.print_line(format!(
            "{} Phase {}: {} complete",
            CHECK,
            phase.number(),
            style(phase.title()).green().bold()
        ));
        if self.verbose
            && let Some(line) = super::summary::phase_digest(phase, output.data())
        {
            self.print_line(format!("    {}", style(line).dim()));
        }
    }

    pub fn phase_failed(&self, phase: PhaseId, reason: &str) {
        self.print_line(format!(
            "{} Phase {}: {} failed: {}",
            CROSS,
            phase.number(),
            style(phase.title()).red().bold(),
            reason
        ));
    }

    /// Clear the bar and print the outcome line.
    pub fn finish(&self, results: &FinalResults, report: Option<&Path>) {
        self.phase_bar.finish_and_clear();
        if let Some(reason) = &results.rejected {
            self.print_line(format!("{} Request rejected: {}", CROSS, reason));
            return;
        }
        if results.is_success() {
            self.print_line(format!(
                "\n{} Workflow {}\n",
                SPARKLE,
                style("complete").green().bold()
            ));
        } else if let Some(error) = &results.error {
            self.print_line(format!(
                "\n{} Workflow failed: {}\n",
                CROSS,
                style(error).red()
            ));
        }
        if let Some(path) = report {
            self.print_line(format!(
                "{} Report saved to {}",
                REPORT,
                style(path.display()).dim()
            ));
        }
    }
}
