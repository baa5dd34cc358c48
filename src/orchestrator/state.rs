//! Durable workflow state for one subject's pipeline run.

use chrono::{DateTime, Utc};
use seoflow_common::{PhaseId, PhaseOutput, Profile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::errors::StateError;

/// Overall status of a workflow run.
///
/// Within one run the status only moves forward:
/// `NotStarted -> Running -> {Completed | Failed}`. Only an explicit resume
/// moves a failed run back to `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    NotStarted,
    Running,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything persisted about one subject's run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    subject_id: String,
    run_id: Uuid,
    created_at: DateTime<Utc>,
    phases: Vec<PhaseId>,
    #[serde(default)]
    initial_keywords: Vec<String>,
    #[serde(default)]
    profile: Profile,
    #[serde(default)]
    completed_phases: Vec<PhaseId>,
    #[serde(default)]
    phase_outputs: BTreeMap<PhaseId, PhaseOutput>,
    #[serde(default)]
    current_phase: Option<PhaseId>,
    #[serde(default)]
    status: WorkflowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    /// Output of the phase that halted the run, kept for inspection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failed_output: Option<PhaseOutput>,
    #[serde(default)]
    phase_started_at: BTreeMap<PhaseId, DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
}

impl WorkflowState {
    /// A fresh, unstarted state.
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            phases: PhaseId::ALL.to_vec(),
            initial_keywords: Vec::new(),
            profile: Profile::new(),
            completed_phases: Vec::new(),
            phase_outputs: BTreeMap::new(),
            current_phase: None,
            status: WorkflowStatus::NotStarted,
            error: None,
            failed_output: None,
            phase_started_at: BTreeMap::new(),
            finished_at: None,
        }
    }

    /// A fresh running state for a new run.
    pub fn started(subject_id: impl Into<String>, keywords: Vec<String>, profile: Profile) -> Self {
        Self {
            initial_keywords: keywords,
            profile,
            status: WorkflowStatus::Running,
            ..Self::new(subject_id)
        }
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn phases(&self) -> &[PhaseId] {
        &self.phases
    }

    pub fn initial_keywords(&self) -> &[String] {
        &self.initial_keywords
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn completed_phases(&self) -> &[PhaseId] {
        &self.completed_phases
    }

    pub fn phase_outputs(&self) -> &BTreeMap<PhaseId, PhaseOutput> {
        &self.phase_outputs
    }

    pub fn output(&self, phase: PhaseId) -> Option<&PhaseOutput> {
        self.phase_outputs.get(&phase)
    }

    pub fn current_phase(&self) -> Option<PhaseId> {
        self.current_phase
    }

    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn failed_output(&self) -> Option<&PhaseOutput> {
        self.failed_output.as_ref()
    }

    pub fn phase_started_at(&self, phase: PhaseId) -> Option<DateTime<Utc>> {
        self.phase_started_at.get(&phase).copied()
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Whether a run was ever started with onboarding data.
    pub fn has_inputs(&self) -> bool {
        !self.initial_keywords.is_empty()
    }

    pub fn is_completed(&self, phase: PhaseId) -> bool {
        self.completed_phases.contains(&phase)
    }

    pub fn last_completed(&self) -> Option<PhaseId> {
        self.completed_phases.last().copied()
    }

    /// Canonical phases not yet completed, in order.
    pub fn outstanding(&self) -> Vec<PhaseId> {
        self.phases
            .iter()
            .copied()
            .filter(|p| !self.is_completed(*p))
            .collect()
    }

    pub fn all_completed(&self) -> bool {
        self.outstanding().is_empty()
    }

    /// Completed share of the canonical phases, 0 to 100.
    pub fn progress_percentage(&self) -> f64 {
        if self.phases.is_empty() {
            return 0.0;
        }
        self.completed_phases.len() as f64 / self.phases.len() as f64 * 100.0
    }

    fn ensure_running(&self) -> Result<(), StateError> {
        if self.status == WorkflowStatus::Running {
            Ok(())
        } else {
            Err(StateError::NotRunning(self.status))
        }
    }

    /// Point the run at `phase` and stamp its start time.
    pub fn begin_phase(&mut self, phase: PhaseId) -> Result<(), StateError> {
        self.ensure_running()?;
        if self.is_completed(phase) {
            return Err(StateError::AlreadyCompleted(phase));
        }
        self.current_phase = Some(phase);
        self.phase_started_at.insert(phase, Utc::now());
        Ok(())
    }

    /// Record a successful phase output.
    pub fn complete_phase(&mut self, output: PhaseOutput) -> Result<(), StateError> {
        self.ensure_running()?;
        let phase = output.phase();
        if !output.is_success() {
            return Err(StateError::FailedOutput(phase));
        }
        if self.is_completed(phase) {
            return Err(StateError::AlreadyCompleted(phase));
        }
        if self.failed_output.as_ref().is_some_and(|f| f.phase() == phase) {
            self.failed_output = None;
        }
        self.completed_phases.push(phase);
        self.phase_outputs.insert(phase, output);
        self.current_phase = None;
        Ok(())
    }

    /// Keep the failing output; the current pointer stays on the failed phase.
    pub fn record_failure(&mut self, output: PhaseOutput) -> Result<(), StateError> {
        self.ensure_running()?;
        if self.is_completed(output.phase()) {
            return Err(StateError::AlreadyCompleted(output.phase()));
        }
        self.current_phase = Some(output.phase());
        self.failed_output = Some(output);
        Ok(())
    }

    pub fn mark_complete(&mut self) -> Result<(), StateError> {
        if self.status != WorkflowStatus::Running {
            return Err(StateError::InvalidTransition {
                from: self.status,
                to: WorkflowStatus::Completed,
            });
        }
        let missing = self.outstanding();
        if !missing.is_empty() {
            return Err(StateError::Incomplete { missing });
        }
        self.status = WorkflowStatus::Completed;
        self.current_phase = None;
        self.error = None;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), StateError> {
        if self.status.is_terminal() {
            return Err(StateError::InvalidTransition {
                from: self.status,
                to: WorkflowStatus::Failed,
            });
        }
        self.status = WorkflowStatus::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Explicitly continue a running or failed run.
    pub fn resume(&mut self) -> Result<(), StateError> {
        match self.status {
            WorkflowStatus::Running | WorkflowStatus::Failed => {
                self.status = WorkflowStatus::Running;
                self.error = None;
                self.finished_at = None;
                Ok(())
            }
            from => Err(StateError::InvalidTransition {
                from,
                to: WorkflowStatus::Running,
            }),
        }
    }

    /// Check the invariants a loaded record must satisfy.
    pub fn validate(&self) -> Result<(), String> {
        if self.phases != PhaseId::ALL {
            return Err("phase list is not the canonical order".to_string());
        }
        for (i, phase) in self.completed_phases.iter().enumerate() {
            if self.completed_phases[..i].contains(phase) {
                return Err(format!("{} completed more than once", phase));
            }
            if !self.phase_outputs.contains_key(phase) {
                return Err(format!("{} completed without an output", phase));
            }
        }
        if let Some(extra) = self.phase_outputs.keys().find(|p| !self.is_completed(**p)) {
            return Err(format!("output stored for {} which is not completed", extra));
        }
        if let Some(current) = self.current_phase
            && self.is_completed(current)
        {
            return Err(format!("current phase {} is already completed", current));
        }
        match self.status {
            WorkflowStatus::Completed if !self.all_completed() => {
                Err("status is completed but phases are outstanding".to_string())
            }
            WorkflowStatus::Failed if self.error.is_none() => {
                Err("status is failed but no error is recorded".to_string())
            }
            _ => Ok(()),
        }
    }
}
