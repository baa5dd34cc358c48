//! Single owner of one subject's [`WorkflowState`].
//!
//! Every transition is applied in memory and then persisted through the
//! [`StateStore`]. A persistence failure is returned to the caller; the
//! in-memory state keeps the transition.

use chrono::{DateTime, Utc};
use seoflow_common::{PhaseId, PhaseInput, PhaseOutput, Profile, string_list};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::state::{WorkflowState, WorkflowStatus};
use super::store::StateStore;
use crate::errors::{StateError, StoreError};

/// Compact progress view of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub subject_id: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub status: WorkflowStatus,
    pub current_phase: Option<PhaseId>,
    pub completed_phases: Vec<PhaseId>,
    pub total_phases: usize,
    pub progress_percentage: f64,
}

impl WorkflowSummary {
    pub fn of(state: &WorkflowState) -> Self {
        Self {
            subject_id: state.subject_id().to_string(),
            run_id: state.run_id(),
            started_at: state.created_at(),
            status: state.status(),
            current_phase: state.current_phase(),
            completed_phases: state.completed_phases().to_vec(),
            total_phases: state.phases().len(),
            progress_percentage: state.progress_percentage(),
        }
    }
}

/// Everything a caller gets back from a run, and what a report contains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResults {
    pub subject_id: String,
    pub workflow_summary: WorkflowSummary,
    pub phase_outputs: BTreeMap<PhaseId, PhaseOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_output: Option<PhaseOutput>,
    /// Set when the request was refused without touching persisted state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected: Option<String>,
}

impl FinalResults {
    pub fn of(state: &WorkflowState) -> Self {
        Self {
            subject_id: state.subject_id().to_string(),
            workflow_summary: WorkflowSummary::of(state),
            phase_outputs: state.phase_outputs().clone(),
            error: state.error().map(str::to_string),
            failed_output: state.failed_output().cloned(),
            rejected: None,
        }
    }

    /// Results for a request that never reached the subject's state.
    pub fn rejected(subject_id: &str, reason: impl Into<String>) -> Self {
        Self {
            rejected: Some(reason.into()),
            ..Self::of(&WorkflowState::new(subject_id))
        }
    }

    pub fn status(&self) -> WorkflowStatus {
        self.workflow_summary.status
    }

    pub fn is_success(&self) -> bool {
        self.rejected.is_none() && self.status() == WorkflowStatus::Completed
    }

    /// Phase the run halted on, if it failed inside a phase.
    pub fn failed_phase(&self) -> Option<PhaseId> {
        self.failed_output.as_ref().map(PhaseOutput::phase)
    }

    /// The error a caller should see: the rejection, or the run's error.
    pub fn error_message(&self) -> Option<&str> {
        self.rejected.as_deref().or(self.error.as_deref())
    }
}

pub struct WorkflowStateManager {
    state: WorkflowState,
    store: Arc<dyn StateStore>,
}

impl WorkflowStateManager {
    /// Load the persisted state for `subject_id`, or start from a fresh one.
    pub fn load(subject_id: &str, store: Arc<dyn StateStore>) -> Result<Self, StoreError> {
        let state = store.load_state(subject_id)?;
        debug!(
            subject = subject_id,
            status = %state.status(),
            completed = state.completed_phases().len(),
            "loaded workflow state"
        );
        Ok(Self { state, store })
    }

    pub fn subject_id(&self) -> &str {
        self.state.subject_id()
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Re-read the persisted state, dropping any unsaved in-memory changes.
    pub fn reload(&mut self) -> Result<(), StoreError> {
        self.state = self.store.load_state(self.state.subject_id())?;
        Ok(())
    }

    pub fn save(&self) -> Result<(), StoreError> {
        self.store.save_state(&self.state)
    }

    fn persist(&self) -> Result<(), StateError> {
        self.save().map_err(StateError::from)
    }

    /// Forget the in-memory state ahead of a new run. Not persisted until
    /// the next transition.
    pub fn reset(&mut self) {
        self.state = WorkflowState::new(self.state.subject_id().to_string());
    }

    /// Replace the state with a fresh running one for a new run.
    pub fn start_workflow(
        &mut self,
        keywords: Vec<String>,
        profile: Profile,
    ) -> Result<(), StateError> {
        let subject = self.state.subject_id().to_string();
        self.state = WorkflowState::started(subject, keywords, profile);
        info!(
            subject = self.state.subject_id(),
            run_id = %self.state.run_id(),
            keywords = self.state.initial_keywords().len(),
            "workflow started"
        );
        self.persist()
    }

    pub fn begin_phase(&mut self, phase: PhaseId) -> Result<(), StateError> {
        self.state.begin_phase(phase)?;
        self.persist()
    }

    /// Build the input for `phase` from the persisted run.
    ///
    /// Keywords are the tuning phase's `final_keywords` once that phase has
    /// completed, else the initial keywords. Previous outputs are the
    /// completed outputs of the canonical predecessors only. The returned
    /// value shares nothing with the manager.
    pub fn create_phase_input(&self, phase: PhaseId) -> PhaseInput {
        let keywords = self
            .state
            .output(PhaseId::Tuning)
            .and_then(|o| o.field("final_keywords"))
            .and_then(string_list)
            .unwrap_or_else(|| self.state.initial_keywords().to_vec());

        let mut input = PhaseInput::new(
            self.state.subject_id(),
            keywords,
            self.state.profile().clone(),
        );
        for predecessor in phase.predecessors() {
            if let Some(output) = self.state.output(*predecessor) {
                input = input.with_previous_output(output.clone());
            }
        }
        input
    }

    pub fn complete_phase(&mut self, output: PhaseOutput) -> Result<(), StateError> {
        let phase = output.phase();
        self.state.complete_phase(output)?;
        info!(
            subject = self.state.subject_id(),
            %phase,
            progress = self.state.progress_percentage(),
            "phase completed"
        );
        self.persist()
    }

    pub fn record_failure(&mut self, output: PhaseOutput) -> Result<(), StateError> {
        warn!(
            subject = self.state.subject_id(),
            phase = %output.phase(),
            error = output.error().unwrap_or_default(),
            "phase failed"
        );
        self.state.record_failure(output)?;
        self.persist()
    }

    pub fn mark_complete(&mut self) -> Result<(), StateError> {
        self.state.mark_complete()?;
        info!(subject = self.state.subject_id(), "workflow completed");
        self.persist()
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), StateError> {
        let error = error.into();
        self.state.mark_failed(error.clone())?;
        warn!(subject = self.state.subject_id(), %error, "workflow failed");
        self.persist()
    }

    pub fn resume(&mut self) -> Result<(), StateError> {
        if self.state.status() == WorkflowStatus::Running {
            return Ok(());
        }
        self.state.resume()?;
        info!(
            subject = self.state.subject_id(),
            completed = self.state.completed_phases().len(),
            "workflow resumed"
        );
        self.persist()
    }

    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary::of(&self.state)
    }

    pub fn final_results(&self) -> FinalResults {
        FinalResults::of(&self.state)
    }
}
