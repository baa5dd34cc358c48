//! Sequential, fail-fast driver for the canonical phase pipeline.
//!
//! Every public entry point returns [`FinalResults`]. Failures inside a run
//! (missing profile, failed phase, bad start phase, persistence errors)
//! are recorded on the workflow state as its top-level error. Requests
//! that cannot touch the state at all (a run already in progress, an
//! unreadable state record, a finished run) come back with `rejected` set.

use chrono::Utc;
use seoflow_common::PhaseId;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{error, info, instrument, warn};

use super::cache::ManagerCache;
use super::manager::{FinalResults, WorkflowStateManager, WorkflowSummary};
use super::state::WorkflowStatus;
use super::store::{ReportStore, RunLock};
use crate::errors::{OrchestratorError, StateError, StoreError};
use crate::profile::ProfileSource;
use crate::registry::PhaseRegistry;
use crate::ui::PipelineUI;

pub struct Orchestrator {
    subject_id: String,
    registry: Arc<PhaseRegistry>,
    profiles: Arc<dyn ProfileSource>,
    reports: Arc<dyn ReportStore>,
    managers: Arc<ManagerCache>,
    ui: Option<Arc<PipelineUI>>,
}

impl Orchestrator {
    pub fn new(
        subject_id: impl Into<String>,
        registry: Arc<PhaseRegistry>,
        profiles: Arc<dyn ProfileSource>,
        reports: Arc<dyn ReportStore>,
        managers: Arc<ManagerCache>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            registry,
            profiles,
            reports,
            managers,
            ui: None,
        }
    }

    pub fn with_ui(mut self, ui: Arc<PipelineUI>) -> Self {
        self.ui = Some(ui);
        self
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Start a fresh run and execute every canonical phase in order.
    #[instrument(skip(self), fields(subject = %self.subject_id))]
    pub async fn run_complete_workflow(&self) -> FinalResults {
        match self.acquire() {
            Ok(mut session) => self.drive(&mut session.manager, Plan::Fresh).await,
            Err(rejected) => rejected,
        }
    }

    /// Continue an existing run at `start`; every predecessor must be completed.
    #[instrument(skip(self), fields(subject = %self.subject_id))]
    pub async fn run_phases_from(&self, start: PhaseId) -> FinalResults {
        match self.acquire() {
            Ok(mut session) => self.drive(&mut session.manager, Plan::From(start)).await,
            Err(rejected) => rejected,
        }
    }

    /// Like [`Self::run_phases_from`], with the phase given by name.
    ///
    /// An unknown name is recorded as the run's error.
    pub async fn run_named_phases_from(&self, name: &str) -> FinalResults {
        match name.parse::<PhaseId>() {
            Ok(phase) => self.run_phases_from(phase).await,
            Err(e) => match self.acquire() {
                Ok(mut session) => self.conclude(&mut session.manager, Err(e.into()), false),
                Err(rejected) => rejected,
            },
        }
    }

    /// Continue from the phase after the last completed one.
    ///
    /// With nothing completed this is a full run; with everything
    /// completed it returns the existing results unchanged.
    #[instrument(skip(self), fields(subject = %self.subject_id))]
    pub async fn resume_workflow(&self) -> FinalResults {
        let mut session = match self.acquire() {
            Ok(session) => session,
            Err(rejected) => return rejected,
        };
        let state = session.manager.state();
        let plan = match state.last_completed() {
            None => Plan::Fresh,
            Some(last) => match last.next() {
                Some(next) => Plan::From(next),
                None => Plan::Finished,
            },
        };
        self.drive(&mut session.manager, plan).await
    }

    /// Execute exactly one phase of an existing run.
    #[instrument(skip(self), fields(subject = %self.subject_id))]
    pub async fn run_single_phase(&self, phase: PhaseId) -> FinalResults {
        match self.acquire() {
            Ok(mut session) => self.drive(&mut session.manager, Plan::Only(phase)).await,
            Err(rejected) => rejected,
        }
    }

    /// Current progress without running anything.
    pub async fn summary(&self) -> Result<WorkflowSummary, OrchestratorError> {
        let handle = self.managers.get_or_load(&self.subject_id)?;
        let manager = handle.lock().await;
        Ok(manager.summary())
    }

    /// Take the subject exclusively: the in-process manager mutex first,
    /// then the store's cross-process lock, then a fresh read of the state.
    fn acquire(&self) -> Result<Session, FinalResults> {
        let handle = self
            .managers
            .get_or_load(&self.subject_id)
            .map_err(|e| self.reject(e.into()))?;
        let mut manager = handle
            .try_lock_owned()
            .map_err(|_| self.reject(OrchestratorError::RunInProgress(self.subject_id.clone())))?;
        let lock = self
            .managers
            .store()
            .acquire_run(&self.subject_id)
            .map_err(|e| match e {
                StoreError::Locked { .. } => {
                    self.reject(OrchestratorError::RunInProgress(self.subject_id.clone()))
                }
                other => self.reject(other.into()),
            })?;
        manager.reload().map_err(|e| self.reject(e.into()))?;
        Ok(Session {
            manager,
            _lock: lock,
        })
    }

    fn reject(&self, err: OrchestratorError) -> FinalResults {
        warn!(subject = %self.subject_id, error = %err, "request rejected");
        let results = FinalResults::rejected(&self.subject_id, err.to_string());
        if let Some(ui) = &self.ui {
            ui.finish(&results, None);
        }
        results
    }

    async fn drive(&self, m: &mut WorkflowStateManager, plan: Plan) -> FinalResults {
        let outcome = match plan {
            Plan::Fresh => self.fresh_run(m).await,
            Plan::From(start) => self.continue_run(m, start, start.suffix_from()).await,
            Plan::Only(phase) => {
                self.continue_run(m, phase, std::slice::from_ref(&phase))
                    .await
            }
            Plan::Finished => {
                info!(subject = %self.subject_id, "all phases already completed");
                if m.state().status() == WorkflowStatus::Running {
                    m.mark_complete().map_err(OrchestratorError::from)
                } else {
                    return m.final_results();
                }
            }
        };
        self.conclude(m, outcome, true)
    }

    async fn fresh_run(&self, m: &mut WorkflowStateManager) -> Result<(), OrchestratorError> {
        m.reset();

        let profile = self
            .profiles
            .load_profile(&self.subject_id)
            .await
            .map_err(OrchestratorError::ProfileSource)?
            .filter(|p| !p.is_empty())
            .ok_or_else(|| OrchestratorError::ProfileMissing(self.subject_id.clone()))?;
        let keywords = self
            .profiles
            .load_selected_keywords(&self.subject_id)
            .await
            .map_err(OrchestratorError::ProfileSource)?
            .filter(|k| !k.is_empty())
            .ok_or_else(|| OrchestratorError::KeywordsMissing(self.subject_id.clone()))?;

        if let Some(ui) = &self.ui {
            let business = profile.get("business_name").and_then(|v| v.as_str());
            ui.print_header(&self.subject_id, business, keywords.len());
        }
        m.start_workflow(keywords, profile)?;
        self.run_sequence(m, &PhaseId::ALL).await
    }

    async fn continue_run(
        &self,
        m: &mut WorkflowStateManager,
        start: PhaseId,
        phases: &[PhaseId],
    ) -> Result<(), OrchestratorError> {
        let state = m.state();
        if !state.has_inputs() {
            if start == PhaseId::first() {
                if phases.len() == PhaseId::COUNT {
                    return self.fresh_run(m).await;
                }
                return Err(OrchestratorError::NotStarted(self.subject_id.clone()));
            }
            return Err(OrchestratorError::MissingPredecessor {
                phase: start,
                missing: PhaseId::first(),
            });
        }
        if let Some(missing) = start
            .predecessors()
            .iter()
            .copied()
            .find(|p| !state.is_completed(*p))
        {
            return Err(OrchestratorError::MissingPredecessor {
                phase: start,
                missing,
            });
        }
        if state.is_completed(start) {
            return Err(StateError::AlreadyCompleted(start).into());
        }

        let completed = state.completed_phases().len();
        m.resume()?;
        if let Some(ui) = &self.ui {
            ui.resuming(start, completed);
        }
        self.run_sequence(m, phases).await
    }

    async fn run_sequence(
        &self,
        m: &mut WorkflowStateManager,
        phases: &[PhaseId],
    ) -> Result<(), OrchestratorError> {
        for &phase in phases {
            self.run_phase(m, phase).await?;
        }
        if m.state().all_completed() {
            m.mark_complete()?;
        }
        Ok(())
    }

    async fn run_phase(
        &self,
        m: &mut WorkflowStateManager,
        phase: PhaseId,
    ) -> Result<(), OrchestratorError> {
        m.begin_phase(phase)?;
        if let Some(ui) = &self.ui {
            ui.start_phase(phase, !self.registry.is_implemented(phase));
        }

        let input = m.create_phase_input(phase);
        let output = self.registry.execute(phase, input).await;

        if output.is_success() {
            if let Some(ui) = &self.ui {
                ui.phase_complete(&output);
            }
            m.complete_phase(output)?;
            Ok(())
        } else {
            let message = output.error().unwrap_or("unknown error").to_string();
            if let Some(ui) = &self.ui {
                ui.phase_failed(phase, &message);
            }
            m.record_failure(output)?;
            Err(OrchestratorError::PhaseFailed { phase, message })
        }
    }

    /// Record the outcome on the state, write the report and build results.
    fn conclude(
        &self,
        m: &mut WorkflowStateManager,
        outcome: Result<(), OrchestratorError>,
        write_report: bool,
    ) -> FinalResults {
        if let Err(err) = outcome {
            let message = err.to_string();
            match m.mark_failed(message.clone()) {
                Ok(()) => {}
                Err(StateError::InvalidTransition { from, .. }) => {
                    // A finished run is never reopened by a bad request.
                    warn!(subject = %self.subject_id, status = %from, error = %message, "request rejected");
                    let mut results = m.final_results();
                    results.rejected = Some(message);
                    if let Some(ui) = &self.ui {
                        ui.finish(&results, None);
                    }
                    return results;
                }
                Err(e) => {
                    error!(subject = %self.subject_id, error = %e, "failed to record workflow failure");
                }
            }
        }

        let results = m.final_results();
        let report = if write_report && results.status().is_terminal() {
            self.save_report(&results)
        } else {
            None
        };
        if let Some(ui) = &self.ui {
            ui.finish(&results, report.as_deref());
        }
        results
    }

    fn save_report(&self, results: &FinalResults) -> Option<PathBuf> {
        match self
            .reports
            .save_report(&self.subject_id, Utc::now(), results)
        {
            Ok(path) => {
                info!(subject = %self.subject_id, path = %path.display(), "report saved");
                Some(path)
            }
            Err(e) => {
                error!(subject = %self.subject_id, error = %e, "failed to save report");
                None
            }
        }
    }
}

/// Exclusive hold on one subject for the duration of a request.
struct Session {
    manager: OwnedMutexGuard<WorkflowStateManager>,
    _lock: RunLock,
}

/// What a request asks the driver to do.
#[derive(Debug, Clone, Copy)]
enum Plan {
    Fresh,
    From(PhaseId),
    Only(PhaseId),
    Finished,
}
