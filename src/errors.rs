//! Typed error hierarchy for the seoflow pipeline.
//!
//! One enum per subsystem:
//! - `StoreError` — reading and writing persisted state and reports
//! - `StateError` — workflow state invariant violations
//! - `OrchestratorError` — run-level failures recorded as a failed run
//! - `ChainError` — ad-hoc chain composition failures

use seoflow_common::{PhaseId, UnknownPhase};
use std::path::PathBuf;
use thiserror::Error;

use crate::orchestrator::state::WorkflowStatus;

/// Errors from the persistence boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt record at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid workflow state at {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    #[error("Failed to serialize record: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Subject {subject} is locked by another process")]
    Locked { subject: String },
}

/// Violations of workflow state invariants.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Phase {0} is already completed")]
    AlreadyCompleted(PhaseId),

    #[error("Output for {0} is a failure and cannot complete the phase")]
    FailedOutput(PhaseId),

    #[error("Workflow is {0}, not running")]
    NotRunning(WorkflowStatus),

    #[error("Invalid workflow transition from {from} to {to}")]
    InvalidTransition {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },

    #[error("Workflow cannot complete: {} phase(s) outstanding", .missing.len())]
    Incomplete { missing: Vec<PhaseId> },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Run-level failures. The orchestrator records these as the workflow's
/// top-level error instead of returning them to the caller.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Profile not found for user: {0}")]
    ProfileMissing(String),

    #[error("No keywords found for user: {0}")]
    KeywordsMissing(String),

    #[error("No workflow has been started for user: {0}")]
    NotStarted(String),

    #[error(transparent)]
    UnknownPhase(#[from] UnknownPhase),

    #[error("Cannot start at {phase}: predecessor {missing} has not completed")]
    MissingPredecessor { phase: PhaseId, missing: PhaseId },

    /// Top-level form of a failed phase: `"<message> at <phase>"`.
    #[error("{message} at {phase}")]
    PhaseFailed { phase: PhaseId, message: String },

    #[error("A run is already in progress for user: {0}")]
    RunInProgress(String),

    #[error("Profile source error: {0}")]
    ProfileSource(#[source] anyhow::Error),

    #[error(transparent)]
    State(#[from] StateError),
}

impl From<StoreError> for OrchestratorError {
    fn from(err: StoreError) -> Self {
        OrchestratorError::State(StateError::Store(err))
    }
}

/// Errors from the chain composition patterns.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("{phase} failed: {message}")]
    PhaseFailed { phase: PhaseId, message: String },

    #[error("Chain stopped before {0} ran")]
    MissingOutput(PhaseId),
}
