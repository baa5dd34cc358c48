pub mod cache;
pub mod manager;
pub mod runner;
pub mod state;
pub mod store;

pub use cache::{ManagerCache, ManagerHandle};
pub use manager::{FinalResults, WorkflowStateManager, WorkflowSummary};
pub use runner::Orchestrator;
pub use state::{WorkflowState, WorkflowStatus};
pub use store::{FileStore, ReportStore, RunLock, StateStore, SubjectLock, subject_key};
