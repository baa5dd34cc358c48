pub mod chain;
pub mod config;
pub mod errors;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod profile;
pub mod registry;
pub mod ui;

pub use pipeline::Pipeline;
pub use seoflow_common::{PhaseHandler, PhaseId, PhaseInput, PhaseOutput, Profile};
