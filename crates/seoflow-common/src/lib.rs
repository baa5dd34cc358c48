//! Shared domain types for the seoflow pipeline.
//!
//! Everything a phase implementation needs to satisfy the phase contract
//! lives here, so external phase crates can depend on this crate alone:
//! - [`PhaseId`] — the closed set of canonical phases, in canonical order
//! - [`PhaseInput`] / [`PhaseOutput`] — the immutable values threaded between phases
//! - [`PhaseHandler`] — the `execute(input) -> output` contract

pub mod handler;
pub mod io;
pub mod phase_id;

pub use handler::PhaseHandler;
pub use io::{InvalidOutput, PhaseInput, PhaseOutput, Profile, string_list};
pub use phase_id::{PhaseId, UnknownPhase};
