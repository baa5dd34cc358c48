//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module   | Commands handled                      |
//! |----------|---------------------------------------|
//! | `run`    | `Run`, `Resume`, `From`, `Phase`      |
//! | `status` | `Status`, `Phases`, `Reports`         |
//! | `chain`  | `Chain`                               |
//! | `config` | `Config`                              |

pub mod chain;
pub mod config;
pub mod run;
pub mod status;

pub use chain::{ChainArgs, cmd_chain};
pub use config::cmd_config;
pub use run::{RunMode, run_workflow};
pub use status::{cmd_phases, cmd_reports, cmd_status};
