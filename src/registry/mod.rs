//! Phase registry: resolves a [`PhaseId`] to the handler that implements it.
//!
//! Absence is a typed branch ([`Resolution::NotImplemented`]), not a fault.
//! [`PhaseRegistry::execute`] turns it into the deterministic degraded
//! output from [`fallback`], so downstream phases can keep going on
//! synthetic data.

pub mod fallback;
pub mod gap;

use futures::FutureExt;
use seoflow_common::{PhaseHandler, PhaseId, PhaseInput, PhaseOutput};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info};

pub use gap::GapClassifier;

/// Outcome of looking a phase up in the registry.
#[derive(Clone)]
pub enum Resolution {
    Implemented(Arc<dyn PhaseHandler>),
    NotImplemented,
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Implemented(h) => write!(f, "Implemented({})", h.phase()),
            Resolution::NotImplemented => f.write_str("NotImplemented"),
        }
    }
}

#[derive(Clone, Default)]
pub struct PhaseRegistry {
    handlers: HashMap<PhaseId, Arc<dyn PhaseHandler>>,
}

impl PhaseRegistry {
    /// An empty registry: every phase runs in degraded mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the handlers that ship with this crate.
    pub fn with_builtin() -> Self {
        Self::new().with_handler(Arc::new(GapClassifier))
    }

    pub fn with_handler(mut self, handler: Arc<dyn PhaseHandler>) -> Self {
        self.register(handler);
        self
    }

    /// Register a handler under the phase it reports, returning any handler it replaced.
    pub fn register(&mut self, handler: Arc<dyn PhaseHandler>) -> Option<Arc<dyn PhaseHandler>> {
        self.handlers.insert(handler.phase(), handler)
    }

    pub fn resolve(&self, phase: PhaseId) -> Resolution {
        match self.handlers.get(&phase) {
            Some(handler) => Resolution::Implemented(Arc::clone(handler)),
            None => Resolution::NotImplemented,
        }
    }

    pub fn is_implemented(&self, phase: PhaseId) -> bool {
        self.handlers.contains_key(&phase)
    }

    /// Run `phase` on `input`.
    ///
    /// Never fails: a panicking handler or a handler that answers for the
    /// wrong phase yields a failed output, and a missing handler yields the
    /// degraded result.
    pub async fn execute(&self, phase: PhaseId, input: PhaseInput) -> PhaseOutput {
        match self.resolve(phase) {
            Resolution::Implemented(handler) => {
                debug!(%phase, subject = input.subject_id(), "executing phase handler");
                match AssertUnwindSafe(handler.execute(input)).catch_unwind().await {
                    Ok(output) if output.phase() == phase => output,
                    Ok(output) => PhaseOutput::failure(
                        phase,
                        format!("handler for {} returned output for {}", phase, output.phase()),
                    ),
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        error!(%phase, %message, "phase handler panicked");
                        PhaseOutput::failure(phase, format!("handler panicked: {}", message))
                    }
                }
            }
            Resolution::NotImplemented => {
                info!(%phase, "phase not implemented, using degraded output");
                fallback::degraded_output(phase, &input)
            }
        }
    }
}

impl fmt::Debug for PhaseRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut implemented: Vec<_> = self.handlers.keys().copied().collect();
        implemented.sort();
        f.debug_struct("PhaseRegistry")
            .field("implemented", &implemented)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
