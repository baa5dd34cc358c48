use async_trait::async_trait;

use crate::io::{PhaseInput, PhaseOutput};
use crate::phase_id::PhaseId;

/// The contract every phase implementation satisfies.
///
/// Implementations own their retries and rate limits. They must not let a
/// failure escape: external-service errors and malformed responses are
/// turned into [`PhaseOutput::failure`] (see [`PhaseOutput::from_result`]).
#[async_trait]
pub trait PhaseHandler: Send + Sync {
    /// The phase this handler implements.
    fn phase(&self) -> PhaseId;

    async fn execute(&self, input: PhaseInput) -> PhaseOutput;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Profile;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl PhaseHandler for Echo {
        fn phase(&self) -> PhaseId {
            PhaseId::Tuning
        }

        async fn execute(&self, input: PhaseInput) -> PhaseOutput {
            PhaseOutput::success(self.phase(), json!({ "final_keywords": input.keywords() }))
        }
    }

    #[tokio::test]
    async fn test_handler_is_object_safe() {
        let handler: Box<dyn PhaseHandler> = Box::new(Echo);
        let out = handler
            .execute(PhaseInput::new("u1", vec!["a".into()], Profile::new()))
            .await;
        assert!(out.is_success());
        assert_eq!(out.field("final_keywords"), Some(&json!(["a"])));
    }
}
