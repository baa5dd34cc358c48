//! Ad-hoc phase chains that run outside the persisted workflow.
//!
//! A chain threads each successful output into the next phase's input and
//! stops at the first failure. Nothing is written to the state store.

pub mod patterns;

use seoflow_common::{PhaseId, PhaseInput, PhaseOutput};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::registry::PhaseRegistry;

pub use patterns::{
    ActionItem, ActionReport, AnalysisToActionChain, KeywordInsights, MarketRealityChain,
    MarketRealityReport, Priority, QuickAnalysis, QuickAnalysisChain, QuickInsights,
};

/// Outputs of a chain in execution order. Serializes as a map keyed by phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainResult {
    outputs: Vec<PhaseOutput>,
}

impl ChainResult {
    pub fn get(&self, phase: PhaseId) -> Option<&PhaseOutput> {
        self.outputs.iter().rev().find(|o| o.phase() == phase)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PhaseOutput> {
        self.outputs.iter()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn last(&self) -> Option<&PhaseOutput> {
        self.outputs.last()
    }

    /// First failed output, if the chain stopped early.
    pub fn failure(&self) -> Option<&PhaseOutput> {
        self.outputs.iter().find(|o| !o.is_success())
    }

    pub fn into_outputs(self) -> Vec<PhaseOutput> {
        self.outputs
    }
}

impl Serialize for ChainResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.outputs.len()))?;
        for output in &self.outputs {
            map.serialize_entry(&output.phase(), output)?;
        }
        map.end()
    }
}

#[derive(Clone)]
pub struct ChainExecutor {
    registry: Arc<PhaseRegistry>,
}

impl ChainExecutor {
    pub fn new(registry: Arc<PhaseRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &PhaseRegistry {
        &self.registry
    }

    /// Run `phases` in the order given, starting from `initial`.
    pub async fn execute_chain(&self, phases: &[PhaseId], initial: PhaseInput) -> ChainResult {
        let mut input = initial;
        let mut result = ChainResult::default();

        for &phase in phases {
            debug!(%phase, "chain step");
            let output = self.registry.execute(phase, input.clone()).await;
            let succeeded = output.is_success();
            result.outputs.push(output.clone());
            if !succeeded {
                warn!(%phase, error = output.error().unwrap_or_default(), "chain stopped");
                break;
            }
            input = input.with_previous_output(output);
        }
        result
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown chain '{0}' (valid: market_to_gsc, analysis_to_action, quick_analysis)")]
pub struct UnknownChain(pub String);

/// The predefined chains, selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainKind {
    MarketToGsc,
    AnalysisToAction,
    QuickAnalysis,
}

impl ChainKind {
    pub const ALL: [ChainKind; 3] = [
        ChainKind::MarketToGsc,
        ChainKind::AnalysisToAction,
        ChainKind::QuickAnalysis,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChainKind::MarketToGsc => "market_to_gsc",
            ChainKind::AnalysisToAction => "analysis_to_action",
            ChainKind::QuickAnalysis => "quick_analysis",
        }
    }

    pub fn phases(self) -> &'static [PhaseId] {
        match self {
            ChainKind::MarketToGsc => &[PhaseId::Market, PhaseId::RealityCheck],
            ChainKind::AnalysisToAction => &[PhaseId::GapClassification, PhaseId::Competitors],
            ChainKind::QuickAnalysis => &[
                PhaseId::Market,
                PhaseId::RealityCheck,
                PhaseId::GapClassification,
            ],
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ChainKind::MarketToGsc => "Market analysis then search-console check, with combined insights",
            ChainKind::AnalysisToAction => "Gap classification then competitor research, with action items",
            ChainKind::QuickAnalysis => "Market, search console and gap classification in one pass",
        }
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainKind {
    type Err = UnknownChain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ChainKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| UnknownChain(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use seoflow_common::{PhaseHandler, Profile};
    use serde_json::json;

    struct Failing(PhaseId);

    #[async_trait]
    impl PhaseHandler for Failing {
        fn phase(&self) -> PhaseId {
            self.0
        }

        async fn execute(&self, _input: PhaseInput) -> PhaseOutput {
            PhaseOutput::failure(self.0, "quota exceeded")
        }
    }

    fn input() -> PhaseInput {
        PhaseInput::new("u1", vec!["a".into(), "b".into()], Profile::new())
    }

    #[tokio::test]
    async fn test_chain_threads_outputs_forward() {
        let executor = ChainExecutor::new(Arc::new(PhaseRegistry::with_builtin()));
        let result = executor
            .execute_chain(ChainKind::QuickAnalysis.phases(), input())
            .await;
        assert_eq!(result.len(), 3);
        assert!(result.failure().is_none());
        let order: Vec<PhaseId> = result.iter().map(|o| o.phase()).collect();
        assert_eq!(order, ChainKind::QuickAnalysis.phases());
    }

    #[tokio::test]
    async fn test_chain_stops_at_first_failure() {
        let registry = PhaseRegistry::with_builtin().with_handler(Arc::new(Failing(PhaseId::Market)));
        let executor = ChainExecutor::new(Arc::new(registry));
        let result = executor
            .execute_chain(ChainKind::QuickAnalysis.phases(), input())
            .await;
        assert_eq!(result.len(), 1);
        assert_eq!(result.failure().unwrap().phase(), PhaseId::Market);
        assert!(result.get(PhaseId::RealityCheck).is_none());
    }

    #[tokio::test]
    async fn test_chain_result_serializes_as_ordered_map() {
        let executor = ChainExecutor::new(Arc::new(PhaseRegistry::new()));
        let result = executor
            .execute_chain(ChainKind::MarketToGsc.phases(), input())
            .await;
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["phase2_market"]["success"], json!(true));
        assert!(value.get("phase3_gsc").is_some());
    }

    #[test]
    fn test_chain_kind_parses_names() {
        assert_eq!(
            "quick_analysis".parse::<ChainKind>().unwrap(),
            ChainKind::QuickAnalysis
        );
        assert_eq!(
            "Market-To-GSC".parse::<ChainKind>().unwrap(),
            ChainKind::MarketToGsc
        );
        let err = "nope".parse::<ChainKind>().unwrap_err();
        assert!(err.to_string().contains("quick_analysis"));
    }
}
