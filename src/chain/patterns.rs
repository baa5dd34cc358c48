//! Predefined chains that combine phase outputs into derived views.

use seoflow_common::{PhaseId, PhaseInput, PhaseOutput, Profile, string_list};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

use super::{ChainExecutor, ChainKind, ChainResult};
use crate::errors::ChainError;
use crate::registry::gap::{MarketRow, RankRow, rows};

/// Volume above which a keyword counts as high-volume.
pub const HIGH_VOLUME: f64 = 1000.0;
/// Volume below which a keyword counts as low-volume.
pub const LOW_VOLUME: f64 = 500.0;
/// Positions better than this are on the first page.
pub const STRONG_POSITION: f64 = 10.0;
/// Positions better than this are within striking distance.
pub const PROMISING_POSITION: f64 = 20.0;
/// Untapped keywords turned into high-priority actions.
pub const HIGH_PRIORITY_LIMIT: usize = 5;
/// Underperformers turned into medium-priority actions.
pub const MEDIUM_PRIORITY_LIMIT: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordVolume {
    pub keyword: String,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedKeyword {
    pub keyword: String,
    pub volume: f64,
    pub position: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordInsights {
    pub high_volume_no_rank: Vec<KeywordVolume>,
    pub low_volume_high_rank: Vec<RankedKeyword>,
    pub potential_winners: Vec<RankedKeyword>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRealityReport {
    pub market_data: Value,
    pub gsc_data: Value,
    pub combined_insights: KeywordInsights,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub priority: Priority,
    pub keyword: String,
    pub action: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competitor_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionReport {
    pub gap_analysis: Value,
    pub competitor_data: Value,
    pub action_items: Vec<ActionItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickInsights {
    pub untapped_opportunities: usize,
    pub underperformers: usize,
    pub total_keywords: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickAnalysis {
    pub quick_insights: QuickInsights,
    pub full_results: BTreeMap<PhaseId, Value>,
}

/// The successful output for `phase`, or why the chain has none.
fn require(result: &ChainResult, phase: PhaseId) -> Result<&PhaseOutput, ChainError> {
    match result.get(phase) {
        Some(output) if output.is_success() => Ok(output),
        Some(output) => Err(ChainError::PhaseFailed {
            phase,
            message: output.error().unwrap_or("unknown error").to_string(),
        }),
        None => match result.failure() {
            Some(failed) => Err(ChainError::PhaseFailed {
                phase: failed.phase(),
                message: failed.error().unwrap_or("unknown error").to_string(),
            }),
            None => Err(ChainError::MissingOutput(phase)),
        },
    }
}

fn list_field<T: serde::de::DeserializeOwned>(
    phase: PhaseId,
    data: &Value,
    field: &str,
) -> Vec<T> {
    rows(phase, data, field).unwrap_or_else(|e| {
        warn!(error = %e, "ignoring payload");
        Vec::new()
    })
}

/// Compare market volume with actual rankings.
pub fn keyword_insights(market_data: &Value, gsc_data: &Value) -> KeywordInsights {
    let market: Vec<MarketRow> = list_field(PhaseId::Market, market_data, "keyword_data");
    let ranks: Vec<RankRow> = list_field(PhaseId::RealityCheck, gsc_data, "gsc_data");
    let positions: HashMap<&str, f64> = ranks
        .iter()
        .map(|r| (r.keyword.as_str(), r.position))
        .collect();

    let mut insights = KeywordInsights::default();
    for row in &market {
        let volume = row.avg_monthly_searches;
        match positions.get(row.keyword.as_str()).copied() {
            Some(position) => {
                let ranked = RankedKeyword {
                    keyword: row.keyword.clone(),
                    volume,
                    position,
                };
                if volume < LOW_VOLUME && position < STRONG_POSITION {
                    insights.low_volume_high_rank.push(ranked);
                } else if volume > HIGH_VOLUME && position < PROMISING_POSITION {
                    insights.potential_winners.push(ranked);
                }
            }
            None if volume > HIGH_VOLUME => insights.high_volume_no_rank.push(KeywordVolume {
                keyword: row.keyword.clone(),
                volume,
            }),
            None => {}
        }
    }
    insights
}

/// Turn gap buckets and competitor research into prioritized actions.
pub fn action_items(gap_data: &Value, competitor_data: &Value) -> Vec<ActionItem> {
    let untapped = gap_data
        .get("untapped_gold")
        .and_then(string_list)
        .unwrap_or_default();
    let underperformers = gap_data
        .get("underperformers")
        .and_then(string_list)
        .unwrap_or_default();

    let mut items = Vec::new();
    for keyword in untapped.into_iter().take(HIGH_PRIORITY_LIMIT) {
        let urls = competitor_data
            .get(&keyword)
            .and_then(|c| c.get("top_urls"))
            .and_then(Value::as_array);
        let example_url = urls
            .and_then(|u| u.first())
            .and_then(|u| u.get("url"))
            .and_then(Value::as_str)
            .map(str::to_string);
        items.push(ActionItem {
            priority: Priority::High,
            keyword,
            action: "Create content targeting this keyword".to_string(),
            reason: "High search volume with no current ranking".to_string(),
            competitor_count: Some(urls.map(Vec::len).unwrap_or(0)),
            example_url,
        });
    }
    for keyword in underperformers.into_iter().take(MEDIUM_PRIORITY_LIMIT) {
        items.push(ActionItem {
            priority: Priority::Medium,
            keyword,
            action: "Optimize existing content".to_string(),
            reason: "Currently ranking but underperforming".to_string(),
            competitor_count: None,
            example_url: None,
        });
    }
    items
}

/// Market analysis followed by the search-console check.
pub struct MarketRealityChain {
    executor: ChainExecutor,
}

impl MarketRealityChain {
    pub fn new(executor: ChainExecutor) -> Self {
        Self { executor }
    }

    pub async fn execute(
        &self,
        subject_id: &str,
        keywords: Vec<String>,
        profile: Profile,
    ) -> Result<MarketRealityReport, ChainError> {
        let input = PhaseInput::new(subject_id, keywords, profile);
        let result = self
            .executor
            .execute_chain(ChainKind::MarketToGsc.phases(), input)
            .await;

        let market = require(&result, PhaseId::Market)?.data().clone();
        let gsc = require(&result, PhaseId::RealityCheck)?.data().clone();
        let combined_insights = keyword_insights(&market, &gsc);
        info!(
            subject = subject_id,
            high_volume_no_rank = combined_insights.high_volume_no_rank.len(),
            potential_winners = combined_insights.potential_winners.len(),
            "market/reality chain complete"
        );
        Ok(MarketRealityReport {
            market_data: market,
            gsc_data: gsc,
            combined_insights,
        })
    }
}

/// Gap classification followed by competitor research, seeded with
/// previously gathered market and search-console payloads.
pub struct AnalysisToActionChain {
    executor: ChainExecutor,
}

impl AnalysisToActionChain {
    pub fn new(executor: ChainExecutor) -> Self {
        Self { executor }
    }

    pub async fn execute(
        &self,
        subject_id: &str,
        market_data: Value,
        gsc_data: Value,
    ) -> Result<ActionReport, ChainError> {
        let input = PhaseInput::new(subject_id, Vec::new(), Profile::new())
            .with_previous_output(PhaseOutput::success(PhaseId::Market, market_data))
            .with_previous_output(PhaseOutput::success(PhaseId::RealityCheck, gsc_data));
        let result = self
            .executor
            .execute_chain(ChainKind::AnalysisToAction.phases(), input)
            .await;

        let gap = require(&result, PhaseId::GapClassification)?.data().clone();
        let competitors = require(&result, PhaseId::Competitors)?.data();
        let competitor_data = competitors
            .get("competitor_data")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));
        let action_items = action_items(&gap, &competitor_data);
        info!(
            subject = subject_id,
            actions = action_items.len(),
            "analysis/action chain complete"
        );
        Ok(ActionReport {
            gap_analysis: gap,
            competitor_data,
            action_items,
        })
    }
}

/// Market, search console and gap classification in one pass.
pub struct QuickAnalysisChain {
    executor: ChainExecutor,
}

impl QuickAnalysisChain {
    pub fn new(executor: ChainExecutor) -> Self {
        Self { executor }
    }

    pub async fn execute(
        &self,
        subject_id: &str,
        keywords: Vec<String>,
        profile: Profile,
    ) -> Result<QuickAnalysis, ChainError> {
        let total_keywords = keywords.len();
        let input = PhaseInput::new(subject_id, keywords, profile);
        let result = self
            .executor
            .execute_chain(ChainKind::QuickAnalysis.phases(), input)
            .await;

        let gap = require(&result, PhaseId::GapClassification)?;
        let count = |field: &str| {
            gap.field(field)
                .and_then(string_list)
                .map(|v| v.len())
                .unwrap_or(0)
        };
        let quick_insights = QuickInsights {
            untapped_opportunities: count("untapped_gold"),
            underperformers: count("underperformers"),
            total_keywords,
        };
        let full_results = result
            .iter()
            .map(|o| (o.phase(), o.data().clone()))
            .collect();
        Ok(QuickAnalysis {
            quick_insights,
            full_results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keyword_insights_rules() {
        let market = json!({"keyword_data": [
            {"keyword": "big unranked", "avg_monthly_searches": 5000},
            {"keyword": "small unranked", "avg_monthly_searches": 200},
            {"keyword": "niche top", "avg_monthly_searches": 300},
            {"keyword": "big close", "avg_monthly_searches": 4000},
            {"keyword": "big far", "avg_monthly_searches": 4000},
        ]});
        let gsc = json!({"gsc_data": [
            {"keyword": "niche top", "position": 3.0},
            {"keyword": "big close", "position": 12.0},
            {"keyword": "big far", "position": 45.0},
        ]});
        let insights = keyword_insights(&market, &gsc);
        assert_eq!(
            insights.high_volume_no_rank,
            vec![KeywordVolume {
                keyword: "big unranked".into(),
                volume: 5000.0
            }]
        );
        assert_eq!(insights.low_volume_high_rank.len(), 1);
        assert_eq!(insights.low_volume_high_rank[0].keyword, "niche top");
        assert_eq!(insights.potential_winners.len(), 1);
        assert_eq!(insights.potential_winners[0].position, 12.0);
    }

    #[test]
    fn test_keyword_insights_tolerate_float_and_null_volumes() {
        let market = json!({"keyword_data": [
            {"keyword": "a", "avg_monthly_searches": 5000.0},
            {"keyword": "b", "avg_monthly_searches": 5000},
            {"keyword": "c", "avg_monthly_searches": "5000"},
            {"keyword": "d", "avg_monthly_searches": 5000.5},
            {"keyword": "e", "avg_monthly_searches": null},
            {"avg_monthly_searches": 9000},
        ]});
        let insights = keyword_insights(&market, &json!({"gsc_data": null}));
        let keywords: Vec<&str> = insights
            .high_volume_no_rank
            .iter()
            .map(|k| k.keyword.as_str())
            .collect();
        assert_eq!(keywords, vec!["a", "b", "c", "d"]);
        assert_eq!(insights.high_volume_no_rank[3].volume, 5000.5);
    }

    #[test]
    fn test_keyword_insights_ignore_non_list_payload() {
        let market = json!({"keyword_data": {"keyword": "a"}});
        let insights = keyword_insights(&market, &json!({}));
        assert_eq!(insights, KeywordInsights::default());
    }

    #[test]
    fn test_action_items_prioritize_and_cap() {
        let gap = json!({
            "untapped_gold": ["u1", "u2", "u3", "u4", "u5", "u6"],
            "underperformers": ["p1", "p2", "p3", "p4"],
        });
        let competitors = json!({
            "u1": {"top_urls": [{"url": "https://a.example"}, {"url": "https://b.example"}]},
        });
        let items = action_items(&gap, &competitors);
        assert_eq!(items.len(), 8);
        assert_eq!(items[0].priority, Priority::High);
        assert_eq!(items[0].competitor_count, Some(2));
        assert_eq!(items[0].example_url.as_deref(), Some("https://a.example"));
        assert_eq!(items[1].competitor_count, Some(0));
        assert!(items[1].example_url.is_none());
        assert_eq!(items[5].priority, Priority::Medium);
        assert_eq!(items[5].keyword, "p1");
        assert!(items.iter().all(|i| i.keyword != "u6" && i.keyword != "p4"));
    }

    #[test]
    fn test_priority_serializes_uppercase() {
        assert_eq!(serde_json::to_value(Priority::High).unwrap(), json!("HIGH"));
    }

    #[test]
    fn test_require_reports_upstream_failure() {
        let result = ChainResult {
            outputs: vec![PhaseOutput::failure(PhaseId::Market, "quota")],
        };
        match require(&result, PhaseId::GapClassification).unwrap_err() {
            ChainError::PhaseFailed { phase, message } => {
                assert_eq!(phase, PhaseId::Market);
                assert_eq!(message, "quota");
            }
            other => panic!("Expected PhaseFailed, got {other:?}"),
        }
        assert!(matches!(
            require(&ChainResult::default(), PhaseId::Market),
            Err(ChainError::MissingOutput(PhaseId::Market))
        ));
    }
}
