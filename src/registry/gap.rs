//! Rule-based gap classification.
//!
//! Buckets each market keyword by search volume and its search-console
//! position:
//!
//! | Ranked? | Rule                                  | Bucket            |
//! |---------|---------------------------------------|-------------------|
//! | no      | volume > 1000                         | `untapped_gold`   |
//! | yes     | position > 10 and volume > 500        | `underperformers` |
//! | either  | anything else                         | `low_priority`    |

use async_trait::async_trait;
use seoflow_common::{PhaseHandler, PhaseId, PhaseInput, PhaseOutput};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

/// Volume above which an unranked keyword is untapped gold.
pub const UNTAPPED_MIN_VOLUME: f64 = 1000.0;
/// Volume above which a poorly ranked keyword counts as underperforming.
pub const UNDERPERFORMER_MIN_VOLUME: f64 = 500.0;
/// Positions at or above this are on the first results page.
pub const FIRST_PAGE_POSITION: f64 = 10.0;
/// Position assumed when a ranking row carries none.
pub const UNRANKED_POSITION: f64 = 100.0;

/// One row of the market-analysis `keyword_data` payload.
///
/// Any JSON number (or numeric string) is a volume; missing or null is 0.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketRow {
    pub keyword: String,
    #[serde(default, deserialize_with = "volume")]
    pub avg_monthly_searches: f64,
}

/// One row of the reality-check `gsc_data` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RankRow {
    pub keyword: String,
    #[serde(default = "unranked_position", deserialize_with = "position")]
    pub position: f64,
}

fn unranked_position() -> f64 {
    UNRANKED_POSITION
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn volume<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(as_number).unwrap_or(0.0))
}

fn position<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(as_number).unwrap_or(UNRANKED_POSITION))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub untapped_gold: Vec<String>,
    pub underperformers: Vec<String>,
    pub low_priority: Vec<String>,
}

impl Classification {
    pub fn total(&self) -> usize {
        self.untapped_gold.len() + self.underperformers.len() + self.low_priority.len()
    }
}

#[derive(Debug, Error)]
pub enum GapInputError {
    #[error("Missing data from market analysis or reality check")]
    MissingUpstream,

    #[error("Malformed {phase} payload: `{field}` is not a list")]
    Malformed { phase: PhaseId, field: String },
}

pub fn classify(market: &[MarketRow], ranks: &[RankRow]) -> Classification {
    let ranked: HashMap<&str, &RankRow> = ranks.iter().map(|r| (r.keyword.as_str(), r)).collect();
    let mut out = Classification::default();

    for row in market {
        let volume = row.avg_monthly_searches;
        let bucket = match ranked.get(row.keyword.as_str()) {
            Some(rank) if rank.position > FIRST_PAGE_POSITION && volume > UNDERPERFORMER_MIN_VOLUME => {
                &mut out.underperformers
            }
            None if volume > UNTAPPED_MIN_VOLUME => &mut out.untapped_gold,
            _ => &mut out.low_priority,
        };
        bucket.push(row.keyword.clone());
    }

    out
}

/// Parse a list-valued field of an upstream payload row by row.
///
/// A missing or null field is an empty list; anything else that isn't a
/// list is malformed. Rows that fail to parse are skipped with a warning.
pub(crate) fn rows<T: DeserializeOwned>(
    phase: PhaseId,
    data: &Value,
    field: &str,
) -> Result<Vec<T>, GapInputError> {
    let items = match data.get(field) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(GapInputError::Malformed {
                phase,
                field: field.to_string(),
            });
        }
    };

    let mut parsed = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match T::deserialize(item) {
            Ok(row) => parsed.push(row),
            Err(e) => warn!(%phase, field, index, error = %e, "skipping malformed row"),
        }
    }
    Ok(parsed)
}

/// Classify the market and reality-check payloads carried by `input`.
pub fn classify_input(input: &PhaseInput) -> Result<Classification, GapInputError> {
    let (Some(market), Some(gsc)) = (
        input.previous_data(PhaseId::Market),
        input.previous_data(PhaseId::RealityCheck),
    ) else {
        return Err(GapInputError::MissingUpstream);
    };

    let market_rows: Vec<MarketRow> = rows(PhaseId::Market, market, "keyword_data")?;
    let rank_rows: Vec<RankRow> = rows(PhaseId::RealityCheck, gsc, "gsc_data")?;
    Ok(classify(&market_rows, &rank_rows))
}

/// The gap-classification payload shape downstream phases read.
pub fn payload(classification: &Classification) -> Value {
    json!({
        "classified_keywords": classification,
        "untapped_gold": classification.untapped_gold,
        "underperformers": classification.underperformers,
        "low_priority": classification.low_priority,
        "total_classified": classification.total(),
    })
}

/// Built-in gap-classification phase.
pub struct GapClassifier;

#[async_trait]
impl PhaseHandler for GapClassifier {
    fn phase(&self) -> PhaseId {
        PhaseId::GapClassification
    }

    async fn execute(&self, input: PhaseInput) -> PhaseOutput {
        let result = classify_input(&input).map(|c| {
            tracing::info!(
                untapped_gold = c.untapped_gold.len(),
                underperformers = c.underperformers.len(),
                low_priority = c.low_priority.len(),
                "classified keywords"
            );
            payload(&c)
        });
        PhaseOutput::from_result(self.phase(), result)
    }
}
