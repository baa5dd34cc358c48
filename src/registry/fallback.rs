//! Deterministic degraded outputs for phases with no registered handler.
//!
//! Each payload has the same shape the real phase produces plus a `note`
//! field, so later phases can run on it unchanged.

use seoflow_common::{PhaseId, PhaseInput, PhaseOutput, string_list};
use serde_json::{Map, Value, json};

use super::gap;

/// Volume reported for every keyword by the degraded market phase.
pub const MOCK_SEARCH_VOLUME: u64 = 1000;
/// Position reported for every ranked keyword by the degraded reality check.
pub const MOCK_POSITION: f64 = 15.5;
/// Untapped keywords the degraded competitor phase looks at.
pub const MOCK_COMPETITOR_KEYWORDS: usize = 5;
/// Example result pages produced per keyword by the degraded competitor phase.
pub const MOCK_PAGES_PER_KEYWORD: usize = 3;

pub fn degraded_output(phase: PhaseId, input: &PhaseInput) -> PhaseOutput {
    match phase {
        PhaseId::Tuning => PhaseOutput::success(phase, annotate(phase, tuning(input))),
        PhaseId::Market => PhaseOutput::success(phase, annotate(phase, market(input))),
        PhaseId::RealityCheck => PhaseOutput::success(phase, annotate(phase, reality_check(input))),
        PhaseId::GapClassification => match gap::classify_input(input) {
            Ok(c) => PhaseOutput::success(phase, annotate(phase, gap::payload(&c))),
            Err(e) => PhaseOutput::failure(phase, e.to_string()),
        },
        PhaseId::Competitors => match competitors(input) {
            Some(data) => PhaseOutput::success(phase, annotate(phase, data)),
            None => PhaseOutput::failure(phase, "Missing data from gap analysis"),
        },
    }
}

fn annotate(phase: PhaseId, mut data: Value) -> Value {
    if let Value::Object(map) = &mut data {
        map.insert(
            "note".to_string(),
            Value::String(format!("{} not yet implemented - degraded output", phase.title())),
        );
    }
    data
}

fn tuning(input: &PhaseInput) -> Value {
    json!({
        "final_keywords": input.keywords(),
        "removed_keywords": [],
        "added_keywords": [],
        "refinement_notes": "",
    })
}

fn market(input: &PhaseInput) -> Value {
    let keywords = input.working_keywords();
    let keyword_data: Vec<Value> = keywords
        .iter()
        .map(|kw| {
            json!({
                "keyword": kw,
                "avg_monthly_searches": MOCK_SEARCH_VOLUME,
                "competition": "MEDIUM",
                "low_top_of_page_bid_micros": 1_000_000,
                "high_top_of_page_bid_micros": 3_000_000,
            })
        })
        .collect();
    let avg = if keyword_data.is_empty() {
        0
    } else {
        MOCK_SEARCH_VOLUME
    };

    json!({
        "total_keywords": keyword_data.len(),
        "keyword_data": keyword_data,
        "avg_search_volume": avg,
    })
}

fn reality_check(input: &PhaseInput) -> Value {
    let keywords = input.working_keywords();
    // Only the first half of the keywords rank.
    let gsc_data: Vec<Value> = keywords[..keywords.len() / 2]
        .iter()
        .map(|kw| {
            json!({
                "keyword": kw,
                "impressions": 100,
                "clicks": 5,
                "position": MOCK_POSITION,
                "ctr": 0.05,
            })
        })
        .collect();
    let ranked = gsc_data.len();
    let avg_position = if ranked > 0 { MOCK_POSITION } else { 0.0 };

    json!({
        "gsc_data": gsc_data,
        "site_url": input.profile_str("website_url").unwrap_or_default(),
        "total_keywords_checked": keywords.len(),
        "keywords_with_rankings": ranked,
        "avg_position": avg_position,
        "total_impressions": ranked * 100,
        "total_clicks": ranked * 5,
    })
}

fn competitors(input: &PhaseInput) -> Option<Value> {
    let gap_data = input.previous_data(PhaseId::GapClassification)?;
    let untapped = gap_data
        .get("untapped_gold")
        .and_then(string_list)
        .unwrap_or_default();

    let mut competitor_data = Map::new();
    for kw in untapped.iter().take(MOCK_COMPETITOR_KEYWORDS) {
        let top_urls: Vec<Value> = (1..=MOCK_PAGES_PER_KEYWORD)
            .map(|i| {
                json!({
                    "url": format!("https://example.com/page-{}", i),
                    "title": format!("Example Title {}", i),
                    "description": format!("Example description for {}", kw),
                })
            })
            .collect();
        competitor_data.insert(kw.clone(), json!({ "keyword": kw, "top_urls": top_urls }));
    }
    let analyzed = competitor_data.len();

    Some(json!({
        "competitor_data": competitor_data,
        "keywords_analyzed": analyzed,
        "total_urls_scraped": analyzed * MOCK_PAGES_PER_KEYWORD,
    }))
}
