//! Ad-hoc chains — `seoflow chain <kind>`.
//!
//! Chains never touch the persisted workflow. Results are printed as JSON.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;

use seoflow::chain::{AnalysisToActionChain, ChainKind, MarketRealityChain, QuickAnalysisChain};
use seoflow::config::Config;
use seoflow::orchestrator::StateStore;
use seoflow::profile::ProfileSource;
use seoflow::{PhaseId, Pipeline, Profile};

pub struct ChainArgs<'a> {
    pub kind: &'a str,
    pub subject: &'a str,
    pub keywords: &'a [String],
    pub website_url: Option<&'a str>,
    pub market: Option<&'a Path>,
    pub gsc: Option<&'a Path>,
}

pub async fn cmd_chain(config: &Config, args: ChainArgs<'_>) -> Result<()> {
    let kind: ChainKind = args.kind.parse()?;
    let pipeline = Pipeline::from_config(config);
    let executor = pipeline.chains();

    let output = match kind {
        ChainKind::MarketToGsc => {
            let (keywords, profile) = chain_inputs(&pipeline, &args).await?;
            let report = MarketRealityChain::new(executor)
                .execute(args.subject, keywords, profile)
                .await?;
            serde_json::to_value(report)
        }
        ChainKind::QuickAnalysis => {
            let (keywords, profile) = chain_inputs(&pipeline, &args).await?;
            let analysis = QuickAnalysisChain::new(executor)
                .execute(args.subject, keywords, profile)
                .await?;
            serde_json::to_value(analysis)
        }
        ChainKind::AnalysisToAction => {
            let market = seed_payload(&pipeline, args.subject, PhaseId::Market, args.market)?;
            let gsc = seed_payload(&pipeline, args.subject, PhaseId::RealityCheck, args.gsc)?;
            let report = AnalysisToActionChain::new(executor)
                .execute(args.subject, market, gsc)
                .await?;
            serde_json::to_value(report)
        }
    }
    .context("Failed to serialize chain result")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to serialize chain result")?
    );
    Ok(())
}

/// Keywords and profile for chains that start from scratch.
async fn chain_inputs(pipeline: &Pipeline, args: &ChainArgs<'_>) -> Result<(Vec<String>, Profile)> {
    let profiles = pipeline.profiles();
    let mut profile = profiles
        .load_profile(args.subject)
        .await?
        .unwrap_or_default();
    if let Some(url) = args.website_url {
        profile.insert("website_url".to_string(), Value::String(url.to_string()));
    }

    let keywords: Vec<String> = if args.keywords.is_empty() {
        profiles
            .load_selected_keywords(args.subject)
            .await?
            .unwrap_or_default()
    } else {
        args.keywords.to_vec()
    };
    let keywords: Vec<String> = keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();

    if keywords.is_empty() {
        anyhow::bail!(
            "No keywords for {}: pass --keywords or save keywords_selected.json",
            args.subject
        );
    }
    Ok((keywords, profile))
}

/// A seed payload from `file`, else from the subject's persisted run.
fn seed_payload(
    pipeline: &Pipeline,
    subject: &str,
    phase: PhaseId,
    file: Option<&Path>,
) -> Result<Value> {
    if let Some(path) = file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        return serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()));
    }

    let state = pipeline.store().load_state(subject)?;
    state
        .output(phase)
        .map(|o| o.data().clone())
        .with_context(|| {
            format!(
                "No {} output for {}: pass a payload file or run the workflow first",
                phase, subject
            )
        })
}
