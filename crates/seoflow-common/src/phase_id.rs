use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of one canonical pipeline phase.
///
/// Variants are declared in canonical order, so the derived `Ord` is the
/// execution order. The serialized form is the stable wire name used in
/// persisted workflow records (e.g. `"phase2_market"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PhaseId {
    /// Keyword tuning: refines the onboarding keyword selection
    #[serde(rename = "phase1_tuning")]
    Tuning,
    /// Market analysis: search volume, CPC and competition per keyword
    #[serde(rename = "phase2_market")]
    Market,
    /// Search-console reality check: current rankings for the site
    #[serde(rename = "phase3_gsc")]
    RealityCheck,
    /// Gap classification into strategy buckets
    #[serde(rename = "phase4_gap_analysis")]
    GapClassification,
    /// Competitive intelligence for the untapped keywords
    #[serde(rename = "phase5_competitors")]
    Competitors,
}

/// Error returned when a string does not name a canonical phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown phase '{0}'. Valid phases: {valid}", valid = PhaseId::wire_names())]
pub struct UnknownPhase(pub String);

impl PhaseId {
    /// All phases in canonical order.
    pub const ALL: [PhaseId; 5] = [
        PhaseId::Tuning,
        PhaseId::Market,
        PhaseId::RealityCheck,
        PhaseId::GapClassification,
        PhaseId::Competitors,
    ];

    /// Number of canonical phases.
    pub const COUNT: usize = Self::ALL.len();

    pub fn as_str(self) -> &'static str {
        match self {
            PhaseId::Tuning => "phase1_tuning",
            PhaseId::Market => "phase2_market",
            PhaseId::RealityCheck => "phase3_gsc",
            PhaseId::GapClassification => "phase4_gap_analysis",
            PhaseId::Competitors => "phase5_competitors",
        }
    }

    /// Human-readable phase title.
    pub fn title(self) -> &'static str {
        match self {
            PhaseId::Tuning => "Keyword Tuning",
            PhaseId::Market => "Market Analysis",
            PhaseId::RealityCheck => "GSC Reality Check",
            PhaseId::GapClassification => "Gap Analysis",
            PhaseId::Competitors => "Competitor Intelligence",
        }
    }

    /// Zero-based position in canonical order.
    pub fn index(self) -> usize {
        match self {
            PhaseId::Tuning => 0,
            PhaseId::Market => 1,
            PhaseId::RealityCheck => 2,
            PhaseId::GapClassification => 3,
            PhaseId::Competitors => 4,
        }
    }

    /// One-based phase number, as shown to users.
    pub fn number(self) -> usize {
        self.index() + 1
    }

    pub fn first() -> PhaseId {
        Self::ALL[0]
    }

    pub fn is_last(self) -> bool {
        self.index() + 1 == Self::COUNT
    }

    /// The canonical successor, or `None` for the final phase.
    pub fn next(self) -> Option<PhaseId> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Phases that precede this one in canonical order.
    pub fn predecessors(self) -> &'static [PhaseId] {
        &Self::ALL[..self.index()]
    }

    /// This phase and every phase after it, in canonical order.
    pub fn suffix_from(self) -> &'static [PhaseId] {
        &Self::ALL[self.index()..]
    }

    fn wire_names() -> String {
        Self::ALL
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseId {
    type Err = UnknownPhase;

    /// Accepts the wire name (`phase3_gsc`) or a short alias (`gsc`, `reality_check`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "phase1_tuning" | "tuning" | "1" => Ok(PhaseId::Tuning),
            "phase2_market" | "market" | "2" => Ok(PhaseId::Market),
            "phase3_gsc" | "gsc" | "reality_check" | "3" => Ok(PhaseId::RealityCheck),
            "phase4_gap_analysis" | "gap_analysis" | "gap_classification" | "gap" | "4" => {
                Ok(PhaseId::GapClassification)
            }
            "phase5_competitors" | "competitors" | "5" => Ok(PhaseId::Competitors),
            _ => Err(UnknownPhase(s.to_string())),
        }
    }
}
