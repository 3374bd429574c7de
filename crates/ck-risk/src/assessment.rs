// assessment.rs — Risk assessment output types.
//
// A RiskAssessment is produced once per kernel invocation and never mutated
// afterwards. The tier is always derived from the final score, so a caller
// cannot construct an assessment whose tier disagrees with its score.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse risk band used by the policy engine.
///
/// Variants are declared from least to most severe so the derived `Ord`
/// gives `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    /// Score 0–20.
    Low,
    /// Score 21–50.
    Medium,
    /// Score 51–75.
    High,
    /// Score 76–100.
    Critical,
}

impl RiskTier {
    /// All tiers, least severe first.
    pub const ALL: [RiskTier; 4] = [
        RiskTier::Low,
        RiskTier::Medium,
        RiskTier::High,
        RiskTier::Critical,
    ];

    /// Map a score to its tier band. Scores above 100 are treated as critical.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=20 => RiskTier::Low,
            21..=50 => RiskTier::Medium,
            51..=75 => RiskTier::High,
            _ => RiskTier::Critical,
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskTier::Low => write!(f, "low"),
            RiskTier::Medium => write!(f, "medium"),
            RiskTier::High => write!(f, "high"),
            RiskTier::Critical => write!(f, "critical"),
        }
    }
}

/// One of the six independently scored risk dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskDimension {
    FinancialImpact,
    ExternalExposure,
    DataSensitivity,
    SystemMutation,
    Reversibility,
    Scope,
}

impl fmt::Display for RiskDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskDimension::FinancialImpact => "financial_impact",
            RiskDimension::ExternalExposure => "external_exposure",
            RiskDimension::DataSensitivity => "data_sensitivity",
            RiskDimension::SystemMutation => "system_mutation",
            RiskDimension::Reversibility => "reversibility",
            RiskDimension::Scope => "scope",
        };
        write!(f, "{}", name)
    }
}

/// Per-dimension scores, each in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RiskDimensions {
    pub financial_impact: u8,
    pub external_exposure: u8,
    pub data_sensitivity: u8,
    pub system_mutation: u8,
    pub reversibility: u8,
    pub scope: u8,
}

impl RiskDimensions {
    /// Score for a single dimension.
    pub fn get(&self, dimension: RiskDimension) -> u8 {
        match dimension {
            RiskDimension::FinancialImpact => self.financial_impact,
            RiskDimension::ExternalExposure => self.external_exposure,
            RiskDimension::DataSensitivity => self.data_sensitivity,
            RiskDimension::SystemMutation => self.system_mutation,
            RiskDimension::Reversibility => self.reversibility,
            RiskDimension::Scope => self.scope,
        }
    }
}

/// Why part of the score was assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskReason {
    /// Dimension the rule scored.
    pub dimension: RiskDimension,
    /// Human-readable explanation.
    pub description: String,
    /// Points this rule added to its dimension score. For the
    /// irreversibility penalty, points added to the total score.
    pub score_contribution: u8,
}

/// Result of a risk assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Weighted dimension total before the irreversibility penalty.
    pub base_score: u8,
    /// Final score in `0..=100` (base plus any penalty, clamped).
    pub score: u8,
    /// Tier derived from `score`.
    pub tier: RiskTier,
    /// Rules that fired, in evaluation order.
    pub reasons: Vec<RiskReason>,
    /// The six dimension scores.
    pub dimensions: RiskDimensions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_band_edges() {
        assert_eq!(RiskTier::from_score(0), RiskTier::Low);
        assert_eq!(RiskTier::from_score(20), RiskTier::Low);
        assert_eq!(RiskTier::from_score(21), RiskTier::Medium);
        assert_eq!(RiskTier::from_score(50), RiskTier::Medium);
        assert_eq!(RiskTier::from_score(51), RiskTier::High);
        assert_eq!(RiskTier::from_score(75), RiskTier::High);
        assert_eq!(RiskTier::from_score(76), RiskTier::Critical);
        assert_eq!(RiskTier::from_score(100), RiskTier::Critical);
        assert_eq!(RiskTier::from_score(u8::MAX), RiskTier::Critical);
    }

    #[test]
    fn every_score_lands_in_exactly_one_band() {
        let mut previous = RiskTier::Low;
        for score in 0..=100u8 {
            let tier = RiskTier::from_score(score);
            // Bands are contiguous and never go backwards.
            assert!(tier >= previous, "tier regressed at score {}", score);
            previous = tier;
        }
    }

    #[test]
    fn tiers_are_ordered_by_severity() {
        assert!(RiskTier::Low < RiskTier::Medium);
        assert!(RiskTier::Medium < RiskTier::High);
        assert!(RiskTier::High < RiskTier::Critical);
    }

    #[test]
    fn tier_serializes_as_snake_case() {
        let json = serde_json::to_string(&RiskTier::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        let json = serde_json::to_string(&RiskDimension::FinancialImpact).unwrap();
        assert_eq!(json, "\"financial_impact\"");
    }
}
