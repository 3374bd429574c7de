// engine.rs — The risk engine.
//
// Each dimension is scored on its own from the context, the six scores are
// combined by a weighted average, and then the irreversibility penalty is
// applied. Arithmetic is integer-only so the result is bit-for-bit
// reproducible on every platform.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assessment::{RiskAssessment, RiskDimension, RiskDimensions, RiskReason, RiskTier};
use crate::context::{Reversibility, RiskContext};

/// Flat penalty added to the base score for irreversible actions with no
/// rollback mechanism. Binary, not graduated.
pub const IRREVERSIBLE_PENALTY: u8 = 30;

const MAX_SCORE: u8 = 100;

/// The penalty to apply for the given reversibility and rollback availability.
///
/// Shared with the plan builder so a plan's risk score and an assessment's
/// score are modified by exactly the same rule.
pub fn reversibility_modifier(reversibility: Reversibility, has_rollback: bool) -> u8 {
    if reversibility == Reversibility::Irreversible && !has_rollback {
        IRREVERSIBLE_PENALTY
    } else {
        0
    }
}

/// Relative weight of each dimension in the combined score.
///
/// Weights are normalized by their sum, so they need not add up to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskWeights {
    pub financial_impact: u32,
    pub external_exposure: u32,
    pub data_sensitivity: u32,
    pub system_mutation: u32,
    pub reversibility: u32,
    pub scope: u32,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            financial_impact: 25,
            external_exposure: 15,
            data_sensitivity: 20,
            system_mutation: 15,
            reversibility: 15,
            scope: 10,
        }
    }
}

impl RiskWeights {
    fn total(&self) -> u32 {
        self.financial_impact
            + self.external_exposure
            + self.data_sensitivity
            + self.system_mutation
            + self.reversibility
            + self.scope
    }

    /// Weighted average of the dimension scores, rounded to nearest, in `0..=100`.
    fn combine(&self, d: &RiskDimensions) -> u8 {
        let sum = self.total();
        if sum == 0 {
            return 0;
        }
        let weighted = u32::from(d.financial_impact) * self.financial_impact
            + u32::from(d.external_exposure) * self.external_exposure
            + u32::from(d.data_sensitivity) * self.data_sensitivity
            + u32::from(d.system_mutation) * self.system_mutation
            + u32::from(d.reversibility) * self.reversibility
            + u32::from(d.scope) * self.scope;
        let rounded = (weighted + sum / 2) / sum;
        // Every dimension is <= 100, so the average is too.
        u8::try_from(rounded.min(u32::from(MAX_SCORE))).unwrap_or(MAX_SCORE)
    }
}

/// Scores execution contexts. Stateless apart from its weights.
#[derive(Debug, Clone, Default)]
pub struct RiskEngine {
    weights: RiskWeights,
}

impl RiskEngine {
    /// Create an engine with the default weights.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with custom weights.
    pub fn with_weights(weights: RiskWeights) -> Self {
        Self { weights }
    }

    /// The weights this engine combines dimensions with.
    pub fn weights(&self) -> &RiskWeights {
        &self.weights
    }

    /// Assess a context. Pure and deterministic.
    pub fn assess(&self, context: &RiskContext) -> RiskAssessment {
        let mut reasons = Vec::new();

        let dimensions = RiskDimensions {
            financial_impact: score_financial(context, &mut reasons),
            external_exposure: score_exposure(context, &mut reasons),
            data_sensitivity: score_data(context, &mut reasons),
            system_mutation: score_mutation(context, &mut reasons),
            reversibility: score_reversibility(context, &mut reasons),
            scope: score_scope(context, &mut reasons),
        };

        let base_score = self.weights.combine(&dimensions);
        let penalty =
            reversibility_modifier(context.reversibility, context.has_rollback_mechanism);
        if penalty > 0 {
            reasons.push(RiskReason {
                dimension: RiskDimension::Reversibility,
                description: "irreversible action has no rollback path".to_string(),
                score_contribution: penalty,
            });
        }
        let score = base_score.saturating_add(penalty).min(MAX_SCORE);
        let tier = RiskTier::from_score(score);

        debug!(base_score, score, %tier, reasons = reasons.len(), "risk assessed");

        RiskAssessment {
            base_score,
            score,
            tier,
            reasons,
            dimensions,
        }
    }
}

fn reason(dimension: RiskDimension, description: impl Into<String>, points: u8) -> RiskReason {
    RiskReason {
        dimension,
        description: description.into(),
        score_contribution: points,
    }
}

fn score_financial(ctx: &RiskContext, reasons: &mut Vec<RiskReason>) -> u8 {
    let mut score: u8 = 0;
    if ctx.involves_payment {
        score = score.saturating_add(80);
        reasons.push(reason(
            RiskDimension::FinancialImpact,
            "action moves money",
            80,
        ));
    }
    if ctx.involves_credentials {
        score = score.saturating_add(20);
        reasons.push(reason(
            RiskDimension::FinancialImpact,
            "credentials can authorize spending",
            20,
        ));
    }
    score.min(MAX_SCORE)
}

fn score_exposure(ctx: &RiskContext, reasons: &mut Vec<RiskReason>) -> u8 {
    let recipients = match ctx.external_recipient_count {
        0 => 0,
        1 => 40,
        2..=5 => 60,
        _ => 80,
    };
    if recipients > 0 {
        reasons.push(reason(
            RiskDimension::ExternalExposure,
            format!("{} external recipient(s)", ctx.external_recipient_count),
            recipients,
        ));
    }
    let mut score: u8 = recipients;
    if ctx.is_public_share {
        score = score.saturating_add(20);
        reasons.push(reason(
            RiskDimension::ExternalExposure,
            "result is publicly visible",
            20,
        ));
    }
    score.min(MAX_SCORE)
}

fn score_data(ctx: &RiskContext, reasons: &mut Vec<RiskReason>) -> u8 {
    // Strongest category counts in full, each further category adds 10.
    let mut categories: Vec<(u8, &str)> = [
        (ctx.involves_credentials, 90, "credentials or secrets involved"),
        (ctx.involves_health_data, 70, "health data involved"),
        (ctx.involves_personal_data, 40, "personal data involved"),
    ]
    .into_iter()
    .filter(|(applies, _, _)| *applies)
    .map(|(_, points, text)| (points, text))
    .collect();
    categories.sort_by(|a, b| b.0.cmp(&a.0));

    let mut score: u8 = 0;
    for (index, (points, text)) in categories.into_iter().enumerate() {
        let added = if index == 0 { points } else { 10 };
        score = score.saturating_add(added);
        reasons.push(reason(RiskDimension::DataSensitivity, text, added));
    }
    score.min(MAX_SCORE)
}

fn score_mutation(ctx: &RiskContext, reasons: &mut Vec<RiskReason>) -> u8 {
    let strongest = if ctx.is_delete_operation {
        Some((80, "deletes existing data"))
    } else if ctx.modifies_settings {
        Some((60, "changes settings"))
    } else if ctx.writes_state {
        Some((30, "creates or updates persistent state"))
    } else {
        None
    };
    match strongest {
        Some((points, text)) => {
            reasons.push(reason(RiskDimension::SystemMutation, text, points));
            points
        }
        None => 0,
    }
}

fn score_reversibility(ctx: &RiskContext, reasons: &mut Vec<RiskReason>) -> u8 {
    let (points, text) = match (ctx.reversibility, ctx.has_rollback_mechanism) {
        (Reversibility::Reversible, _) => return 0,
        (Reversibility::PartiallyReversible, _) => (40, "only partially reversible"),
        (Reversibility::Irreversible, true) => (60, "irreversible, rollback available"),
        (Reversibility::Irreversible, false) => (100, "irreversible with no rollback mechanism"),
    };
    reasons.push(reason(RiskDimension::Reversibility, text, points));
    points
}

fn score_scope(ctx: &RiskContext, reasons: &mut Vec<RiskReason>) -> u8 {
    let points = match ctx.affected_entity_count {
        0..=1 => 10,
        2..=10 => 40,
        11..=100 => 70,
        _ => 100,
    };
    reasons.push(reason(
        RiskDimension::Scope,
        format!("affects {} entit(ies)", ctx.affected_entity_count),
        points,
    ));
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn critical_context() -> RiskContext {
        RiskContext {
            involves_payment: true,
            involves_credentials: true,
            reversibility: Reversibility::Irreversible,
            has_rollback_mechanism: false,
            ..RiskContext::default()
        }
    }

    #[test]
    fn assessment_is_deterministic() {
        let engine = RiskEngine::new();
        let contexts = vec![
            RiskContext::default(),
            critical_context(),
            RiskContext {
                external_recipient_count: 3,
                involves_personal_data: true,
                involves_health_data: true,
                affected_entity_count: 40,
                ..RiskContext::default()
            },
        ];
        for ctx in contexts {
            let a = engine.assess(&ctx);
            let b = engine.assess(&ctx);
            assert_eq!(a.score, b.score);
            assert_eq!(a.tier, b.tier);
            assert_eq!(a.reasons.len(), b.reasons.len());
            assert_eq!(a, b);
        }
    }

    #[test]
    fn quiet_context_is_low_risk() {
        let engine = RiskEngine::new();
        let ctx = RiskContext {
            writes_state: true,
            ..RiskContext::default()
        };
        let assessment = engine.assess(&ctx);
        assert!(assessment.score <= 20, "score was {}", assessment.score);
        assert_eq!(assessment.tier, RiskTier::Low);
    }

    #[test]
    fn payment_alone_dominates_financial_impact() {
        let engine = RiskEngine::new();
        let ctx = RiskContext {
            involves_payment: true,
            ..RiskContext::default()
        };
        assert!(engine.assess(&ctx).dimensions.financial_impact >= 80);
    }

    #[test]
    fn health_data_alone_dominates_data_sensitivity() {
        let engine = RiskEngine::new();
        let ctx = RiskContext {
            involves_health_data: true,
            ..RiskContext::default()
        };
        assert!(engine.assess(&ctx).dimensions.data_sensitivity >= 70);
    }

    #[test]
    fn irreversible_without_rollback_maxes_reversibility_dimension() {
        let engine = RiskEngine::new();
        let without = engine.assess(&RiskContext {
            reversibility: Reversibility::Irreversible,
            has_rollback_mechanism: false,
            ..RiskContext::default()
        });
        let with = engine.assess(&RiskContext {
            reversibility: Reversibility::Irreversible,
            has_rollback_mechanism: true,
            ..RiskContext::default()
        });
        let partial = engine.assess(&RiskContext {
            reversibility: Reversibility::PartiallyReversible,
            ..RiskContext::default()
        });
        assert_eq!(without.dimensions.reversibility, 100);
        assert!(without.dimensions.reversibility > with.dimensions.reversibility);
        assert!(without.dimensions.reversibility > partial.dimensions.reversibility);
    }

    #[test]
    fn penalty_adds_exactly_thirty_before_tier() {
        let engine = RiskEngine::new();
        let assessment = engine.assess(&critical_context());
        assert_eq!(
            assessment.score,
            assessment.base_score.saturating_add(30).min(100)
        );
        assert_eq!(assessment.tier, RiskTier::from_score(assessment.score));
        assert!(assessment
            .reasons
            .iter()
            .any(|r| r.score_contribution == IRREVERSIBLE_PENALTY
                && r.dimension == RiskDimension::Reversibility
                && r.description.contains("rollback path")));
    }

    #[test]
    fn no_penalty_when_rollback_exists() {
        let engine = RiskEngine::new();
        let assessment = engine.assess(&RiskContext {
            reversibility: Reversibility::Irreversible,
            has_rollback_mechanism: true,
            ..RiskContext::default()
        });
        assert_eq!(assessment.score, assessment.base_score);
    }

    #[test]
    fn penalty_clamps_at_one_hundred() {
        let engine = RiskEngine::new();
        let ctx = RiskContext {
            involves_payment: true,
            involves_credentials: true,
            external_recipient_count: 50,
            is_public_share: true,
            involves_health_data: true,
            involves_personal_data: true,
            is_delete_operation: true,
            reversibility: Reversibility::Irreversible,
            has_rollback_mechanism: false,
            affected_entity_count: 1_000,
            ..RiskContext::default()
        };
        let assessment = engine.assess(&ctx);
        assert!(assessment.base_score > 70);
        assert_eq!(assessment.score, 100);
        assert_eq!(assessment.tier, RiskTier::Critical);
    }

    #[test]
    fn payment_with_credentials_irreversible_is_critical() {
        let assessment = RiskEngine::new().assess(&critical_context());
        assert_eq!(assessment.tier, RiskTier::Critical);
        assert!(assessment.score >= 76, "score was {}", assessment.score);
    }

    #[test]
    fn extra_data_categories_add_ten_each() {
        let engine = RiskEngine::new();
        let ctx = RiskContext {
            involves_health_data: true,
            involves_personal_data: true,
            ..RiskContext::default()
        };
        assert_eq!(engine.assess(&ctx).dimensions.data_sensitivity, 80);
    }

    #[test]
    fn modifier_is_binary() {
        assert_eq!(reversibility_modifier(Reversibility::Irreversible, false), 30);
        assert_eq!(reversibility_modifier(Reversibility::Irreversible, true), 0);
        assert_eq!(
            reversibility_modifier(Reversibility::PartiallyReversible, false),
            0
        );
        assert_eq!(reversibility_modifier(Reversibility::Reversible, false), 0);
    }

    #[test]
    fn zero_weights_yield_zero_base() {
        let engine = RiskEngine::with_weights(RiskWeights {
            financial_impact: 0,
            external_exposure: 0,
            data_sensitivity: 0,
            system_mutation: 0,
            reversibility: 0,
            scope: 0,
        });
        let assessment = engine.assess(&critical_context());
        assert_eq!(assessment.base_score, 0);
        assert_eq!(assessment.score, 30);
    }
}
