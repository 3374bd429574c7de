// engine.rs — Policy evaluation engine.
//
// Every assessed action passes through `decide()`, which:
//
// 1. Looks up the approval preset for the assessment's risk tier
// 2. Looks up the base preset for the intent category
// 3. Keeps the stricter of the two (field-wise, for the requirement)
// 4. Synthesizes constraints for the effective tier:
//    - high/critical → time window
//    - external exposure above the threshold → rate limit
//    - always → audit required
//
// Evaluation is pure. The only mutation is `update_policy()`, which demands
// a correctly scoped, unexpired token and a strictly newer configuration.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use ck_risk::{RiskAssessment, RiskTier};

use crate::approval::ApprovalRequirement;
use crate::config::PolicyConfiguration;
use crate::decision::{Constraint, PolicyDecision};
use crate::error::PolicyError;
use crate::intent::IntentType;
use crate::token::{PolicyAuthorizationToken, TokenScope};

/// The policy engine: maps risk to approval under a versioned configuration.
#[derive(Debug, Clone, Default)]
pub struct PolicyEngine {
    config: PolicyConfiguration,
}

impl PolicyEngine {
    /// Create an engine with the standard configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with an explicit configuration.
    pub fn with_configuration(config: PolicyConfiguration) -> Result<Self, PolicyError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The active configuration.
    pub fn configuration(&self) -> &PolicyConfiguration {
        &self.config
    }

    /// Decision derived from the risk tier alone.
    pub fn map_to_approval(&self, assessment: &RiskAssessment) -> PolicyDecision {
        let level = self.config.tiers.get(assessment.tier);
        let mut applied = vec![
            self.policy_label(),
            format!("tier:{}->{}", assessment.tier, level),
        ];
        let constraints = self.constraints_for(
            assessment.tier,
            assessment.dimensions.external_exposure,
            &mut applied,
        );
        PolicyDecision {
            tier: assessment.tier,
            level,
            approval_requirement: level.requirement(),
            constraints,
            applied_policies: applied,
            policy_version: self.config.version,
        }
    }

    /// Minimum requirement for an intent category, independent of score.
    pub fn base_approval_for_intent(&self, intent: IntentType) -> ApprovalRequirement {
        intent.base_requirement()
    }

    /// The effective decision: the stricter of the tier-derived and the
    /// intent-derived requirement.
    pub fn decide(&self, assessment: &RiskAssessment, intent: IntentType) -> PolicyDecision {
        let tier_level = self.config.tiers.get(assessment.tier);
        let intent_level = intent.base_level();
        let level = tier_level.max(intent_level);
        let tier = assessment.tier.max(intent_level.implied_tier());

        let mut applied = vec![
            self.policy_label(),
            format!("tier:{}->{}", assessment.tier, tier_level),
        ];
        if intent_level > tier_level {
            applied.push(format!("intent:{}->{}", intent, intent_level));
        }

        let requirement = tier_level
            .requirement()
            .most_restrictive(&self.base_approval_for_intent(intent));
        let constraints =
            self.constraints_for(tier, assessment.dimensions.external_exposure, &mut applied);

        PolicyDecision {
            tier,
            level,
            approval_requirement: requirement,
            constraints,
            applied_policies: applied,
            policy_version: self.config.version,
        }
    }

    /// Validate a proposed update without applying it.
    pub fn check_update(
        &self,
        new_config: &PolicyConfiguration,
        authorization: &PolicyAuthorizationToken,
        now: DateTime<Utc>,
    ) -> Result<(), PolicyError> {
        authorization.check(TokenScope::PolicyUpdate, now)?;
        if new_config.version <= self.config.version {
            return Err(PolicyError::StaleVersion {
                current: self.config.version,
                proposed: new_config.version,
            });
        }
        new_config.validate()
    }

    /// Replace the configuration. Returns false (and changes nothing) when the
    /// token is expired or wrongly scoped, or the configuration is stale or invalid.
    pub fn update_policy(
        &mut self,
        new_config: PolicyConfiguration,
        authorization: &PolicyAuthorizationToken,
        now: DateTime<Utc>,
    ) -> bool {
        match self.check_update(&new_config, authorization, now) {
            Ok(()) => {
                info!(
                    from = self.config.version,
                    to = new_config.version,
                    name = %new_config.name,
                    token_id = %authorization.token_id,
                    "policy configuration updated"
                );
                self.config = new_config;
                true
            }
            Err(e) => {
                warn!(token_id = %authorization.token_id, error = %e, "policy update rejected");
                false
            }
        }
    }

    fn policy_label(&self) -> String {
        format!("policy:{}@v{}", self.config.name, self.config.version)
    }

    fn constraints_for(
        &self,
        tier: RiskTier,
        external_exposure: u8,
        applied: &mut Vec<String>,
    ) -> Vec<Constraint> {
        let mut constraints = Vec::new();
        if tier >= RiskTier::High {
            constraints.push(Constraint::TimeWindow {
                valid_for_seconds: self.config.time_window_seconds,
            });
            applied.push("constraint:time_window".to_string());
        }
        if external_exposure > self.config.exposure_rate_limit_threshold {
            constraints.push(Constraint::RateLimit {
                max_actions: self.config.rate_limit_max_actions,
                window_seconds: self.config.rate_limit_window_seconds,
            });
            applied.push("constraint:rate_limit".to_string());
        }
        // Unconditional: no decision exists without an audit obligation.
        constraints.push(Constraint::AuditRequired {
            retention_days: self.config.audit_retention_days,
        });
        applied.push("constraint:audit_required".to_string());
        constraints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::approval::ApprovalLevel;
    use ck_risk::{Reversibility, RiskContext, RiskEngine};

    fn assess(ctx: RiskContext) -> RiskAssessment {
        RiskEngine::new().assess(&ctx)
    }

    fn low_assessment() -> RiskAssessment {
        assess(RiskContext {
            writes_state: true,
            ..RiskContext::default()
        })
    }

    fn critical_assessment() -> RiskAssessment {
        assess(RiskContext {
            involves_payment: true,
            involves_credentials: true,
            reversibility: Reversibility::Irreversible,
            has_rollback_mechanism: false,
            ..RiskContext::default()
        })
    }

    fn token(scope: TokenScope) -> PolicyAuthorizationToken {
        PolicyAuthorizationToken {
            token_id: "policy-tok".to_string(),
            scope,
            issued_at: Utc::now() - Duration::seconds(5),
            valid_for_seconds: 300,
            key_version: 1,
            trust_epoch: 1,
        }
    }

    #[test]
    fn tier_table_matches_presets() {
        let engine = PolicyEngine::new();
        let low = engine.map_to_approval(&low_assessment());
        assert_eq!(low.tier, RiskTier::Low);
        assert!(low.is_auto_approve());

        let critical = engine.map_to_approval(&critical_assessment());
        assert_eq!(critical.tier, RiskTier::Critical);
        assert!(critical.approval_requirement.multi_signer_count >= 2);
        assert!(critical.approval_requirement.requires_biometric);
        assert!(critical.approval_requirement.cooldown_seconds > 0);
    }

    #[test]
    fn every_decision_requires_audit() {
        let engine = PolicyEngine::new();
        for intent in IntentType::ALL {
            assert!(engine.decide(&low_assessment(), intent).requires_audit());
            assert!(engine.decide(&critical_assessment(), intent).requires_audit());
        }
        assert!(engine.map_to_approval(&low_assessment()).requires_audit());
    }

    #[test]
    fn low_scored_email_is_forced_to_biometric() {
        let engine = PolicyEngine::new();
        let decision = engine.decide(&low_assessment(), IntentType::SendEmail);
        assert_eq!(decision.level, ApprovalLevel::BiometricRequired);
        assert!(decision.approval_requirement.requires_biometric);
        assert_eq!(decision.tier, RiskTier::High);
        assert!(decision
            .applied_policies
            .iter()
            .any(|p| p == "intent:send_email->biometric_required"));
    }

    #[test]
    fn intent_never_weakens_tier_requirement() {
        let engine = PolicyEngine::new();
        let decision = engine.decide(&critical_assessment(), IntentType::CreateDraft);
        assert_eq!(decision.level, ApprovalLevel::CriticalMultiSig);
        assert_eq!(decision.tier, RiskTier::Critical);
        assert!(decision.approval_requirement.requires_quorum());
    }

    #[test]
    fn high_tiers_get_time_window() {
        let engine = PolicyEngine::new();
        let decision = engine.decide(&critical_assessment(), IntentType::MakePayment);
        assert!(decision
            .constraints
            .iter()
            .any(|c| matches!(c, Constraint::TimeWindow { valid_for_seconds: 900 })));

        let low = engine.decide(&low_assessment(), IntentType::CreateDraft);
        assert!(!low
            .constraints
            .iter()
            .any(|c| matches!(c, Constraint::TimeWindow { .. })));
    }

    #[test]
    fn broad_exposure_gets_rate_limit() {
        let engine = PolicyEngine::new();
        let assessment = assess(RiskContext {
            external_recipient_count: 20,
            ..RiskContext::default()
        });
        assert!(assessment.dimensions.external_exposure > 50);
        let decision = engine.decide(&assessment, IntentType::SendEmail);
        assert!(decision
            .constraints
            .iter()
            .any(|c| matches!(c, Constraint::RateLimit { .. })));
    }

    #[test]
    fn strict_policy_raises_low_tier() {
        let engine = PolicyEngine::with_configuration(PolicyConfiguration::strict()).unwrap();
        let decision = engine.decide(&low_assessment(), IntentType::CreateDraft);
        assert_eq!(decision.level, ApprovalLevel::PreviewRequired);
        assert!(!decision.is_auto_approve());
    }

    #[test]
    fn update_requires_scoped_fresh_token_and_newer_version() {
        let mut engine = PolicyEngine::new();
        let mut strict = PolicyConfiguration::strict();
        strict.version = 2;

        // Wrong scope.
        assert!(!engine.update_policy(strict.clone(), &token(TokenScope::TrustUpdate), Utc::now()));
        assert_eq!(engine.configuration().version, 1);

        // Expired.
        let mut expired = token(TokenScope::PolicyUpdate);
        expired.issued_at = Utc::now() - Duration::hours(1);
        assert!(!engine.update_policy(strict.clone(), &expired, Utc::now()));

        // Same version is stale.
        let same = PolicyConfiguration::strict();
        assert!(matches!(
            engine.check_update(&same, &token(TokenScope::PolicyUpdate), Utc::now()),
            Err(PolicyError::StaleVersion { .. })
        ));

        assert!(engine.update_policy(strict, &token(TokenScope::PolicyUpdate), Utc::now()));
        assert_eq!(engine.configuration().name, "strict");
        assert_eq!(engine.configuration().version, 2);
    }
}
