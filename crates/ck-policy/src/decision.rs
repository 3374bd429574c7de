// decision.rs — The output of the policy engine.

use serde::{Deserialize, Serialize};

use ck_risk::RiskTier;

use crate::approval::{ApprovalLevel, ApprovalRequirement};

/// An obligation attached to a decision, enforced by the caller or executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Constraint {
    /// Approval must be used within this many seconds of the decision.
    TimeWindow { valid_for_seconds: u64 },
    /// No more than `max_actions` of this kind per window.
    RateLimit { max_actions: u32, window_seconds: u64 },
    /// The decision and its outcome must be recorded in the audit ledger.
    AuditRequired { retention_days: u32 },
}

/// What approval an action needs and under which constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// Effective risk tier the decision was made for.
    pub tier: RiskTier,
    /// The preset the requirement was derived from (the stricter of the
    /// tier preset and the intent's base preset).
    pub level: ApprovalLevel,
    /// Concrete requirement to satisfy.
    pub approval_requirement: ApprovalRequirement,
    /// Attached obligations. Always contains an `AuditRequired`.
    pub constraints: Vec<Constraint>,
    /// Names of the policy rules that shaped this decision.
    pub applied_policies: Vec<String>,
    /// Version of the configuration that produced the decision.
    pub policy_version: u32,
}

impl PolicyDecision {
    /// True when no further approval is needed.
    pub fn is_auto_approve(&self) -> bool {
        self.approval_requirement.is_auto_approve()
    }

    /// True when the decision carries an audit obligation.
    pub fn requires_audit(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| matches!(c, Constraint::AuditRequired { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraints_serialize_with_type_tag() {
        let json = serde_json::to_string(&Constraint::AuditRequired { retention_days: 365 }).unwrap();
        assert_eq!(json, r#"{"type":"audit_required","retention_days":365}"#);

        let parsed: Constraint =
            serde_json::from_str(r#"{"type":"rate_limit","max_actions":5,"window_seconds":60}"#)
                .unwrap();
        assert_eq!(
            parsed,
            Constraint::RateLimit {
                max_actions: 5,
                window_seconds: 60
            }
        );
    }
}
