// record.rs — Audit record data model.
//
// One record per kernel outcome: every decision, every approval or denial,
// every change to policy or trust state, and every lockdown. Records are
// chained through `previous_hash`, which the sink fills in on append.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the record documents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Risk assessed and policy decided for a plan.
    Decision,
    /// Plan parked awaiting approval.
    Pending,
    /// Plan executed to completion.
    Completed,
    /// Plan rejected or execution failed.
    Failed,
    /// Pending plan explicitly denied or its approval rejected.
    Denied,
    /// An approval record was accepted.
    Approval,
    /// A quorum signature was accepted for a pending plan.
    SignatureCollected,
    PolicyUpdate,
    TrustUpdate,
    /// The integrity guard entered lockdown.
    Lockdown,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditAction::Decision => "decision",
            AuditAction::Pending => "pending",
            AuditAction::Completed => "completed",
            AuditAction::Failed => "failed",
            AuditAction::Denied => "denied",
            AuditAction::Approval => "approval",
            AuditAction::SignatureCollected => "signature_collected",
            AuditAction::PolicyUpdate => "policy_update",
            AuditAction::TrustUpdate => "trust_update",
            AuditAction::Lockdown => "lockdown",
        };
        write!(f, "{}", s)
    }
}

/// A single line of the audit ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub record_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    /// Intent or operation the record is about (e.g. `send_email`,
    /// `update_policy`).
    pub subject: String,
    pub plan_id: Option<Uuid>,
    pub risk_score: Option<u8>,
    pub risk_tier: Option<String>,
    /// SHA-256 of the plan's signed content.
    pub plan_digest: Option<String>,
    /// How long the obligation that produced this record must be kept.
    pub retention_days: Option<u32>,
    pub message: Option<String>,
    /// Link hash of the previous line; `None` only for the first record.
    pub previous_hash: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl AuditRecord {
    pub fn new(action: AuditAction, subject: impl Into<String>) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            subject: subject.into(),
            plan_id: None,
            risk_score: None,
            risk_tier: None,
            plan_digest: None,
            retention_days: None,
            message: None,
            previous_hash: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_plan(mut self, plan_id: Uuid, digest: impl Into<String>) -> Self {
        self.plan_id = Some(plan_id);
        self.plan_digest = Some(digest.into());
        self
    }

    pub fn with_risk(mut self, score: u8, tier: impl Into<String>) -> Self {
        self.risk_score = Some(score);
        self.risk_tier = Some(tier.into());
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = Some(days);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let plan_id = Uuid::new_v4();
        let record = AuditRecord::new(AuditAction::Pending, "send_email")
            .with_plan(plan_id, "abc")
            .with_risk(55, "high")
            .with_retention_days(365)
            .with_message("awaiting biometric approval");
        assert_eq!(record.plan_id, Some(plan_id));
        assert_eq!(record.plan_digest.as_deref(), Some("abc"));
        assert_eq!(record.risk_score, Some(55));
        assert_eq!(record.risk_tier.as_deref(), Some("high"));
        assert_eq!(record.retention_days, Some(365));
        assert!(record.previous_hash.is_none());
    }

    #[test]
    fn action_serializes_as_snake_case() {
        let json = serde_json::to_string(&AuditAction::SignatureCollected).unwrap();
        assert_eq!(json, "\"signature_collected\"");
        assert_eq!(AuditAction::TrustUpdate.to_string(), "trust_update");
    }
}
