// approval.rs — Approval records submitted to resolve a pending plan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ck_policy::{ApprovalRequirement, ApprovalType};

/// Single-use proof that the approval was issued under current trust.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalCredential {
    /// Consumed on use; a second record with the same id is a replay.
    pub token_id: String,
    pub key_version: u64,
    pub trust_epoch: u64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub plan_id: Uuid,
    pub approved: bool,
    pub approval_type: ApprovalType,
    pub approver_identifier: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub credential: Option<ApprovalCredential>,
}

impl ApprovalRecord {
    /// An approval backed by `credential`.
    pub fn approve(
        plan_id: Uuid,
        approval_type: ApprovalType,
        approver: impl Into<String>,
        credential: ApprovalCredential,
    ) -> Self {
        Self {
            plan_id,
            approved: true,
            approval_type,
            approver_identifier: approver.into(),
            reason: None,
            credential: Some(credential),
        }
    }

    /// A rejection. Needs no credential: refusing is always allowed.
    pub fn reject(plan_id: Uuid, approver: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            plan_id,
            approved: false,
            approval_type: ApprovalType::Confirmation,
            approver_identifier: approver.into(),
            reason: Some(reason.into()),
            credential: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Checks that need no kernel state: plan match, approver present,
    /// approval strength, and credential expiry. Trust binding and token
    /// consumption are checked by the kernel afterwards.
    pub fn check_shape(
        &self,
        plan_id: Uuid,
        requirement: &ApprovalRequirement,
        now: DateTime<Utc>,
    ) -> Result<&ApprovalCredential, String> {
        if self.plan_id != plan_id {
            return Err(format!(
                "approval is for plan {}, not {}",
                self.plan_id, plan_id
            ));
        }
        if self.approver_identifier.trim().is_empty() {
            return Err("approval has no approver".to_string());
        }
        if !self.approval_type.satisfies(requirement) {
            return Err(format!(
                "{} approval does not meet the requirement (biometric: {}, preview: {})",
                self.approval_type, requirement.requires_biometric, requirement.requires_preview
            ));
        }
        let credential = self
            .credential
            .as_ref()
            .ok_or_else(|| "approval carries no credential".to_string())?;
        if credential.token_id.trim().is_empty() {
            return Err("approval credential has no token id".to_string());
        }
        if credential.expires_at <= now {
            return Err(format!(
                "approval credential {} expired at {}",
                credential.token_id, credential.expires_at
            ));
        }
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn credential(expires_in_secs: i64) -> ApprovalCredential {
        ApprovalCredential {
            token_id: "appr-1".into(),
            key_version: 1,
            trust_epoch: 1,
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        }
    }

    #[test]
    fn biometric_approval_passes_shape_check() {
        let plan_id = Uuid::new_v4();
        let record =
            ApprovalRecord::approve(plan_id, ApprovalType::Biometric, "owner", credential(60));
        assert!(record
            .check_shape(plan_id, &ApprovalRequirement::biometric_required(), Utc::now())
            .is_ok());
    }

    #[test]
    fn weaker_approval_is_refused() {
        let plan_id = Uuid::new_v4();
        let record = ApprovalRecord::approve(plan_id, ApprovalType::Preview, "owner", credential(60));
        let err = record
            .check_shape(plan_id, &ApprovalRequirement::biometric_required(), Utc::now())
            .unwrap_err();
        assert!(err.contains("does not meet"));
    }

    #[test]
    fn mismatched_plan_or_expired_credential_is_refused() {
        let plan_id = Uuid::new_v4();
        let req = ApprovalRequirement::preview_required();
        let other = ApprovalRecord::approve(Uuid::new_v4(), ApprovalType::Preview, "o", credential(60));
        assert!(other.check_shape(plan_id, &req, Utc::now()).is_err());

        let expired = ApprovalRecord::approve(plan_id, ApprovalType::Preview, "o", credential(-1));
        assert!(expired.check_shape(plan_id, &req, Utc::now()).is_err());

        let mut anonymous = ApprovalRecord::approve(plan_id, ApprovalType::Preview, " ", credential(60));
        assert!(anonymous.check_shape(plan_id, &req, Utc::now()).is_err());
        anonymous.approver_identifier = "o".into();
        anonymous.credential = None;
        assert!(anonymous.check_shape(plan_id, &req, Utc::now()).is_err());
    }
}
