// result.rs — What every kernel invocation returns.
//
// Denials are values: a failed or pending result always carries a
// non-empty message and whatever part of the decision trail (plan, risk,
// policy decision, verification) was reached before the kernel halted.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ck_plan::ToolPlan;
use ck_policy::{PolicyDecision, SignerType};
use ck_risk::RiskAssessment;

use crate::phase::KernelPhase;
use crate::report::ExecutionReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
    PendingApproval,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::PendingApproval => write!(f, "pending_approval"),
        }
    }
}

/// Outcome of the verification phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    /// The plan's keyed digest matches its content.
    pub signature_valid: bool,
    /// The plan was signed with the active, unrevoked key version.
    pub key_binding_valid: bool,
    /// Trust state passed its integrity check.
    pub trust_consistent: bool,
    /// The decision needs a multi-signer quorum.
    pub quorum_required: bool,
    /// Required signer types with no accepted signature yet.
    pub missing_signers: BTreeSet<SignerType>,
    /// Distinct signer ids among accepted signatures.
    pub distinct_signers: usize,
    /// Distinct signers the decision needs.
    pub required_signers: u32,
    /// Human-readable reasons for every failed check.
    pub failures: Vec<String>,
}

impl VerificationOutcome {
    /// Plan integrity and trust checks passed. Quorum is tracked separately
    /// because an unmet quorum parks the plan rather than failing it.
    pub fn passed(&self) -> bool {
        self.signature_valid && self.key_binding_valid && self.trust_consistent
    }

    pub fn quorum(&self) -> QuorumStatus {
        QuorumStatus {
            required: self.quorum_required,
            missing_signers: self.missing_signers.clone(),
            distinct_signers: self.distinct_signers,
            required_signers: self.required_signers,
        }
    }

    pub fn quorum_satisfied(&self) -> bool {
        self.quorum().is_satisfied()
    }
}

/// Progress of a pending plan toward its signer quorum.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumStatus {
    pub required: bool,
    pub missing_signers: BTreeSet<SignerType>,
    pub distinct_signers: usize,
    pub required_signers: u32,
}

impl QuorumStatus {
    pub fn is_satisfied(&self) -> bool {
        !self.required
            || (self.missing_signers.is_empty()
                && self.distinct_signers >= self.required_signers as usize)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    /// Last phase reached before the invocation completed.
    pub phase: KernelPhase,
    pub plan_id: Option<Uuid>,
    pub plan: Option<ToolPlan>,
    pub risk: Option<RiskAssessment>,
    pub decision: Option<PolicyDecision>,
    pub verification: Option<VerificationOutcome>,
    /// Present once execution started.
    pub report: Option<ExecutionReport>,
    pub elapsed: Duration,
    pub message: String,
    /// Every phase visited by this invocation, in order.
    pub phase_trail: Vec<KernelPhase>,
}

impl ExecutionResult {
    /// A failure reached before any decision trail exists.
    pub fn rejected(phase: KernelPhase, message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            phase,
            plan_id: None,
            plan: None,
            risk: None,
            decision: None,
            verification: None,
            report: None,
            elapsed,
            message: message.into(),
            phase_trail: vec![phase],
        }
    }

    /// True iff the action ran to completion.
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    pub fn is_pending(&self) -> bool {
        self.status == ExecutionStatus::PendingApproval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_needs_types_and_distinct_signers() {
        let mut v = VerificationOutcome {
            quorum_required: true,
            required_signers: 2,
            distinct_signers: 1,
            ..Default::default()
        };
        assert!(!v.quorum_satisfied());
        v.distinct_signers = 2;
        assert!(v.quorum_satisfied());
        v.missing_signers.insert(SignerType::EmergencyOverride);
        assert!(!v.quorum_satisfied());
    }

    #[test]
    fn rejected_result_is_not_success() {
        let r = ExecutionResult::rejected(KernelPhase::Intake, "empty action", Duration::ZERO);
        assert!(!r.is_success());
        assert!(!r.is_pending());
        assert!(!r.message.is_empty());
        assert_eq!(r.status.to_string(), "failed");
    }
}
