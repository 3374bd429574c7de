// phase.rs — Kernel state machine phases.
//
// A fresh invocation walks the phases in order with no skipping:
//
//   Idle → Intake → ToolPlanning → Probes → RiskAssessment → PolicyMapping
//        → Verification → {Execution | AwaitingApproval} → Complete → Idle
//
// `authorize` resumes a parked plan: Idle → AwaitingApproval → Verification
// → Execution → Complete. Any active phase may jump to Complete when the
// invocation halts.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelPhase {
    Idle,
    Intake,
    ToolPlanning,
    Probes,
    RiskAssessment,
    PolicyMapping,
    Verification,
    Execution,
    AwaitingApproval,
    Complete,
}

impl KernelPhase {
    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: KernelPhase) -> bool {
        use KernelPhase::*;

        // Halting is always allowed from an active phase.
        if next == Complete {
            return !matches!(self, Idle | Complete);
        }

        matches!(
            (self, next),
            (Idle, Intake)
                | (Intake, ToolPlanning)
                | (ToolPlanning, Probes)
                | (Probes, RiskAssessment)
                | (RiskAssessment, PolicyMapping)
                | (PolicyMapping, Verification)
                | (Verification, Execution)
                | (Verification, AwaitingApproval)
                | (Complete, Idle)
                // Resuming a parked plan.
                | (Idle, AwaitingApproval)
                | (AwaitingApproval, Verification)
        )
    }
}

impl fmt::Display for KernelPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KernelPhase::Idle => "idle",
            KernelPhase::Intake => "intake",
            KernelPhase::ToolPlanning => "tool_planning",
            KernelPhase::Probes => "probes",
            KernelPhase::RiskAssessment => "risk_assessment",
            KernelPhase::PolicyMapping => "policy_mapping",
            KernelPhase::Verification => "verification",
            KernelPhase::Execution => "execution",
            KernelPhase::AwaitingApproval => "awaiting_approval",
            KernelPhase::Complete => "complete",
        };
        write!(f, "{}", s)
    }
}
