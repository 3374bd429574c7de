// plan.rs — The ToolPlan data model.
//
// A ToolPlan is immutable after construction: its fields are private and only
// readable through accessors. Plans can still be serialized and parsed (for
// the pending registry, the CLI, and audit records), which is exactly why the
// signature exists: a parsed plan is trusted only if its keyed digest
// verifies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ck_policy::IntentType;
use ck_risk::{Reversibility, RiskTier};

use crate::signing::{sha256_hex, SigningKey};

/// What the plan is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanIntent {
    /// Intent category.
    pub intent_type: IntentType,
    /// One-line human summary.
    pub summary: String,
    /// What the action targets (recipients, calendar, account).
    pub target_description: String,
}

impl PlanIntent {
    /// Build an intent description.
    pub fn new(
        intent_type: IntentType,
        summary: impl Into<String>,
        target_description: impl Into<String>,
    ) -> Self {
        Self {
            intent_type,
            summary: summary.into(),
            target_description: target_description.into(),
        }
    }
}

/// Kind of read-only precondition check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeType {
    /// The kernel holds the permission the action needs.
    Permission,
    /// The targeted resource exists.
    ResourceExists,
    /// Nothing conflicts with the action (e.g. overlapping events).
    Conflict,
    /// Recipients are well-formed and reachable.
    Recipient,
    /// Enough funds are available.
    Balance,
}

/// A read-only precondition check run before risk assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    pub probe_type: ProbeType,
    pub description: String,
    pub target: String,
    /// A failing required probe aborts the plan.
    pub is_required: bool,
}

impl Probe {
    /// A probe that must pass.
    pub fn required(
        probe_type: ProbeType,
        description: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            probe_type,
            description: description.into(),
            target: target.into(),
            is_required: true,
        }
    }

    /// A probe whose failure is reported but does not abort.
    pub fn advisory(
        probe_type: ProbeType,
        description: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            is_required: false,
            ..Self::required(probe_type, description, target)
        }
    }
}

/// One ordered execution step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Position in the plan; steps run in ascending order.
    pub order: u32,
    /// Executor action name.
    pub action: String,
    pub description: String,
    /// The step has side effects.
    pub is_mutation: bool,
    /// Action that undoes this step. Only mutating steps may have one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_action: Option<String>,
}

impl Step {
    /// A step without side effects.
    pub fn read_only(order: u32, action: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            order,
            action: action.into(),
            description: description.into(),
            is_mutation: false,
            rollback_action: None,
        }
    }

    /// A step with side effects and an optional rollback action.
    pub fn mutation(
        order: u32,
        action: impl Into<String>,
        description: impl Into<String>,
        rollback_action: Option<&str>,
    ) -> Self {
        Self {
            order,
            action: action.into(),
            description: description.into(),
            is_mutation: true,
            rollback_action: rollback_action.map(str::to_string),
        }
    }
}

/// A signed, immutable execution plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPlan {
    pub(crate) plan_id: Uuid,
    pub(crate) intent: PlanIntent,
    pub(crate) originating_action: String,
    pub(crate) probes: Vec<Probe>,
    pub(crate) execution_steps: Vec<Step>,
    pub(crate) risk_score: u8,
    pub(crate) risk_reasons: Vec<String>,
    pub(crate) reversibility: Reversibility,
    pub(crate) reversibility_reason: String,
    pub(crate) key_version: u64,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) signature: String,
}

/// Every field except the signature, borrowed, in a fixed order.
#[derive(Serialize)]
struct SignedContent<'a> {
    plan_id: &'a Uuid,
    intent: &'a PlanIntent,
    originating_action: &'a str,
    probes: &'a [Probe],
    execution_steps: &'a [Step],
    risk_score: u8,
    risk_reasons: &'a [String],
    reversibility: Reversibility,
    reversibility_reason: &'a str,
    key_version: u64,
    created_at: &'a DateTime<Utc>,
}

impl ToolPlan {
    pub fn plan_id(&self) -> Uuid {
        self.plan_id
    }

    pub fn intent(&self) -> &PlanIntent {
        &self.intent
    }

    pub fn originating_action(&self) -> &str {
        &self.originating_action
    }

    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    /// Steps in ascending `order`.
    pub fn execution_steps(&self) -> &[Step] {
        &self.execution_steps
    }

    /// Risk score after the reversibility modifier.
    pub fn risk_score(&self) -> u8 {
        self.risk_score
    }

    /// Derived from [`risk_score`](Self::risk_score); never stored.
    pub fn risk_tier(&self) -> RiskTier {
        RiskTier::from_score(self.risk_score)
    }

    pub fn risk_reasons(&self) -> &[String] {
        &self.risk_reasons
    }

    pub fn reversibility(&self) -> Reversibility {
        self.reversibility
    }

    pub fn reversibility_reason(&self) -> &str {
        &self.reversibility_reason
    }

    /// Key generation the plan was signed with.
    pub fn key_version(&self) -> u64 {
        self.key_version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Base64 HMAC-SHA256 over every other field.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// True if any mutating step declares a rollback action.
    pub fn has_rollback_path(&self) -> bool {
        self.execution_steps
            .iter()
            .any(|s| s.is_mutation && s.rollback_action.is_some())
    }

    /// Recompute the keyed digest and compare it with the stored signature.
    ///
    /// Fails if the plan was signed under a different key generation.
    pub fn verify_signature(&self, key: &SigningKey) -> bool {
        if key.key_version() != self.key_version {
            return false;
        }
        match self.signed_content() {
            Ok(content) => key.verify(&content, &self.signature),
            Err(_) => false,
        }
    }

    /// SHA-256 of the signed content, for audit records.
    pub fn content_digest(&self) -> String {
        // Serializing plain data cannot fail; an empty digest would never
        // match a recorded one.
        self.signed_content()
            .map(|content| sha256_hex(&content))
            .unwrap_or_default()
    }

    pub(crate) fn signed_content(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&SignedContent {
            plan_id: &self.plan_id,
            intent: &self.intent,
            originating_action: &self.originating_action,
            probes: &self.probes,
            execution_steps: &self.execution_steps,
            risk_score: self.risk_score,
            risk_reasons: &self.risk_reasons,
            reversibility: self.reversibility,
            reversibility_reason: &self.reversibility_reason,
            key_version: self.key_version,
            created_at: &self.created_at,
        })
    }
}
