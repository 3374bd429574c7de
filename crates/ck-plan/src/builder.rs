// builder.rs — ToolPlanBuilder: the only way to obtain a ToolPlan.
//
// The builder accumulates the plan's parts, validates them, applies the
// reversibility modifier to the risk score, and signs the result.

use std::collections::BTreeSet;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use ck_risk::{reversibility_modifier, Reversibility};

use crate::error::PlanError;
use crate::plan::{PlanIntent, Probe, Step, ToolPlan};
use crate::signing::SigningKey;

/// Accumulates plan parts, then signs them into a [`ToolPlan`].
#[derive(Debug, Clone, Default)]
pub struct ToolPlanBuilder {
    intent: Option<PlanIntent>,
    originating_action: Option<String>,
    probes: Vec<Probe>,
    steps: Vec<Step>,
    base_risk: u8,
    risk_reasons: Vec<String>,
    reversibility: Reversibility,
    reversibility_reason: Option<String>,
}

impl ToolPlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intent(mut self, intent: PlanIntent) -> Self {
        self.intent = Some(intent);
        self
    }

    /// The raw action string the plan was derived from.
    pub fn originating_action(mut self, action: impl Into<String>) -> Self {
        self.originating_action = Some(action.into());
        self
    }

    /// Risk score before the reversibility modifier, with its reasons.
    pub fn base_risk(mut self, score: u8, reasons: Vec<String>) -> Self {
        self.base_risk = score.min(100);
        self.risk_reasons = reasons;
        self
    }

    pub fn reversibility(mut self, reversibility: Reversibility, reason: impl Into<String>) -> Self {
        self.reversibility = reversibility;
        self.reversibility_reason = Some(reason.into());
        self
    }

    pub fn probe(mut self, probe: Probe) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn probes(mut self, probes: impl IntoIterator<Item = Probe>) -> Self {
        self.probes.extend(probes);
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Validate, apply the reversibility modifier, and sign.
    pub fn build(self, key: &SigningKey) -> Result<ToolPlan, PlanError> {
        let intent = self.intent.ok_or(PlanError::MissingIntent)?;
        let originating_action = self
            .originating_action
            .filter(|a| !a.trim().is_empty())
            .ok_or(PlanError::MissingOriginatingAction)?;

        let mut seen = BTreeSet::new();
        for step in &self.steps {
            if !seen.insert(step.order) {
                return Err(PlanError::DuplicateStepOrder(step.order));
            }
            if let (false, Some(rollback)) = (step.is_mutation, &step.rollback_action) {
                return Err(PlanError::RollbackOnReadOnlyStep {
                    order: step.order,
                    rollback: rollback.clone(),
                });
            }
        }
        let mut execution_steps = self.steps;
        execution_steps.sort_by_key(|s| s.order);

        let has_rollback = execution_steps
            .iter()
            .any(|s| s.is_mutation && s.rollback_action.is_some());
        let modifier = reversibility_modifier(self.reversibility, has_rollback);
        let mut risk_reasons = self.risk_reasons;
        if modifier > 0 {
            risk_reasons.push(format!(
                "irreversible with no rollback path (+{})",
                modifier
            ));
        }
        let risk_score = self.base_risk.saturating_add(modifier).min(100);

        let reversibility_reason = self
            .reversibility_reason
            .unwrap_or_else(|| self.reversibility.to_string());

        let mut plan = ToolPlan {
            plan_id: Uuid::new_v4(),
            intent,
            originating_action,
            probes: self.probes,
            execution_steps,
            risk_score,
            risk_reasons,
            reversibility: self.reversibility,
            reversibility_reason,
            key_version: key.key_version(),
            created_at: Utc::now(),
            signature: String::new(),
        };
        plan.signature = key.sign(&plan.signed_content()?);

        debug!(
            plan_id = %plan.plan_id,
            intent = %plan.intent.intent_type,
            risk_score = plan.risk_score,
            steps = plan.execution_steps.len(),
            "tool plan built"
        );
        Ok(plan)
    }
}
