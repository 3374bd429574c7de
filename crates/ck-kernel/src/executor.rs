// executor.rs — Seams to the side-effect layer.
//
// The kernel decides; collaborators act. `ProbeRunner` answers read-only
// precondition checks, `StepExecutor` performs (and undoes) steps. Both are
// called synchronously, one at a time, from inside a kernel turn.

use tracing::info;

use ck_plan::{Probe, Step, ToolPlan};

use crate::error::ActionError;

/// Runs read-only precondition probes.
pub trait ProbeRunner: Send + Sync {
    /// `Ok(())` only when the precondition is positively confirmed.
    fn run(&self, plan: &ToolPlan, probe: &Probe) -> Result<(), ActionError>;
}

/// Performs plan steps and their rollback actions.
pub trait StepExecutor: Send + Sync {
    fn execute(&self, plan: &ToolPlan, step: &Step) -> Result<(), ActionError>;

    fn rollback(
        &self,
        plan: &ToolPlan,
        step: &Step,
        rollback_action: &str,
    ) -> Result<(), ActionError>;
}

/// Logs every probe and step instead of performing it.
///
/// Probes pass when they name a target; a probe with an empty target
/// cannot be confirmed and fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunExecutor;

impl ProbeRunner for DryRunExecutor {
    fn run(&self, plan: &ToolPlan, probe: &Probe) -> Result<(), ActionError> {
        if probe.target.trim().is_empty() {
            return Err(ActionError::new(
                probe.description.clone(),
                "probe has no target",
            ));
        }
        info!(
            plan_id = %plan.plan_id(),
            probe = ?probe.probe_type,
            target = %probe.target,
            "dry-run probe"
        );
        Ok(())
    }
}

impl StepExecutor for DryRunExecutor {
    fn execute(&self, plan: &ToolPlan, step: &Step) -> Result<(), ActionError> {
        info!(
            plan_id = %plan.plan_id(),
            order = step.order,
            action = %step.action,
            mutation = step.is_mutation,
            "dry-run step"
        );
        Ok(())
    }

    fn rollback(
        &self,
        plan: &ToolPlan,
        step: &Step,
        rollback_action: &str,
    ) -> Result<(), ActionError> {
        info!(
            plan_id = %plan.plan_id(),
            order = step.order,
            rollback = rollback_action,
            "dry-run rollback"
        );
        Ok(())
    }
}
