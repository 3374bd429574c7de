// report.rs — Ordered step execution with reverse-order rollback.
//
// Steps run strictly in ascending `order`. When a step fails, every mutating
// step that already succeeded is rolled back newest-first using its declared
// rollback action. A completed mutation that has no rollback action, or
// whose rollback fails, is unrecoverable and makes the run a partial failure.

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use ck_plan::ToolPlan;

use crate::executor::StepExecutor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed { error: String },
    /// Not attempted because an earlier step failed.
    Skipped,
    RolledBack,
    RollbackFailed { error: String },
    /// Succeeded, but there is no way to undo it.
    NotReversible,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub order: u32,
    pub action: String,
    pub is_mutation: bool,
    #[serde(flatten)]
    pub status: StepStatus,
}

/// What happened to every step of a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub steps: Vec<StepOutcome>,
    /// Orders of steps whose effects were undone.
    pub rolled_back: Vec<u32>,
    /// Orders of steps whose effects may persist after a failure.
    pub unrecoverable: Vec<u32>,
    pub partial_failure: bool,
}

impl ExecutionReport {
    /// True when every step succeeded.
    pub fn succeeded(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(s.status, StepStatus::Succeeded))
    }

    /// The step that failed, if any.
    pub fn failed_step(&self) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|s| matches!(s.status, StepStatus::Failed { .. }))
    }
}

/// Execute `plan`'s steps through `executor`.
pub fn run_steps(plan: &ToolPlan, executor: &dyn StepExecutor) -> ExecutionReport {
    let mut report = ExecutionReport::default();
    // Indices into `report.steps` of mutations that succeeded.
    let mut completed_mutations: Vec<usize> = Vec::new();
    let mut failed = false;

    for step in plan.execution_steps() {
        if failed {
            report.steps.push(StepOutcome {
                order: step.order,
                action: step.action.clone(),
                is_mutation: step.is_mutation,
                status: StepStatus::Skipped,
            });
            continue;
        }

        match executor.execute(plan, step) {
            Ok(()) => {
                if step.is_mutation {
                    completed_mutations.push(report.steps.len());
                }
                report.steps.push(StepOutcome {
                    order: step.order,
                    action: step.action.clone(),
                    is_mutation: step.is_mutation,
                    status: StepStatus::Succeeded,
                });
            }
            Err(e) => {
                warn!(plan_id = %plan.plan_id(), order = step.order, error = %e, "step failed");
                failed = true;
                // A mutation that fails without a rollback path after earlier
                // mutations landed may have left partial effects.
                if step.is_mutation
                    && step.rollback_action.is_none()
                    && !completed_mutations.is_empty()
                {
                    report.unrecoverable.push(step.order);
                }
                report.steps.push(StepOutcome {
                    order: step.order,
                    action: step.action.clone(),
                    is_mutation: step.is_mutation,
                    status: StepStatus::Failed {
                        error: e.to_string(),
                    },
                });
            }
        }
    }

    if failed {
        let steps = plan.execution_steps();
        for &index in completed_mutations.iter().rev() {
            let outcome = &mut report.steps[index];
            let Some(step) = steps.iter().find(|s| s.order == outcome.order) else {
                continue;
            };
            match &step.rollback_action {
                Some(action) => match executor.rollback(plan, step, action) {
                    Ok(()) => {
                        outcome.status = StepStatus::RolledBack;
                        report.rolled_back.push(step.order);
                    }
                    Err(e) => {
                        error!(plan_id = %plan.plan_id(), order = step.order, error = %e, "rollback failed");
                        outcome.status = StepStatus::RollbackFailed {
                            error: e.to_string(),
                        };
                        report.unrecoverable.push(step.order);
                    }
                },
                None => {
                    outcome.status = StepStatus::NotReversible;
                    report.unrecoverable.push(step.order);
                }
            }
        }
    }

    report.partial_failure = !report.unrecoverable.is_empty();
    report
}
