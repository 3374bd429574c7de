// error.rs — Error types for plan construction.

use thiserror::Error;

/// Reasons a plan cannot be built.
#[derive(Debug, Error)]
pub enum PlanError {
    /// No intent was supplied.
    #[error("plan has no intent")]
    MissingIntent,

    /// No (or an empty) originating action was supplied.
    #[error("plan has no originating action")]
    MissingOriginatingAction,

    /// A read-only step declared a rollback action.
    #[error("step {order} is read-only but declares rollback action '{rollback}'")]
    RollbackOnReadOnlyStep { order: u32, rollback: String },

    /// Two steps share an order number.
    #[error("duplicate step order {0}")]
    DuplicateStepOrder(u32),

    /// Failed to serialize the plan for signing.
    #[error("failed to serialize plan for signing: {0}")]
    Serialization(#[from] serde_json::Error),
}
