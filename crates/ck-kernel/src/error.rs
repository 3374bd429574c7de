// error.rs — Error types for the kernel crate.
//
// Kernel *decisions* (denied, pending, failed) are values in
// `ExecutionResult`. These errors cover setup, the auxiliary update paths,
// and failures inside the pipeline before they are folded into a result.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::phase::KernelPhase;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error(transparent)]
    Policy(#[from] ck_policy::PolicyError),

    #[error(transparent)]
    Plan(#[from] ck_plan::PlanError),

    #[error(transparent)]
    Trust(#[from] ck_trust::TrustError),

    #[error(transparent)]
    TokenStore(#[from] ck_trust::TokenStoreError),

    #[error(transparent)]
    Audit(#[from] ck_audit::AuditError),

    /// Failed to read the kernel configuration file.
    #[error("failed to read kernel config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The kernel configuration file is not valid TOML for `KernelConfig`.
    #[error("failed to parse kernel config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid kernel configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid internal domain pattern '{pattern}': {source}")]
    DomainPattern {
        pattern: String,
        source: glob::PatternError,
    },

    /// The signing key does not belong to the active key generation.
    #[error("signing key version {key_version} does not match active key version {active}")]
    SigningKeyMismatch { key_version: u64, active: u64 },

    #[error("no pending plan with id {0}")]
    UnknownPlan(Uuid),

    /// A collected signature was refused. Never retryable with the same nonce.
    #[error("signature from '{signer_id}' rejected: {reason}")]
    SignatureRejected { signer_id: String, reason: String },

    #[error("invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: KernelPhase, to: KernelPhase },

    /// A previous turn panicked while holding the kernel.
    #[error("kernel state is poisoned")]
    Poisoned,
}

/// A probe, step, or rollback that an executor could not complete.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{action}: {reason}")]
pub struct ActionError {
    pub action: String,
    pub reason: String,
}

impl ActionError {
    pub fn new(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            reason: reason.into(),
        }
    }
}
