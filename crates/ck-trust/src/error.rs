// error.rs — Error types for trust state and the token ledger.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reading or writing a persisted document.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Document could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Neither the primary document nor its backup could be parsed.
    #[error("no readable copy of {path} (primary and backup both corrupt)")]
    Unrecoverable { path: PathBuf },
}

/// Errors from the trust-epoch authority.
#[derive(Debug, Error)]
pub enum TrustError {
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// Internal invariants do not hold (epoch or key version below 1).
    #[error("trust state is inconsistent: {0}")]
    Inconsistent(String),

    /// An update would move trust state backwards.
    #[error("trust update rejected: {0}")]
    NonMonotonic(String),
}

/// Errors from the consumed-token ledger.
#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// Token ids must be non-empty.
    #[error("token id is empty")]
    EmptyTokenId,
}
