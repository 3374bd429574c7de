// error.rs — Error types for the audit ledger.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to open or create the ledger file.
    #[error("failed to open audit ledger at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write or sync a record.
    #[error("failed to append audit record: {0}")]
    WriteFailed(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The hash chain is broken at `line` (1-based).
    #[error("audit chain broken at line {line}: expected previous hash {expected}, found {actual}")]
    IntegrityViolation {
        line: usize,
        expected: String,
        actual: String,
    },
}
