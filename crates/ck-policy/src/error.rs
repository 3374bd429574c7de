// error.rs — Error types for the policy subsystem.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during policy operations.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The authorization token is outside its validity window.
    #[error("authorization token '{token_id}' is expired or not yet valid")]
    TokenExpired { token_id: String },

    /// The authorization token was issued for a different operation.
    #[error("authorization token '{token_id}' is scoped to {actual}, not {expected}")]
    WrongScope {
        token_id: String,
        expected: String,
        actual: String,
    },

    /// The new configuration does not advance the version.
    #[error("policy version {proposed} does not supersede current version {current}")]
    StaleVersion { current: u32, proposed: u32 },

    /// The configuration is internally inconsistent.
    #[error("invalid policy configuration: {0}")]
    InvalidConfiguration(String),

    /// The action string does not name a known intent category.
    #[error("unknown intent category '{0}'")]
    UnknownIntent(String),

    /// Failed to read a policy file.
    #[error("failed to read policy file at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to parse a YAML policy file.
    #[error("failed to parse policy file: {0}")]
    ParseFailed(#[from] serde_yaml::Error),
}
