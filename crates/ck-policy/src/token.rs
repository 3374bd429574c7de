// token.rs — Authorization tokens for privileged kernel updates.
//
// A token is accepted only inside its explicit validity window and only for
// the scope it was issued for. The token also names the key version and
// trust epoch it was issued under so the kernel can reject stale issuers.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// What a token authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenScope {
    /// Replace the policy configuration.
    PolicyUpdate,
    /// Rotate keys, advance the trust epoch, or revoke key versions.
    TrustUpdate,
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenScope::PolicyUpdate => write!(f, "policy_update"),
            TokenScope::TrustUpdate => write!(f, "trust_update"),
        }
    }
}

/// A single-use, time-bounded authorization for a privileged update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyAuthorizationToken {
    /// Unique id; consumed on use so the token cannot be replayed.
    pub token_id: String,
    /// Operation the token authorizes.
    pub scope: TokenScope,
    /// When the token was issued.
    pub issued_at: DateTime<Utc>,
    /// Length of the validity window starting at `issued_at`.
    pub valid_for_seconds: u64,
    /// Signing-key generation the token was issued under.
    pub key_version: u64,
    /// Trust epoch the token was issued under.
    pub trust_epoch: u64,
}

impl PolicyAuthorizationToken {
    /// End of the validity window.
    pub fn expires_at(&self) -> DateTime<Utc> {
        let secs = i64::try_from(self.valid_for_seconds).unwrap_or(i64::MAX);
        Duration::try_seconds(secs)
            .and_then(|window| self.issued_at.checked_add_signed(window))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// True iff `now` is inside `[issued_at, expires_at)`.
    ///
    /// A token issued in the future is not yet valid.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.issued_at && now < self.expires_at()
    }

    /// Check window and scope. Either failure is an unconditional rejection.
    pub fn check(&self, scope: TokenScope, now: DateTime<Utc>) -> Result<(), PolicyError> {
        if self.scope != scope {
            return Err(PolicyError::WrongScope {
                token_id: self.token_id.clone(),
                expected: scope.to_string(),
                actual: self.scope.to_string(),
            });
        }
        if !self.is_valid_at(now) {
            return Err(PolicyError::TokenExpired {
                token_id: self.token_id.clone(),
            });
        }
        Ok(())
    }
}
