// quorum.rs — Required signer types per risk tier.
//
// Quorum here is a local, in-process check: which *kinds* of signer must
// have signed before a tier is authorized. Extra or duplicate signatures of
// an already satisfied type never stand in for a missing type.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ck_risk::RiskTier;

/// Role of a signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignerType {
    /// The person operating the device.
    DeviceOperator,
    /// An administrator of the owning organization.
    OrganizationAuthority,
    /// Holder of the emergency override credential.
    EmergencyOverride,
}

impl fmt::Display for SignerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignerType::DeviceOperator => write!(f, "device_operator"),
            SignerType::OrganizationAuthority => write!(f, "organization_authority"),
            SignerType::EmergencyOverride => write!(f, "emergency_override"),
        }
    }
}

/// A signature gathered while a plan awaits approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedSignature {
    /// Who signed.
    pub signer_id: String,
    /// In which role.
    pub signer_type: SignerType,
    /// Base64 keyed digest over the plan signature and nonce.
    pub signature_data: String,
    /// When the signature was produced.
    pub signed_at: DateTime<Utc>,
    /// Single-use nonce; consumed when the signature is accepted.
    pub nonce: String,
    /// Nonce expiry.
    pub expires_at: DateTime<Utc>,
    /// Signing-key generation the signer used.
    pub key_version: u64,
    /// Trust epoch the signature was produced under.
    pub trust_epoch: u64,
}

/// Signer types a tier requires.
///
/// Medium shares low's requirement; only high and critical add roles.
pub fn required_signer_types(tier: RiskTier) -> BTreeSet<SignerType> {
    match tier {
        RiskTier::Low | RiskTier::Medium => BTreeSet::from([SignerType::DeviceOperator]),
        RiskTier::High => BTreeSet::from([
            SignerType::DeviceOperator,
            SignerType::OrganizationAuthority,
        ]),
        RiskTier::Critical => BTreeSet::from([
            SignerType::DeviceOperator,
            SignerType::OrganizationAuthority,
            SignerType::EmergencyOverride,
        ]),
    }
}

/// Check a signature set against a tier.
///
/// Returns `None` when quorum is met, or `Some(missing)` listing every
/// required signer type not present among the signatures.
pub fn validate_quorum(
    signatures: &[CollectedSignature],
    tier: RiskTier,
) -> Option<BTreeSet<SignerType>> {
    let present: BTreeSet<SignerType> = signatures.iter().map(|s| s.signer_type).collect();
    let missing: BTreeSet<SignerType> = required_signer_types(tier)
        .difference(&present)
        .copied()
        .collect();
    if missing.is_empty() {
        None
    } else {
        Some(missing)
    }
}
