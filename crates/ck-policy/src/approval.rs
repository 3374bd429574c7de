// approval.rs — What approval an action needs, and what an approval provides.
//
// ApprovalLevel names the four canonical presets. ApprovalRequirement is the
// concrete set of obligations; two requirements combine by taking the
// stricter value of every field, so combining can only tighten.

use std::fmt;

use serde::{Deserialize, Serialize};

use ck_risk::RiskTier;

/// Cooldown attached to the critical multi-signature preset.
pub const CRITICAL_COOLDOWN_SECONDS: u64 = 300;

/// Canonical approval presets, least strict first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalLevel {
    /// No human interaction needed.
    AutoApprove,
    /// The user must see a preview and confirm once.
    PreviewRequired,
    /// Preview plus biometric confirmation.
    BiometricRequired,
    /// Biometric confirmation plus at least two signers and a cooldown.
    CriticalMultiSig,
}

impl ApprovalLevel {
    /// The concrete requirement for this preset.
    pub fn requirement(self) -> ApprovalRequirement {
        match self {
            ApprovalLevel::AutoApprove => ApprovalRequirement::auto_approve(),
            ApprovalLevel::PreviewRequired => ApprovalRequirement::preview_required(),
            ApprovalLevel::BiometricRequired => ApprovalRequirement::biometric_required(),
            ApprovalLevel::CriticalMultiSig => ApprovalRequirement::critical_multi_sig(),
        }
    }

    /// The next stricter preset. `CriticalMultiSig` is already the ceiling.
    pub fn raised(self) -> Self {
        match self {
            ApprovalLevel::AutoApprove => ApprovalLevel::PreviewRequired,
            ApprovalLevel::PreviewRequired => ApprovalLevel::BiometricRequired,
            ApprovalLevel::BiometricRequired | ApprovalLevel::CriticalMultiSig => {
                ApprovalLevel::CriticalMultiSig
            }
        }
    }

    /// The risk tier this preset is the default for.
    pub fn implied_tier(self) -> RiskTier {
        match self {
            ApprovalLevel::AutoApprove => RiskTier::Low,
            ApprovalLevel::PreviewRequired => RiskTier::Medium,
            ApprovalLevel::BiometricRequired => RiskTier::High,
            ApprovalLevel::CriticalMultiSig => RiskTier::Critical,
        }
    }
}

impl fmt::Display for ApprovalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalLevel::AutoApprove => write!(f, "auto_approve"),
            ApprovalLevel::PreviewRequired => write!(f, "preview_required"),
            ApprovalLevel::BiometricRequired => write!(f, "biometric_required"),
            ApprovalLevel::CriticalMultiSig => write!(f, "critical_multi_sig"),
        }
    }
}

/// The obligations an action must meet before it may execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequirement {
    /// Number of approval records needed.
    pub approvals_needed: u32,
    /// Approval must be biometric.
    pub requires_biometric: bool,
    /// The user must have been shown a preview.
    pub requires_preview: bool,
    /// Minimum number of distinct signers (0 = no multi-signature).
    pub multi_signer_count: u32,
    /// Minimum wait between decision and execution, enforced by the executor.
    pub cooldown_seconds: u64,
}

impl ApprovalRequirement {
    /// Nothing required: (0, false, false, 0, 0).
    pub fn auto_approve() -> Self {
        Self {
            approvals_needed: 0,
            requires_biometric: false,
            requires_preview: false,
            multi_signer_count: 0,
            cooldown_seconds: 0,
        }
    }

    /// One confirmed preview.
    pub fn preview_required() -> Self {
        Self {
            approvals_needed: 1,
            requires_preview: true,
            ..Self::auto_approve()
        }
    }

    /// One biometric approval after a preview.
    pub fn biometric_required() -> Self {
        Self {
            approvals_needed: 1,
            requires_biometric: true,
            requires_preview: true,
            ..Self::auto_approve()
        }
    }

    /// Biometric approval, two or more signers, and a cooldown.
    pub fn critical_multi_sig() -> Self {
        Self {
            approvals_needed: 2,
            requires_biometric: true,
            requires_preview: true,
            multi_signer_count: 2,
            cooldown_seconds: CRITICAL_COOLDOWN_SECONDS,
        }
    }

    /// True when the action may proceed with no additional approval.
    pub fn is_auto_approve(&self) -> bool {
        self.approvals_needed == 0
            && !self.requires_biometric
            && !self.requires_preview
            && self.multi_signer_count == 0
    }

    /// True when a multi-signer quorum must be verified.
    pub fn requires_quorum(&self) -> bool {
        self.multi_signer_count >= 2
    }

    /// Combine two requirements, keeping the stricter value of every field.
    pub fn most_restrictive(&self, other: &ApprovalRequirement) -> ApprovalRequirement {
        ApprovalRequirement {
            approvals_needed: self.approvals_needed.max(other.approvals_needed),
            requires_biometric: self.requires_biometric || other.requires_biometric,
            requires_preview: self.requires_preview || other.requires_preview,
            multi_signer_count: self.multi_signer_count.max(other.multi_signer_count),
            cooldown_seconds: self.cooldown_seconds.max(other.cooldown_seconds),
        }
    }
}

/// The kind of confirmation an approver gave, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalType {
    /// A plain confirmation tap.
    Confirmation,
    /// Confirmation after the preview was displayed.
    Preview,
    /// Confirmation with a biometric check.
    Biometric,
}

impl ApprovalType {
    /// Does this kind of approval meet the requirement's confirmation strength?
    ///
    /// Signer quorum is checked separately; this only covers the single
    /// approver's confirmation.
    pub fn satisfies(self, requirement: &ApprovalRequirement) -> bool {
        if requirement.requires_biometric {
            self >= ApprovalType::Biometric
        } else if requirement.requires_preview {
            self >= ApprovalType::Preview
        } else {
            true
        }
    }
}

impl fmt::Display for ApprovalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalType::Confirmation => write!(f, "confirmation"),
            ApprovalType::Preview => write!(f, "preview"),
            ApprovalType::Biometric => write!(f, "biometric"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_match_canonical_values() {
        let auto = ApprovalRequirement::auto_approve();
        assert_eq!(
            (
                auto.approvals_needed,
                auto.requires_biometric,
                auto.requires_preview,
                auto.multi_signer_count,
                auto.cooldown_seconds
            ),
            (0, false, false, 0, 0)
        );
        assert!(auto.is_auto_approve());

        let critical = ApprovalRequirement::critical_multi_sig();
        assert!(critical.multi_signer_count >= 2);
        assert!(critical.cooldown_seconds > 0);
        assert!(critical.requires_biometric);
        assert!(critical.requires_quorum());
    }

    #[test]
    fn most_restrictive_takes_field_wise_max() {
        let a = ApprovalRequirement {
            approvals_needed: 1,
            requires_biometric: false,
            requires_preview: true,
            multi_signer_count: 0,
            cooldown_seconds: 60,
        };
        let b = ApprovalRequirement {
            approvals_needed: 0,
            requires_biometric: true,
            requires_preview: false,
            multi_signer_count: 3,
            cooldown_seconds: 10,
        };
        let merged = a.most_restrictive(&b);
        assert_eq!(merged.approvals_needed, 1);
        assert!(merged.requires_biometric);
        assert!(merged.requires_preview);
        assert_eq!(merged.multi_signer_count, 3);
        assert_eq!(merged.cooldown_seconds, 60);
        // Symmetric.
        assert_eq!(merged, b.most_restrictive(&a));
    }

    #[test]
    fn raising_saturates_at_critical() {
        assert_eq!(
            ApprovalLevel::AutoApprove.raised(),
            ApprovalLevel::PreviewRequired
        );
        assert_eq!(
            ApprovalLevel::CriticalMultiSig.raised(),
            ApprovalLevel::CriticalMultiSig
        );
    }

    #[test]
    fn approval_type_strength() {
        let bio = ApprovalRequirement::biometric_required();
        assert!(!ApprovalType::Preview.satisfies(&bio));
        assert!(ApprovalType::Biometric.satisfies(&bio));

        let preview = ApprovalRequirement::preview_required();
        assert!(!ApprovalType::Confirmation.satisfies(&preview));
        assert!(ApprovalType::Preview.satisfies(&preview));
        assert!(ApprovalType::Biometric.satisfies(&preview));

        assert!(ApprovalType::Confirmation.satisfies(&ApprovalRequirement::auto_approve()));
    }
}
