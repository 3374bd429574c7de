// config.rs — Versioned policy configuration.
//
// A PolicyConfiguration is plain data: which approval preset each risk tier
// maps to, and the parameters of the synthesized constraints. It can be
// loaded from a YAML file at startup; at runtime it is replaced only through
// PolicyEngine::update_policy.

use std::path::Path;

use serde::{Deserialize, Serialize};

use ck_risk::RiskTier;

use crate::approval::ApprovalLevel;
use crate::error::PolicyError;

/// Approval preset per risk tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLevels {
    pub low: ApprovalLevel,
    pub medium: ApprovalLevel,
    pub high: ApprovalLevel,
    pub critical: ApprovalLevel,
}

impl TierLevels {
    /// Preset for a tier.
    pub fn get(&self, tier: RiskTier) -> ApprovalLevel {
        match tier {
            RiskTier::Low => self.low,
            RiskTier::Medium => self.medium,
            RiskTier::High => self.high,
            RiskTier::Critical => self.critical,
        }
    }

    /// Every tier's preset raised by one notch.
    pub fn raised(&self) -> Self {
        Self {
            low: self.low.raised(),
            medium: self.medium.raised(),
            high: self.high.raised(),
            critical: self.critical.raised(),
        }
    }
}

impl Default for TierLevels {
    fn default() -> Self {
        Self {
            low: ApprovalLevel::AutoApprove,
            medium: ApprovalLevel::PreviewRequired,
            high: ApprovalLevel::BiometricRequired,
            critical: ApprovalLevel::CriticalMultiSig,
        }
    }
}

/// Policy data consumed by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfiguration {
    /// Monotonically increasing version; updates must exceed the current one.
    pub version: u32,
    /// Human-readable variant name (e.g. "standard", "strict").
    pub name: String,
    /// Tier → approval preset table.
    #[serde(default)]
    pub tiers: TierLevels,
    /// Window within which a high/critical approval must be used.
    #[serde(default = "default_time_window_seconds")]
    pub time_window_seconds: u64,
    /// External-exposure dimension score above which a rate limit applies.
    #[serde(default = "default_exposure_threshold")]
    pub exposure_rate_limit_threshold: u8,
    /// Actions allowed per rate-limit window.
    #[serde(default = "default_rate_limit_max_actions")]
    pub rate_limit_max_actions: u32,
    /// Length of the rate-limit window.
    #[serde(default = "default_rate_limit_window_seconds")]
    pub rate_limit_window_seconds: u64,
    /// How long audit records for a decision must be retained.
    #[serde(default = "default_audit_retention_days")]
    pub audit_retention_days: u32,
}

fn default_time_window_seconds() -> u64 {
    900
}

fn default_exposure_threshold() -> u8 {
    50
}

fn default_rate_limit_max_actions() -> u32 {
    10
}

fn default_rate_limit_window_seconds() -> u64 {
    3600
}

fn default_audit_retention_days() -> u32 {
    365
}

impl Default for PolicyConfiguration {
    fn default() -> Self {
        Self::standard()
    }
}

impl PolicyConfiguration {
    /// The baseline table: low→auto, medium→preview, high→biometric,
    /// critical→multi-signature.
    pub fn standard() -> Self {
        Self {
            version: 1,
            name: "standard".to_string(),
            tiers: TierLevels::default(),
            time_window_seconds: default_time_window_seconds(),
            exposure_rate_limit_threshold: default_exposure_threshold(),
            rate_limit_max_actions: default_rate_limit_max_actions(),
            rate_limit_window_seconds: default_rate_limit_window_seconds(),
            audit_retention_days: default_audit_retention_days(),
        }
    }

    /// Every tier raised one notch over [`standard`](Self::standard).
    pub fn strict() -> Self {
        let standard = Self::standard();
        Self {
            name: "strict".to_string(),
            tiers: standard.tiers.raised(),
            ..standard
        }
    }

    /// Look up a built-in variant by name.
    pub fn variant(name: &str) -> Option<Self> {
        match name {
            "standard" => Some(Self::standard()),
            "strict" => Some(Self::strict()),
            _ => None,
        }
    }

    /// Parse a configuration from YAML and validate it.
    pub fn from_yaml(content: &str) -> Result<Self, PolicyError> {
        let config: PolicyConfiguration = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| PolicyError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Check internal consistency.
    ///
    /// A more severe tier may never map to a weaker preset than a less
    /// severe one, the version starts at 1, and audit records must be kept.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.version == 0 {
            return Err(PolicyError::InvalidConfiguration(
                "version must be at least 1".to_string(),
            ));
        }
        for pair in RiskTier::ALL.windows(2) {
            let (lower, higher) = (pair[0], pair[1]);
            if self.tiers.get(higher) < self.tiers.get(lower) {
                return Err(PolicyError::InvalidConfiguration(format!(
                    "tier {} maps to {} which is weaker than {} for tier {}",
                    higher,
                    self.tiers.get(higher),
                    self.tiers.get(lower),
                    lower
                )));
            }
        }
        if self.audit_retention_days == 0 {
            return Err(PolicyError::InvalidConfiguration(
                "audit retention must be at least one day".to_string(),
            ));
        }
        Ok(())
    }
}
