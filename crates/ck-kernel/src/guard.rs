// guard.rs — KernelIntegrityGuard: system posture consulted before execution.
//
// The guard holds a posture (normal or lockdown). `self_check` verifies
// trust-state consistency, policy configuration validity, and the audit
// chain; any failure moves the posture to lockdown. Lockdown is sticky for
// the lifetime of the guard: no approval record, signature, or passing
// check clears it. The guard is cheaply cloneable so an outside monitor can
// hold a handle and lock the kernel down.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use ck_audit::AuditSink;
use ck_policy::PolicyConfiguration;
use ck_trust::TrustEpochManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Posture {
    Normal,
    Lockdown,
}

impl std::fmt::Display for Posture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Posture::Normal => write!(f, "normal"),
            Posture::Lockdown => write!(f, "lockdown"),
        }
    }
}

#[derive(Debug)]
struct GuardState {
    posture: Posture,
    reasons: Vec<String>,
    last_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct KernelIntegrityGuard {
    state: Arc<RwLock<GuardState>>,
}

impl Default for KernelIntegrityGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelIntegrityGuard {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(GuardState {
                posture: Posture::Normal,
                reasons: Vec::new(),
                last_check: None,
            })),
        }
    }

    /// Current posture. A poisoned lock reads as lockdown.
    pub fn posture(&self) -> Posture {
        self.state
            .read()
            .map(|s| s.posture)
            .unwrap_or(Posture::Lockdown)
    }

    pub fn is_locked(&self) -> bool {
        self.posture() == Posture::Lockdown
    }

    /// Why the guard is locked down, oldest first.
    pub fn reasons(&self) -> Vec<String> {
        match self.state.read() {
            Ok(s) => s.reasons.clone(),
            Err(_) => vec!["integrity guard state is poisoned".to_string()],
        }
    }

    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        self.state.read().ok().and_then(|s| s.last_check)
    }

    /// Enter lockdown. Returns true if this call changed the posture.
    pub fn lock(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        match self.state.write() {
            Ok(mut s) => {
                let changed = s.posture == Posture::Normal;
                s.posture = Posture::Lockdown;
                error!(reason = %reason, "kernel integrity lockdown");
                s.reasons.push(reason);
                changed
            }
            // Already fails closed through `posture()`.
            Err(_) => false,
        }
    }

    /// Run every integrity check. Returns the failures found; any failure
    /// locks the guard.
    pub fn self_check(
        &self,
        trust: &TrustEpochManager,
        policy: &PolicyConfiguration,
        audit: &dyn AuditSink,
    ) -> Vec<String> {
        let mut failures = Vec::new();
        if let Err(e) = trust.verify_integrity() {
            failures.push(format!("trust state: {}", e));
        }
        if let Err(e) = policy.validate() {
            failures.push(format!("policy configuration: {}", e));
        }
        if let Err(e) = audit.verify() {
            failures.push(format!("audit chain: {}", e));
        }

        if let Ok(mut s) = self.state.write() {
            s.last_check = Some(Utc::now());
        }
        for failure in &failures {
            self.lock(failure.clone());
        }
        if failures.is_empty() && self.is_locked() {
            warn!("self-check passed but guard remains in lockdown");
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ck_audit::{AuditAction, AuditRecord, MemoryAuditLog};
    use ck_trust::TrustState;

    fn healthy() -> (TrustEpochManager, PolicyConfiguration, MemoryAuditLog) {
        let mut audit = MemoryAuditLog::new();
        audit
            .append(&mut AuditRecord::new(AuditAction::Decision, "create_draft"))
            .unwrap();
        (
            TrustEpochManager::new(TrustState::default()).unwrap(),
            PolicyConfiguration::standard(),
            audit,
        )
    }

    #[test]
    fn healthy_state_stays_normal() {
        let guard = KernelIntegrityGuard::new();
        let (trust, policy, audit) = healthy();
        assert!(guard.self_check(&trust, &policy, &audit).is_empty());
        assert_eq!(guard.posture(), Posture::Normal);
        assert!(guard.last_check().is_some());
    }

    #[test]
    fn broken_policy_locks_down() {
        let guard = KernelIntegrityGuard::new();
        let (trust, mut policy, audit) = healthy();
        policy.version = 0;
        let failures = guard.self_check(&trust, &policy, &audit);
        assert_eq!(failures.len(), 1);
        assert!(guard.is_locked());
        assert!(guard.reasons()[0].starts_with("policy configuration"));
    }

    #[test]
    fn tampered_audit_locks_down() {
        let guard = KernelIntegrityGuard::new();
        let (trust, policy, mut audit) = healthy();
        audit
            .append(&mut AuditRecord::new(AuditAction::Completed, "create_draft"))
            .unwrap();
        audit.overwrite_line(0, "{}".to_string());
        assert!(!guard.self_check(&trust, &policy, &audit).is_empty());
        assert!(guard.is_locked());
    }

    #[test]
    fn lockdown_is_sticky_and_shared_between_clones() {
        let guard = KernelIntegrityGuard::new();
        let monitor = guard.clone();
        assert!(monitor.lock("tamper sensor tripped"));
        assert!(!monitor.lock("again"));
        assert!(guard.is_locked());

        let (trust, policy, audit) = healthy();
        assert!(guard.self_check(&trust, &policy, &audit).is_empty());
        assert!(guard.is_locked());
        assert_eq!(guard.reasons().len(), 2);
    }
}
