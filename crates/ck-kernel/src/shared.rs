// shared.rs — Thread-safe handle around a single CapabilityKernel.
//
// Every call takes the lock for the whole turn, so concurrent callers are
// serialized and a turn's side effects finish before the next decision.
// A poisoned lock means a turn panicked mid-flight; the handle then fails
// closed on every call.

use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use ck_plan::ToolPlan;
use ck_policy::{CollectedSignature, PolicyAuthorizationToken, PolicyConfiguration};
use ck_trust::TrustUpdate;

use crate::approval::ApprovalRecord;
use crate::error::KernelError;
use crate::guard::KernelIntegrityGuard;
use crate::kernel::CapabilityKernel;
use crate::phase::KernelPhase;
use crate::profile::ExecutionIntent;
use crate::result::{ExecutionResult, QuorumStatus};

#[derive(Debug, Clone)]
pub struct SharedKernel {
    inner: Arc<Mutex<CapabilityKernel>>,
    guard: KernelIntegrityGuard,
}

impl SharedKernel {
    pub fn new(kernel: CapabilityKernel) -> Self {
        let guard = kernel.guard().clone();
        Self {
            inner: Arc::new(Mutex::new(kernel)),
            guard,
        }
    }

    /// The kernel's integrity guard. Readable without taking the kernel
    /// lock, so a monitor can trip lockdown while a turn is running.
    pub fn guard(&self) -> &KernelIntegrityGuard {
        &self.guard
    }

    fn lock(&self) -> Result<MutexGuard<'_, CapabilityKernel>, KernelError> {
        self.inner.lock().map_err(|_| KernelError::Poisoned)
    }

    pub fn execute(&self, intent: &ExecutionIntent) -> ExecutionResult {
        match self.lock() {
            Ok(mut kernel) => kernel.execute(intent),
            Err(e) => ExecutionResult::rejected(KernelPhase::Idle, e.to_string(), Default::default()),
        }
    }

    pub fn authorize(&self, plan_id: Uuid, record: &ApprovalRecord) -> ExecutionResult {
        match self.lock() {
            Ok(mut kernel) => kernel.authorize(plan_id, record),
            Err(e) => ExecutionResult::rejected(KernelPhase::Idle, e.to_string(), Default::default()),
        }
    }

    pub fn deny(&self, plan_id: Uuid, reason: &str) -> Result<bool, KernelError> {
        Ok(self.lock()?.deny(plan_id, reason))
    }

    pub fn collect_signature(
        &self,
        plan_id: Uuid,
        signature: CollectedSignature,
    ) -> Result<QuorumStatus, KernelError> {
        self.lock()?.collect_signature(plan_id, signature)
    }

    pub fn get_pending_plans(&self) -> Result<Vec<ToolPlan>, KernelError> {
        Ok(self.lock()?.get_pending_plans())
    }

    /// False when the lock is poisoned, like any other refused update.
    pub fn update_policy(
        &self,
        config: PolicyConfiguration,
        token: &PolicyAuthorizationToken,
    ) -> bool {
        self.lock()
            .map(|mut k| k.update_policy(config, token))
            .unwrap_or(false)
    }

    pub fn update_trust(&self, update: &TrustUpdate, token: &PolicyAuthorizationToken) -> bool {
        self.lock()
            .map(|mut k| k.update_trust(update, token))
            .unwrap_or(false)
    }

    pub fn run_self_check(&self) -> Result<Vec<String>, KernelError> {
        Ok(self.lock()?.run_self_check())
    }

    /// Run `f` with exclusive access to the kernel.
    pub fn with_kernel<R>(
        &self,
        f: impl FnOnce(&mut CapabilityKernel) -> R,
    ) -> Result<R, KernelError> {
        let mut kernel = self.lock()?;
        Ok(f(&mut kernel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ck_plan::SigningKey;
    use std::thread;

    fn shared() -> SharedKernel {
        SharedKernel::new(CapabilityKernel::in_memory(SigningKey::new(1, b"k")).unwrap())
    }

    #[test]
    fn concurrent_turns_are_serialized() {
        let kernel = shared();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let k = kernel.clone();
                thread::spawn(move || k.execute(&ExecutionIntent::new("create_reminder")))
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap().is_success());
        }
        let verified = kernel
            .with_kernel(|k| k.audit().verify())
            .unwrap()
            .unwrap();
        assert_eq!(verified, 8);
    }

    #[test]
    fn outside_lockdown_blocks_execution() {
        let kernel = shared();
        kernel.guard().lock("tamper sensor tripped");
        let result = kernel.execute(&ExecutionIntent::new("create_draft"));
        assert!(!result.is_success());
        assert!(result.message.contains("lockdown"));
        assert!(result.report.is_none());
    }

    #[test]
    fn poisoned_lock_fails_closed() {
        let kernel = shared();
        let k = kernel.clone();
        let _ = thread::spawn(move || {
            let _held = k.inner.lock().unwrap();
            panic!("turn panicked");
        })
        .join();
        let result = kernel.execute(&ExecutionIntent::new("create_draft"));
        assert!(!result.is_success());
        assert!(result.message.contains("poisoned"));
        assert!(matches!(kernel.get_pending_plans(), Err(KernelError::Poisoned)));
    }
}
