// kernel.rs — CapabilityKernel: the authorize-then-execute state machine.
//
// One kernel instance owns the pending-plan registry, the trust authority,
// the consumed-token ledger and the audit sink. Every mutating operation
// takes `&mut self`, so a turn (including any execution side effects)
// finishes before the next one starts. Wrap the kernel in `SharedKernel`
// to share it between threads.
//
// Fail-closed throughout: when a check cannot be completed the action is
// denied, and an audit record that cannot be written blocks execution.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use ck_audit::{AuditAction, AuditLedger, AuditRecord, AuditSink, MemoryAuditLog};
use ck_plan::{SigningKey, ToolPlan};
use ck_policy::{
    validate_quorum, CollectedSignature, Constraint, IntentType, PolicyAuthorizationToken,
    PolicyConfiguration, PolicyDecision, PolicyEngine, TokenScope,
};
use ck_risk::{RiskAssessment, RiskEngine};
use ck_trust::{ConsumedTokenStore, TrustEpochManager, TrustState, TrustUpdate};

use crate::approval::ApprovalRecord;
use crate::config::KernelConfig;
use crate::error::KernelError;
use crate::executor::{DryRunExecutor, ProbeRunner, StepExecutor};
use crate::guard::KernelIntegrityGuard;
use crate::phase::KernelPhase;
use crate::profile::{ExecutionIntent, IntentProfiler};
use crate::report::{run_steps, ExecutionReport};
use crate::result::{ExecutionResult, ExecutionStatus, QuorumStatus, VerificationOutcome};
use crate::signature::{HmacSignatureVerifier, SignatureVerifier};

/// A plan parked until its approval arrives.
#[derive(Debug, Clone)]
struct PendingPlan {
    plan: ToolPlan,
    risk: RiskAssessment,
    decision: PolicyDecision,
    signatures: Vec<CollectedSignature>,
    parked_at: DateTime<Utc>,
}

/// Why an invocation stopped early. Always carries a message.
#[derive(Debug)]
struct Halt(String);

impl Halt {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<KernelError> for Halt {
    fn from(e: KernelError) -> Self {
        Self(e.to_string())
    }
}

type Outcome = Result<(ExecutionStatus, String), Halt>;

/// Decision trail accumulated by one invocation.
#[derive(Debug, Default)]
struct Run {
    plan: Option<ToolPlan>,
    risk: Option<RiskAssessment>,
    decision: Option<PolicyDecision>,
    verification: Option<VerificationOutcome>,
    report: Option<ExecutionReport>,
}

impl Run {
    fn subject(&self, fallback: &str) -> String {
        self.plan
            .as_ref()
            .map(|p| p.intent().intent_type.to_string())
            .unwrap_or_else(|| fallback.to_string())
    }

    fn record(&self, action: AuditAction, subject: &str) -> AuditRecord {
        audit_record(
            action,
            subject,
            self.plan.as_ref(),
            self.risk.as_ref(),
            self.decision.as_ref(),
        )
    }
}

fn audit_record(
    action: AuditAction,
    subject: &str,
    plan: Option<&ToolPlan>,
    risk: Option<&RiskAssessment>,
    decision: Option<&PolicyDecision>,
) -> AuditRecord {
    let mut record = AuditRecord::new(action, subject);
    if let Some(plan) = plan {
        record = record.with_plan(plan.plan_id(), plan.content_digest());
    }
    if let Some(risk) = risk {
        let tier = decision.map(|d| d.tier).unwrap_or(risk.tier);
        record = record.with_risk(risk.score, tier.to_string());
    }
    let retention = decision.and_then(|d| {
        d.constraints.iter().find_map(|c| match c {
            Constraint::AuditRequired { retention_days } => Some(*retention_days),
            _ => None,
        })
    });
    if let Some(days) = retention {
        record = record.with_retention_days(days);
    }
    record
}

fn quorum_status(decision: &PolicyDecision, signatures: &[CollectedSignature]) -> QuorumStatus {
    let requirement = &decision.approval_requirement;
    if !requirement.requires_quorum() {
        return QuorumStatus::default();
    }
    QuorumStatus {
        required: true,
        missing_signers: validate_quorum(signatures, decision.tier).unwrap_or_default(),
        distinct_signers: signatures
            .iter()
            .map(|s| s.signer_id.as_str())
            .collect::<BTreeSet<_>>()
            .len(),
        required_signers: requirement.multi_signer_count,
    }
}

fn describe_quorum(status: &QuorumStatus) -> String {
    let missing: Vec<String> = status.missing_signers.iter().map(|s| s.to_string()).collect();
    format!(
        "missing signer types [{}], {} of {} distinct signers",
        missing.join(", "),
        status.distinct_signers,
        status.required_signers
    )
}

pub struct CapabilityKernel {
    risk: RiskEngine,
    policy: PolicyEngine,
    trust: TrustEpochManager,
    tokens: ConsumedTokenStore,
    audit: Box<dyn AuditSink>,
    signing_key: SigningKey,
    profiler: IntentProfiler,
    probes: Arc<dyn ProbeRunner>,
    executor: Arc<dyn StepExecutor>,
    verifier: Arc<dyn SignatureVerifier>,
    guard: KernelIntegrityGuard,
    pending: BTreeMap<Uuid, PendingPlan>,
    phase: KernelPhase,
    trail: Vec<KernelPhase>,
}

impl std::fmt::Debug for CapabilityKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityKernel")
            .field("phase", &self.phase)
            .field("trust", self.trust.state())
            .field("policy_version", &self.policy.configuration().version)
            .field("pending", &self.pending.len())
            .field("posture", &self.guard.posture())
            .finish()
    }
}

impl CapabilityKernel {
    /// Assemble a kernel from its stateful parts.
    ///
    /// Defaults: standard policy, dry-run probes and executor, and a
    /// signature verifier with no provisioned signers (so no quorum can be
    /// met until one is configured).
    pub fn new(
        signing_key: SigningKey,
        trust: TrustEpochManager,
        tokens: ConsumedTokenStore,
        audit: Box<dyn AuditSink>,
    ) -> Result<Self, KernelError> {
        trust.verify_integrity()?;
        check_signing_key(&trust, &signing_key)?;
        Ok(Self {
            risk: RiskEngine::new(),
            policy: PolicyEngine::new(),
            trust,
            tokens,
            audit,
            signing_key,
            profiler: IntentProfiler::default(),
            probes: Arc::new(DryRunExecutor),
            executor: Arc::new(DryRunExecutor),
            verifier: Arc::new(HmacSignatureVerifier::new()),
            guard: KernelIntegrityGuard::new(),
            pending: BTreeMap::new(),
            phase: KernelPhase::Idle,
            trail: Vec::new(),
        })
    }

    /// A kernel whose trust state, token ledger and audit log live only in
    /// memory. Trust starts at epoch 1 with the signing key active.
    pub fn in_memory(signing_key: SigningKey) -> Result<Self, KernelError> {
        let trust = TrustEpochManager::new(TrustState {
            active_key_version: signing_key.key_version(),
            ..TrustState::default()
        })?;
        Self::new(
            signing_key,
            trust,
            ConsumedTokenStore::in_memory(),
            Box::new(MemoryAuditLog::new()),
        )
    }

    /// Open durable state per `config`, then run the integrity self-check.
    ///
    /// On first use the trust state is seeded with the signing key's
    /// version at epoch 1.
    pub fn open(config: &KernelConfig, signing_key: SigningKey) -> Result<Self, KernelError> {
        let trust = TrustEpochManager::open(
            &config.trust_state,
            TrustState {
                active_key_version: signing_key.key_version(),
                ..TrustState::default()
            },
        )?;
        let tokens = ConsumedTokenStore::open(&config.token_store)?;
        let audit = AuditLedger::open(&config.audit_log)?;
        let mut kernel = Self::new(signing_key, trust, tokens, Box::new(audit))?
            .with_policy(config.policy()?)?
            .with_internal_domains(&config.internal_domains)?;
        let failures = kernel.run_self_check();
        if !failures.is_empty() {
            warn!(failures = failures.len(), "kernel opened in lockdown");
        }
        info!(
            state_dir = %config.state_dir.display(),
            key_version = kernel.trust.active_key_version(),
            epoch = kernel.trust.trust_epoch(),
            "capability kernel opened"
        );
        Ok(kernel)
    }

    pub fn with_policy(mut self, config: PolicyConfiguration) -> Result<Self, KernelError> {
        self.policy = PolicyEngine::with_configuration(config)?;
        Ok(self)
    }

    pub fn with_risk_engine(mut self, engine: RiskEngine) -> Self {
        self.risk = engine;
        self
    }

    pub fn with_internal_domains<I, S>(mut self, patterns: I) -> Result<Self, KernelError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.profiler = IntentProfiler::new(patterns)?;
        Ok(self)
    }

    pub fn with_probe_runner(mut self, runner: Arc<dyn ProbeRunner>) -> Self {
        self.probes = runner;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn StepExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_signature_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Share a guard with an outside monitor.
    pub fn with_guard(mut self, guard: KernelIntegrityGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn phase(&self) -> KernelPhase {
        self.phase
    }

    pub fn guard(&self) -> &KernelIntegrityGuard {
        &self.guard
    }

    pub fn trust(&self) -> &TrustEpochManager {
        &self.trust
    }

    pub fn policy(&self) -> &PolicyConfiguration {
        self.policy.configuration()
    }

    pub fn tokens(&self) -> &ConsumedTokenStore {
        &self.tokens
    }

    pub fn audit(&self) -> &dyn AuditSink {
        self.audit.as_ref()
    }

    pub fn signing_key_version(&self) -> u64 {
        self.signing_key.key_version()
    }

    /// Replace the plan-signing key after a rotation. The key must belong
    /// to the active, unrevoked generation.
    pub fn install_signing_key(&mut self, key: SigningKey) -> Result<(), KernelError> {
        check_signing_key(&self.trust, &key)?;
        info!(key_version = key.key_version(), "plan signing key installed");
        self.signing_key = key;
        Ok(())
    }

    /// Plans awaiting approval, oldest first.
    pub fn get_pending_plans(&self) -> Vec<ToolPlan> {
        let mut pending: Vec<&PendingPlan> = self.pending.values().collect();
        pending.sort_by_key(|p| p.parked_at);
        pending.into_iter().map(|p| p.plan.clone()).collect()
    }

    /// Quorum progress of a pending plan.
    pub fn pending_quorum(&self, plan_id: Uuid) -> Option<QuorumStatus> {
        self.pending
            .get(&plan_id)
            .map(|p| quorum_status(&p.decision, &p.signatures))
    }

    /// Run the full integrity self-check. Returns the failures found; any
    /// failure leaves the kernel in lockdown.
    pub fn run_self_check(&mut self) -> Vec<String> {
        let was_locked = self.guard.is_locked();
        let failures =
            self.guard
                .self_check(&self.trust, self.policy.configuration(), self.audit.as_ref());
        if !was_locked && self.guard.is_locked() {
            let record = AuditRecord::new(AuditAction::Lockdown, "self_check")
                .with_message(failures.join("; "));
            self.append_best_effort(record);
        }
        failures
    }

    // ── Execute ──────────────────────────────────────────────────────

    /// Run an intent through the pipeline: plan, probe, score, decide,
    /// verify, then either execute (auto-approve) or park for approval.
    pub fn execute(&mut self, intent: &ExecutionIntent) -> ExecutionResult {
        let started = Instant::now();
        let mut run = Run::default();
        let outcome = self.execute_pipeline(intent, &mut run);
        let subject = run.subject(intent.action.trim());
        self.settle(run, started, outcome, &subject)
    }

    fn execute_pipeline(&mut self, intent: &ExecutionIntent, run: &mut Run) -> Outcome {
        self.begin(KernelPhase::Intake)?;
        let action = intent.action.trim();
        if action.is_empty() {
            return Err(Halt::new("rejected at intake: action is empty"));
        }
        let intent_type = IntentType::from_str(action)
            .map_err(|e| Halt::new(format!("rejected at intake: {}", e)))?;
        debug!(action = %intent_type, "intake accepted");

        self.advance(KernelPhase::ToolPlanning)?;
        let profile = self.profiler.profile(intent_type, intent.target.as_deref());
        let plan = profile
            .build_plan(action, &self.signing_key)
            .map_err(KernelError::from)?;
        let plan = &*run.plan.insert(plan);

        self.advance(KernelPhase::Probes)?;
        self.run_probes(plan)?;

        self.advance(KernelPhase::RiskAssessment)?;
        let risk = &*run.risk.insert(self.risk.assess(&profile.context));
        debug!(plan_id = %plan.plan_id(), score = risk.score, tier = %risk.tier, "risk assessed");

        self.advance(KernelPhase::PolicyMapping)?;
        let decision = &*run.decision.insert(self.policy.decide(risk, intent_type));
        debug!(
            plan_id = %plan.plan_id(),
            tier = %decision.tier,
            level = %decision.level,
            "policy decided"
        );
        let subject = intent_type.to_string();
        self.append_audit(audit_record(
            AuditAction::Decision,
            &subject,
            Some(plan),
            Some(risk),
            Some(decision),
        ))?;

        self.advance(KernelPhase::Verification)?;
        let verification = &*run.verification.insert(self.verify_plan(plan, decision, &[]));
        if !verification.passed() {
            return Err(Halt::new(format!(
                "verification failed: {}",
                verification.failures.join("; ")
            )));
        }

        if decision.is_auto_approve() && verification.quorum_satisfied() {
            let (status, message, report) = self.execute_plan(plan, risk, decision)?;
            run.report = Some(report);
            return Ok((status, message));
        }

        self.advance(KernelPhase::AwaitingApproval)?;
        let plan_id = plan.plan_id();
        let mut message = format!(
            "{} requires {} ({} tier, score {})",
            intent_type, decision.level, decision.tier, risk.score
        );
        let quorum = verification.quorum();
        if quorum.required {
            message.push_str(&format!("; quorum: {}", describe_quorum(&quorum)));
        }
        self.append_audit(
            audit_record(
                AuditAction::Pending,
                &subject,
                Some(plan),
                Some(risk),
                Some(decision),
            )
            .with_message(message.clone()),
        )?;
        self.pending.insert(
            plan_id,
            PendingPlan {
                plan: plan.clone(),
                risk: risk.clone(),
                decision: decision.clone(),
                signatures: Vec::new(),
                parked_at: Utc::now(),
            },
        );
        info!(plan_id = %plan_id, action = %intent_type, tier = %decision.tier, "plan awaiting approval");
        Ok((ExecutionStatus::PendingApproval, message))
    }

    // ── Authorize / deny ─────────────────────────────────────────────

    /// Resolve a pending plan with an approval record.
    ///
    /// The plan leaves the pending registry on the first call whatever the
    /// outcome; a second call for the same id fails.
    pub fn authorize(&mut self, plan_id: Uuid, record: &ApprovalRecord) -> ExecutionResult {
        let started = Instant::now();
        let mut run = Run::default();
        let outcome = self.authorize_pipeline(plan_id, record, &mut run);
        let subject = run.subject("authorize");
        self.settle(run, started, outcome, &subject)
    }

    fn authorize_pipeline(
        &mut self,
        plan_id: Uuid,
        record: &ApprovalRecord,
        run: &mut Run,
    ) -> Outcome {
        self.begin(KernelPhase::AwaitingApproval)?;
        let pending = self
            .pending
            .remove(&plan_id)
            .ok_or_else(|| Halt::new(format!("no pending plan with id {}", plan_id)))?;
        let PendingPlan {
            plan,
            risk,
            decision,
            signatures,
            ..
        } = pending;
        let plan = &*run.plan.insert(plan);
        let risk = &*run.risk.insert(risk);
        let decision = &*run.decision.insert(decision);
        let subject = plan.intent().intent_type.to_string();

        if !record.approved {
            let reason = record.reason.as_deref().unwrap_or("no reason given");
            let message = format!(
                "plan {} denied by {}: {}",
                plan_id, record.approver_identifier, reason
            );
            warn!(plan_id = %plan_id, approver = %record.approver_identifier, "approval declined");
            self.append_best_effort(
                audit_record(AuditAction::Denied, &subject, Some(plan), Some(risk), Some(decision))
                    .with_message(message.clone()),
            );
            return Ok((ExecutionStatus::Failed, message));
        }

        if let Err(reason) = self.validate_approval(plan_id, record, decision) {
            let message = format!("approval for plan {} rejected: {}", plan_id, reason);
            warn!(plan_id = %plan_id, reason = %reason, "approval rejected");
            self.append_best_effort(
                audit_record(AuditAction::Denied, &subject, Some(plan), Some(risk), Some(decision))
                    .with_message(message.clone()),
            );
            return Ok((ExecutionStatus::Failed, message));
        }

        self.advance(KernelPhase::Verification)?;
        let verification = &*run
            .verification
            .insert(self.verify_plan(plan, decision, &signatures));
        if !verification.passed() {
            return Err(Halt::new(format!(
                "verification failed: {}",
                verification.failures.join("; ")
            )));
        }
        let quorum = verification.quorum();
        if !quorum.is_satisfied() {
            return Err(Halt::new(format!(
                "quorum not met: {}",
                describe_quorum(&quorum)
            )));
        }

        self.append_audit(
            audit_record(AuditAction::Approval, &subject, Some(plan), Some(risk), Some(decision))
                .with_message(format!(
                    "{} approval by {}",
                    record.approval_type, record.approver_identifier
                ))
                .with_metadata(serde_json::json!({
                    "approver": record.approver_identifier,
                    "approval_type": record.approval_type,
                    "signers": signatures.iter().map(|s| &s.signer_id).collect::<Vec<_>>(),
                })),
        )?;

        let (status, message, report) = self.execute_plan(plan, risk, decision)?;
        run.report = Some(report);
        Ok((status, message))
    }

    /// Record-level, trust and replay checks for an approval.
    fn validate_approval(
        &mut self,
        plan_id: Uuid,
        record: &ApprovalRecord,
        decision: &PolicyDecision,
    ) -> Result<(), String> {
        let credential = record.check_shape(plan_id, &decision.approval_requirement, Utc::now())?;
        if !self
            .trust
            .validate_token_binding(credential.key_version, credential.trust_epoch)
        {
            return Err(format!(
                "credential bound to key version {} epoch {}, active is key version {} epoch {}",
                credential.key_version,
                credential.trust_epoch,
                self.trust.active_key_version(),
                self.trust.trust_epoch()
            ));
        }
        match self.tokens.consume(&credential.token_id, credential.expires_at) {
            Ok(true) => Ok(()),
            Ok(false) => Err(format!(
                "credential {} was already used",
                credential.token_id
            )),
            Err(e) => Err(format!("token ledger unavailable: {}", e)),
        }
    }

    /// Drop a pending plan. Returns false if no such plan is pending.
    pub fn deny(&mut self, plan_id: Uuid, reason: &str) -> bool {
        let Some(pending) = self.pending.remove(&plan_id) else {
            return false;
        };
        warn!(plan_id = %plan_id, reason, "pending plan denied");
        let subject = pending.plan.intent().intent_type.to_string();
        let record = audit_record(
            AuditAction::Denied,
            &subject,
            Some(&pending.plan),
            Some(&pending.risk),
            Some(&pending.decision),
        )
        .with_message(format!("denied: {}", reason));
        self.append_best_effort(record);
        true
    }

    // ── Quorum signatures ────────────────────────────────────────────

    /// Add a signature to a pending plan.
    ///
    /// The signature must be unexpired, bound to the current key and epoch,
    /// verify against the plan, and carry a nonce never seen before. Each
    /// signer id may sign a plan once. Returns the plan's quorum progress.
    pub fn collect_signature(
        &mut self,
        plan_id: Uuid,
        signature: CollectedSignature,
    ) -> Result<QuorumStatus, KernelError> {
        let reject = |reason: String| KernelError::SignatureRejected {
            signer_id: signature.signer_id.clone(),
            reason,
        };
        let pending = self
            .pending
            .get(&plan_id)
            .ok_or(KernelError::UnknownPlan(plan_id))?;

        if signature.signer_id.trim().is_empty() {
            return Err(reject("signer id is empty".to_string()));
        }
        if pending
            .signatures
            .iter()
            .any(|s| s.signer_id == signature.signer_id)
        {
            return Err(reject("signer has already signed this plan".to_string()));
        }
        if signature.expires_at <= Utc::now() {
            return Err(reject(format!("signature expired at {}", signature.expires_at)));
        }
        if !self
            .trust
            .validate_token_binding(signature.key_version, signature.trust_epoch)
        {
            return Err(reject(format!(
                "bound to key version {} epoch {}, not the active generation",
                signature.key_version, signature.trust_epoch
            )));
        }
        if !self.verifier.verify(&pending.plan, &signature) {
            return Err(reject("signature does not verify".to_string()));
        }
        if !self.tokens.consume(&signature.nonce, signature.expires_at)? {
            return Err(reject(format!("nonce {} was already used", signature.nonce)));
        }

        let record = audit_record(
            AuditAction::SignatureCollected,
            &pending.plan.intent().intent_type.to_string(),
            Some(&pending.plan),
            Some(&pending.risk),
            Some(&pending.decision),
        )
        .with_message(format!(
            "{} signed as {}",
            signature.signer_id, signature.signer_type
        ));
        self.append_audit(record)?;

        info!(
            plan_id = %plan_id,
            signer_id = %signature.signer_id,
            signer_type = %signature.signer_type,
            "signature collected"
        );
        let pending = self
            .pending
            .get_mut(&plan_id)
            .ok_or(KernelError::UnknownPlan(plan_id))?;
        pending.signatures.push(signature);
        Ok(quorum_status(&pending.decision, &pending.signatures))
    }

    // ── Authenticated updates ────────────────────────────────────────

    /// Replace the policy configuration.
    ///
    /// Requires an unexpired token scoped to `policy_update`, bound to the
    /// current key and epoch, never used before, and a strictly newer
    /// configuration version. Returns false and changes nothing otherwise.
    pub fn update_policy(
        &mut self,
        config: PolicyConfiguration,
        token: &PolicyAuthorizationToken,
    ) -> bool {
        let now = Utc::now();
        if let Err(e) = self.policy.check_update(&config, token, now) {
            warn!(token_id = %token.token_id, error = %e, "policy update rejected");
            return false;
        }
        if !self.consume_update_token(token) {
            return false;
        }
        let from = self.policy.configuration().version;
        let record = AuditRecord::new(AuditAction::PolicyUpdate, "update_policy")
            .with_message(format!("policy {} v{} -> v{}", config.name, from, config.version))
            .with_metadata(serde_json::json!({
                "token_id": token.token_id,
                "from_version": from,
                "to_version": config.version,
            }));
        if let Err(e) = self.append_audit(record) {
            error!(error = %e, "policy update not applied: audit unavailable");
            return false;
        }
        self.policy.update_policy(config, token, now)
    }

    /// Apply a key rotation, epoch advance, or revocation from the key
    /// management authority. Requires a fresh `trust_update` token bound to
    /// the current generation.
    pub fn update_trust(&mut self, update: &TrustUpdate, token: &PolicyAuthorizationToken) -> bool {
        if let Err(e) = token.check(TokenScope::TrustUpdate, Utc::now()) {
            warn!(token_id = %token.token_id, error = %e, "trust update rejected");
            return false;
        }
        if update.is_empty() {
            warn!(token_id = %token.token_id, "trust update rejected: nothing to change");
            return false;
        }
        let after = match self.trust.preview_update(update) {
            Ok(state) => state,
            Err(e) => {
                warn!(token_id = %token.token_id, error = %e, "trust update rejected");
                return false;
            }
        };
        if !self.consume_update_token(token) {
            return false;
        }
        let before = self.trust.state();
        let record = AuditRecord::new(AuditAction::TrustUpdate, "update_trust")
            .with_message(format!(
                "key version {} -> {}, epoch {} -> {}",
                before.active_key_version,
                after.active_key_version,
                before.trust_epoch,
                after.trust_epoch
            ))
            .with_metadata(serde_json::json!({
                "token_id": token.token_id,
                "revoked": after.revoked_key_versions,
            }));
        if let Err(e) = self.append_audit(record) {
            error!(error = %e, "trust update not applied: audit unavailable");
            return false;
        }
        match self.trust.apply_update(update) {
            Ok(_) => true,
            Err(e) => {
                error!(token_id = %token.token_id, error = %e, "trust update failed after audit");
                false
            }
        }
    }

    /// Binding and single-use checks shared by both update paths.
    fn consume_update_token(&mut self, token: &PolicyAuthorizationToken) -> bool {
        if !self
            .trust
            .validate_token_binding(token.key_version, token.trust_epoch)
        {
            warn!(token_id = %token.token_id, "update token bound to a stale key or epoch");
            return false;
        }
        match self.tokens.consume(&token.token_id, token.expires_at()) {
            Ok(true) => true,
            Ok(false) => {
                warn!(token_id = %token.token_id, "update token replay rejected");
                false
            }
            Err(e) => {
                error!(token_id = %token.token_id, error = %e, "token ledger unavailable");
                false
            }
        }
    }

    // ── Pipeline pieces ──────────────────────────────────────────────

    fn run_probes(&self, plan: &ToolPlan) -> Result<(), Halt> {
        for probe in plan.probes() {
            match self.probes.run(plan, probe) {
                Ok(()) => debug!(plan_id = %plan.plan_id(), probe = %probe.description, "probe passed"),
                Err(e) if probe.is_required => {
                    warn!(plan_id = %plan.plan_id(), error = %e, "required probe failed");
                    return Err(Halt::new(format!("required probe failed: {}", e)));
                }
                Err(e) => {
                    warn!(plan_id = %plan.plan_id(), error = %e, "advisory probe failed");
                }
            }
        }
        Ok(())
    }

    fn verify_plan(
        &self,
        plan: &ToolPlan,
        decision: &PolicyDecision,
        signatures: &[CollectedSignature],
    ) -> VerificationOutcome {
        let mut failures = Vec::new();

        let signature_valid = plan.verify_signature(&self.signing_key);
        if !signature_valid {
            failures.push("plan signature does not verify".to_string());
        }
        let key_binding_valid = plan.key_version() == self.trust.active_key_version()
            && !self.trust.is_key_revoked(plan.key_version());
        if !key_binding_valid {
            failures.push(format!(
                "plan signed with key version {}, active is {}",
                plan.key_version(),
                self.trust.active_key_version()
            ));
        }
        let trust_consistent = match self.trust.verify_integrity() {
            Ok(()) => true,
            Err(e) => {
                failures.push(e.to_string());
                false
            }
        };

        let quorum = quorum_status(decision, signatures);
        VerificationOutcome {
            signature_valid,
            key_binding_valid,
            trust_consistent,
            quorum_required: quorum.required,
            missing_signers: quorum.missing_signers,
            distinct_signers: quorum.distinct_signers,
            required_signers: quorum.required_signers,
            failures,
        }
    }

    /// Consult the guard, then run the steps. Halts without side effects if
    /// the kernel is locked down.
    fn execute_plan(
        &mut self,
        plan: &ToolPlan,
        risk: &RiskAssessment,
        decision: &PolicyDecision,
    ) -> Result<(ExecutionStatus, String, ExecutionReport), Halt> {
        if let Err(e) = self.trust.verify_integrity() {
            self.enter_lockdown(format!("trust state: {}", e));
        }
        if self.guard.is_locked() {
            return Err(Halt::new(format!(
                "integrity guard is in lockdown: {}",
                self.guard.reasons().join("; ")
            )));
        }

        self.advance(KernelPhase::Execution)?;
        let report = run_steps(plan, self.executor.as_ref());
        let intent = plan.intent().intent_type;

        let (status, action, message) = if report.succeeded() {
            info!(plan_id = %plan.plan_id(), action = %intent, score = risk.score, "plan executed");
            (
                ExecutionStatus::Completed,
                AuditAction::Completed,
                format!(
                    "{} completed ({} steps)",
                    intent,
                    plan.execution_steps().len()
                ),
            )
        } else {
            let failed = report
                .failed_step()
                .map(|s| format!("step {} ({})", s.order, s.action))
                .unwrap_or_else(|| "a step".to_string());
            let mut message = format!("{} failed at {}", intent, failed);
            if !report.rolled_back.is_empty() {
                message.push_str(&format!("; rolled back steps {:?}", report.rolled_back));
            }
            if report.partial_failure {
                message.push_str(&format!(
                    "; partial failure, unrecoverable steps {:?}",
                    report.unrecoverable
                ));
            }
            warn!(plan_id = %plan.plan_id(), partial = report.partial_failure, "plan execution failed");
            (ExecutionStatus::Failed, AuditAction::Failed, message)
        };

        let record = audit_record(
            action,
            &intent.to_string(),
            Some(plan),
            Some(risk),
            Some(decision),
        )
        .with_message(message.clone())
        .with_metadata(serde_json::to_value(&report).unwrap_or_default());
        self.append_best_effort(record);
        Ok((status, message, report))
    }

    // ── State machine bookkeeping ────────────────────────────────────

    fn begin(&mut self, first: KernelPhase) -> Result<(), KernelError> {
        if self.phase != KernelPhase::Idle {
            warn!(phase = %self.phase, "previous turn did not return to idle");
            self.phase = KernelPhase::Idle;
        }
        self.trail.clear();
        self.trail.push(KernelPhase::Idle);
        self.advance(first)
    }

    fn advance(&mut self, next: KernelPhase) -> Result<(), KernelError> {
        if !self.phase.can_transition_to(next) {
            return Err(KernelError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        debug!(from = %self.phase, to = %next, "phase transition");
        self.phase = next;
        self.trail.push(next);
        Ok(())
    }

    /// Record a halt, walk the machine back to idle, and build the result.
    fn settle(
        &mut self,
        run: Run,
        started: Instant,
        outcome: Outcome,
        subject: &str,
    ) -> ExecutionResult {
        let reached = self.phase;
        let (status, message) = match outcome {
            Ok(done) => done,
            Err(Halt(message)) => {
                warn!(phase = %reached, subject, message = %message, "invocation halted");
                let record = run
                    .record(AuditAction::Failed, subject)
                    .with_message(format!("halted in {}: {}", reached, message));
                self.append_best_effort(record);
                (ExecutionStatus::Failed, message)
            }
        };

        if self.phase.can_transition_to(KernelPhase::Complete) {
            self.phase = KernelPhase::Complete;
            self.trail.push(KernelPhase::Complete);
        }
        self.phase = KernelPhase::Idle;
        self.trail.push(KernelPhase::Idle);

        ExecutionResult {
            status,
            phase: reached,
            plan_id: run.plan.as_ref().map(ToolPlan::plan_id),
            plan: run.plan,
            risk: run.risk,
            decision: run.decision,
            verification: run.verification,
            report: run.report,
            elapsed: started.elapsed(),
            message,
            phase_trail: std::mem::take(&mut self.trail),
        }
    }

    fn append_audit(&mut self, mut record: AuditRecord) -> Result<(), KernelError> {
        self.audit.append(&mut record)?;
        Ok(())
    }

    fn append_best_effort(&mut self, mut record: AuditRecord) {
        if let Err(e) = self.audit.append(&mut record) {
            error!(action = %record.action, error = %e, "audit record lost");
        }
    }

    fn enter_lockdown(&mut self, reason: String) {
        if self.guard.lock(reason.clone()) {
            self.append_best_effort(
                AuditRecord::new(AuditAction::Lockdown, "integrity").with_message(reason),
            );
        }
    }
}

fn check_signing_key(trust: &TrustEpochManager, key: &SigningKey) -> Result<(), KernelError> {
    if key.key_version() != trust.active_key_version() || trust.is_key_revoked(key.key_version()) {
        return Err(KernelError::SigningKeyMismatch {
            key_version: key.key_version(),
            active: trust.active_key_version(),
        });
    }
    Ok(())
}
