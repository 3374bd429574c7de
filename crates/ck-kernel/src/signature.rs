// signature.rs — Verification of quorum signatures.
//
// A collected signature attests to one specific plan: the payload covers
// the plan's own signature plus the signer's identity, role, nonce, expiry
// and trust binding, so it cannot be lifted onto another plan or replayed
// under a different nonce.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};

use ck_plan::{SigningKey, ToolPlan};
use ck_policy::{CollectedSignature, SignerType};

/// Checks that a collected signature really came from its claimed signer.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, plan: &ToolPlan, signature: &CollectedSignature) -> bool;
}

/// Canonical bytes a signer signs for `plan`.
pub fn signature_payload(plan: &ToolPlan, signature: &CollectedSignature) -> Vec<u8> {
    format!(
        "ck-quorum/v1|{}|{}|{}|{}|{}|{}|{}|{}",
        plan.plan_id(),
        plan.signature(),
        signature.signer_id,
        signature.signer_type,
        signature.nonce,
        signature.expires_at.to_rfc3339(),
        signature.key_version,
        signature.trust_epoch,
    )
    .into_bytes()
}

/// A provisioned signer: its key and the roles it may sign as.
#[derive(Debug)]
struct Signer {
    roles: BTreeSet<SignerType>,
    key: SigningKey,
}

/// HMAC-SHA256 verifier holding one provisioned key per signer id.
///
/// Unknown signers never verify, and neither does a known signer claiming
/// a role it was not provisioned for.
#[derive(Debug, Default)]
pub struct HmacSignatureVerifier {
    signers: HashMap<String, Signer>,
}

impl HmacSignatureVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision `signer_id` to sign as `signer_type`.
    ///
    /// Provisioning the same id again adds the role and replaces the key.
    pub fn with_signer(
        mut self,
        signer_id: impl Into<String>,
        signer_type: SignerType,
        secret: &[u8],
    ) -> Self {
        let key = SigningKey::new(0, secret);
        match self.signers.entry(signer_id.into()) {
            Entry::Occupied(mut entry) => {
                let signer = entry.get_mut();
                signer.roles.insert(signer_type);
                signer.key = key;
            }
            Entry::Vacant(entry) => {
                entry.insert(Signer {
                    roles: BTreeSet::from([signer_type]),
                    key,
                });
            }
        }
        self
    }

    /// Roles `signer_id` is provisioned for, if it is known at all.
    pub fn roles(&self, signer_id: &str) -> Option<&BTreeSet<SignerType>> {
        self.signers.get(signer_id).map(|s| &s.roles)
    }

    /// Produce `signature_data` for a signature. Returns `None` for an
    /// unknown signer. Role membership is checked by `verify`, not here.
    pub fn sign(&self, plan: &ToolPlan, signature: &CollectedSignature) -> Option<String> {
        self.signers
            .get(&signature.signer_id)
            .map(|s| s.key.sign(&signature_payload(plan, signature)))
    }
}

impl SignatureVerifier for HmacSignatureVerifier {
    fn verify(&self, plan: &ToolPlan, signature: &CollectedSignature) -> bool {
        let Some(signer) = self.signers.get(&signature.signer_id) else {
            return false;
        };
        if !signer.roles.contains(&signature.signer_type) {
            return false;
        }
        signer
            .key
            .verify(&signature_payload(plan, signature), &signature.signature_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use ck_plan::{PlanIntent, Step, ToolPlanBuilder};
    use ck_policy::{IntentType, SignerType};

    fn plan() -> ToolPlan {
        ToolPlanBuilder::new()
            .intent(PlanIntent::new(IntentType::MakePayment, "Pay", "acme"))
            .originating_action("make_payment")
            .step(Step::mutation(1, "payments.transfer", "Transfer", None))
            .build(&SigningKey::new(1, b"device"))
            .unwrap()
    }

    fn unsigned(signer_id: &str) -> CollectedSignature {
        CollectedSignature {
            signer_id: signer_id.to_string(),
            signer_type: SignerType::OrganizationAuthority,
            signature_data: String::new(),
            signed_at: Utc::now(),
            nonce: "n-1".to_string(),
            expires_at: Utc::now() + Duration::minutes(5),
            key_version: 1,
            trust_epoch: 1,
        }
    }

    #[test]
    fn signed_signature_verifies() {
        let verifier = HmacSignatureVerifier::new().with_signer(
            "org-admin",
            SignerType::OrganizationAuthority,
            b"org-secret",
        );
        let plan = plan();
        let mut sig = unsigned("org-admin");
        sig.signature_data = verifier.sign(&plan, &sig).unwrap();
        assert!(verifier.verify(&plan, &sig));
    }

    #[test]
    fn signature_is_bound_to_plan_and_nonce() {
        let verifier = HmacSignatureVerifier::new().with_signer(
            "org-admin",
            SignerType::OrganizationAuthority,
            b"org-secret",
        );
        let plan_a = plan();
        let plan_b = plan();
        let mut sig = unsigned("org-admin");
        sig.signature_data = verifier.sign(&plan_a, &sig).unwrap();

        assert!(!verifier.verify(&plan_b, &sig));
        let mut renonced = sig.clone();
        renonced.nonce = "n-2".into();
        assert!(!verifier.verify(&plan_a, &renonced));
        let mut promoted = sig.clone();
        promoted.signer_type = SignerType::EmergencyOverride;
        assert!(!verifier.verify(&plan_a, &promoted));
    }

    #[test]
    fn signer_cannot_claim_an_unprovisioned_role() {
        let verifier = HmacSignatureVerifier::new()
            .with_signer("phone", SignerType::DeviceOperator, b"phone-secret");
        let plan = plan();
        let mut sig = unsigned("phone");
        sig.signer_type = SignerType::EmergencyOverride;
        sig.signature_data = verifier.sign(&plan, &sig).unwrap();
        assert!(!verifier.verify(&plan, &sig));

        sig.signer_type = SignerType::DeviceOperator;
        sig.signature_data = verifier.sign(&plan, &sig).unwrap();
        assert!(verifier.verify(&plan, &sig));
    }

    #[test]
    fn reprovisioning_adds_roles() {
        let verifier = HmacSignatureVerifier::new()
            .with_signer("admin", SignerType::OrganizationAuthority, b"secret")
            .with_signer("admin", SignerType::EmergencyOverride, b"secret");
        let roles = verifier.roles("admin").unwrap();
        assert!(roles.contains(&SignerType::OrganizationAuthority));
        assert!(roles.contains(&SignerType::EmergencyOverride));
        assert!(!roles.contains(&SignerType::DeviceOperator));
        assert!(verifier.roles("stranger").is_none());
    }

    #[test]
    fn unknown_signer_never_verifies() {
        let verifier = HmacSignatureVerifier::new();
        let plan = plan();
        let sig = unsigned("stranger");
        assert!(verifier.sign(&plan, &sig).is_none());
        assert!(!verifier.verify(&plan, &sig));
    }
}
