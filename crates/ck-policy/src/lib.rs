//! # ck-policy
//!
//! Maps risk to required approval for the capability kernel.
//!
//! The [`PolicyEngine`] turns a [`RiskAssessment`](ck_risk::RiskAssessment)
//! and an [`IntentType`] into a [`PolicyDecision`]: the approval the action
//! needs, the constraints attached to it, and which policies were applied.
//! The [`quorum`] module holds the fixed signer-type table per risk tier.
//!
//! ## Key invariants
//!
//! - **More restrictive wins**: the effective requirement is the field-wise
//!   maximum of the tier requirement and the intent's base requirement.
//! - **Audit is unconditional**: every decision carries an
//!   [`Constraint::AuditRequired`] obligation.
//! - **Authenticated updates only**: a [`PolicyConfiguration`] is replaced only
//!   with an unexpired token scoped to [`TokenScope::PolicyUpdate`] and a
//!   strictly newer version.

pub mod approval;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod intent;
pub mod quorum;
pub mod token;

pub use approval::{ApprovalLevel, ApprovalRequirement, ApprovalType};
pub use config::{PolicyConfiguration, TierLevels};
pub use decision::{Constraint, PolicyDecision};
pub use engine::PolicyEngine;
pub use error::PolicyError;
pub use intent::IntentType;
pub use quorum::{required_signer_types, validate_quorum, CollectedSignature, SignerType};
pub use token::{PolicyAuthorizationToken, TokenScope};
