//! # ck-risk
//!
//! Risk scoring for the capability kernel.
//!
//! The [`RiskEngine`] turns a [`RiskContext`] (booleans and counts describing
//! what an action touches) into a [`RiskAssessment`]: six independent
//! dimension scores, a weighted total clamped to `0..=100`, a [`RiskTier`],
//! and the list of reasons that produced the score.
//!
//! ## Key invariants
//!
//! - **Pure**: no I/O, no clock, no randomness. The same context always
//!   yields the same score, tier, and reasons.
//! - **Fixed tier bands**: low 0–20, medium 21–50, high 51–75, critical 76–100.
//! - **Irreversibility penalty**: an irreversible action with no rollback
//!   mechanism adds exactly [`IRREVERSIBLE_PENALTY`] to the base score
//!   before tier derivation (clamped at 100).

pub mod assessment;
pub mod context;
pub mod engine;

pub use assessment::{RiskAssessment, RiskDimension, RiskDimensions, RiskReason, RiskTier};
pub use context::{Reversibility, RiskContext};
pub use engine::{reversibility_modifier, RiskEngine, RiskWeights, IRREVERSIBLE_PENALTY};
