//! # ck-plan
//!
//! Signed execution plans.
//!
//! A [`ToolPlan`] describes what an authorized action will do: the read-only
//! [`Probe`]s that must pass first, the ordered [`Step`]s (with rollback
//! actions for mutations), the risk score, and how reversible the whole thing
//! is. Plans are produced only by [`ToolPlanBuilder::build`], which signs every
//! field with a [`SigningKey`]; [`ToolPlan::verify_signature`] recomputes the
//! keyed digest so any later change to any field is detected.
//!
//! ## Quick Example
//!
//! ```rust
//! use ck_plan::{PlanIntent, SigningKey, Step, ToolPlanBuilder};
//! use ck_policy::IntentType;
//!
//! let key = SigningKey::new(1, b"device-secret");
//! let plan = ToolPlanBuilder::new()
//!     .intent(PlanIntent::new(IntentType::CreateDraft, "Create a draft", "inbox"))
//!     .originating_action("create_draft")
//!     .step(Step::mutation(1, "drafts.create", "Create the draft", Some("drafts.delete")))
//!     .build(&key)
//!     .unwrap();
//! assert!(plan.verify_signature(&key));
//! ```

pub mod builder;
pub mod error;
pub mod plan;
pub mod signing;

pub use builder::ToolPlanBuilder;
pub use error::PlanError;
pub use plan::{PlanIntent, Probe, ProbeType, Step, ToolPlan};
pub use signing::SigningKey;
