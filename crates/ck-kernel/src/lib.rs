//! # ck-kernel
//!
//! The capability kernel: the single gate every side-effecting action on
//! the device passes through.
//!
//! An [`ExecutionIntent`] is turned into a signed [`ck_plan::ToolPlan`],
//! probed, scored by [`ck_risk::RiskEngine`], mapped to an approval
//! requirement by [`ck_policy::PolicyEngine`], and verified. Low-risk plans
//! execute immediately; everything else waits in the pending registry until
//! [`CapabilityKernel::authorize`] resolves it.
//!
//! ## Key invariants
//!
//! - **Fail closed**: every refusal is a failed [`ExecutionResult`] with a
//!   non-empty message, never a silent success.
//! - **Single use**: approval credentials, update tokens and signature
//!   nonces are consumed in a durable ledger before they take effect.
//! - **Current trust only**: anything bound to a stale key version or trust
//!   epoch is rejected.
//! - **Audit before action**: if the decision record cannot be written the
//!   action does not run.
//! - **Lockdown is sticky**: once the [`KernelIntegrityGuard`] trips, no
//!   plan executes until the process restarts with clean state.
//!
//! ```no_run
//! use ck_kernel::{CapabilityKernel, ExecutionIntent, KernelConfig};
//! use ck_plan::SigningKey;
//!
//! let config = KernelConfig::discover(".ck")?;
//! let mut kernel = CapabilityKernel::open(&config, SigningKey::new(1, b"device secret"))?;
//! let result = kernel.execute(&ExecutionIntent::new("create_draft"));
//! assert!(result.is_success());
//! # Ok::<(), ck_kernel::KernelError>(())
//! ```

pub mod approval;
pub mod config;
pub mod error;
pub mod executor;
pub mod guard;
pub mod kernel;
pub mod phase;
pub mod profile;
pub mod report;
pub mod result;
pub mod shared;
pub mod signature;

pub use approval::{ApprovalCredential, ApprovalRecord};
pub use config::{KernelConfig, CONFIG_FILE_NAME};
pub use error::{ActionError, KernelError};
pub use executor::{DryRunExecutor, ProbeRunner, StepExecutor};
pub use guard::{KernelIntegrityGuard, Posture};
pub use kernel::CapabilityKernel;
pub use phase::KernelPhase;
pub use profile::{ExecutionIntent, IntentProfile, IntentProfiler};
pub use report::{run_steps, ExecutionReport, StepOutcome, StepStatus};
pub use result::{ExecutionResult, ExecutionStatus, QuorumStatus, VerificationOutcome};
pub use shared::SharedKernel;
pub use signature::{signature_payload, HmacSignatureVerifier, SignatureVerifier};
