// execute.rs — `ck execute`: run one action through the kernel.
//
// The kernel is opened on the state directory, so trust state, consumed
// tokens and the audit ledger persist across invocations. Steps run on the
// dry-run executor. A plan that needs approval is printed as pending unless
// `--approve` supplies one; the CLI then issues a fresh single-use
// credential bound to the current trust generation.

use chrono::{Duration, Utc};
use clap::{Args, ValueEnum};
use tracing::info;
use uuid::Uuid;

use ck_kernel::{ApprovalCredential, ApprovalRecord, CapabilityKernel, ExecutionIntent};
use ck_policy::ApprovalType;

use super::assess::ActionArgs;
use super::print_json;
use crate::Context;

/// How long an issued approval credential stays valid.
const CREDENTIAL_TTL_SECS: i64 = 300;

#[derive(Args)]
pub struct ExecuteArgs {
    #[command(flatten)]
    pub action: ActionArgs,
    /// Approve a pending plan immediately with this kind of confirmation.
    #[arg(long, value_enum)]
    pub approve: Option<ApproveWith>,
    /// Identity recorded as the approver.
    #[arg(long, default_value = "cli")]
    pub approver: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ApproveWith {
    Confirmation,
    Preview,
    Biometric,
}

impl From<ApproveWith> for ApprovalType {
    fn from(value: ApproveWith) -> Self {
        match value {
            ApproveWith::Confirmation => ApprovalType::Confirmation,
            ApproveWith::Preview => ApprovalType::Preview,
            ApproveWith::Biometric => ApprovalType::Biometric,
        }
    }
}

pub fn execute(args: &ExecuteArgs, ctx: &Context) -> anyhow::Result<()> {
    let mut kernel = CapabilityKernel::open(&ctx.config, ctx.signing_key()?)?;

    let mut intent = ExecutionIntent::new(&args.action.action);
    if let Some(target) = &args.action.target {
        intent = intent.with_target(target);
    }
    let mut result = kernel.execute(&intent);

    if let (true, Some(approve), Some(plan_id)) = (result.is_pending(), args.approve, result.plan_id)
    {
        let record = approval_record(&kernel, plan_id, approve.into(), &args.approver);
        info!(plan_id = %plan_id, approval = %record.approval_type, "submitting approval");
        result = kernel.authorize(plan_id, &record);
    }

    print_json(&result)?;
    if result.is_success() || result.is_pending() {
        Ok(())
    } else {
        anyhow::bail!("{}", result.message)
    }
}

fn approval_record(
    kernel: &CapabilityKernel,
    plan_id: Uuid,
    approval_type: ApprovalType,
    approver: &str,
) -> ApprovalRecord {
    let credential = ApprovalCredential {
        token_id: format!("cli-{}", Uuid::new_v4()),
        key_version: kernel.trust().active_key_version(),
        trust_epoch: kernel.trust().trust_epoch(),
        expires_at: Utc::now() + Duration::seconds(CREDENTIAL_TTL_SECS),
    };
    ApprovalRecord::approve(plan_id, approval_type, approver, credential)
}
