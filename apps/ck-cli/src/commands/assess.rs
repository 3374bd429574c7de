// assess.rs — `ck assess` and `ck plan`: look before you act.
//
// Neither touches durable state. `assess` needs no key; `plan` signs the
// plan it prints, so it needs the plan-signing secret.

use anyhow::Context as _;
use clap::Args;
use serde::Serialize;

use ck_kernel::{IntentProfiler, KernelConfig};
use ck_policy::{IntentType, PolicyDecision, PolicyEngine};
use ck_risk::{RiskAssessment, RiskEngine};

use super::print_json;
use crate::Context;

#[derive(Args)]
pub struct ActionArgs {
    /// Action category, e.g. send_email or make_payment.
    pub action: String,
    /// Recipients or resource the action targets (comma-separated).
    #[arg(long)]
    pub target: Option<String>,
}

#[derive(Serialize)]
struct Assessment {
    action: IntentType,
    risk: RiskAssessment,
    decision: PolicyDecision,
}

fn profiler(config: &KernelConfig) -> anyhow::Result<IntentProfiler> {
    Ok(IntentProfiler::new(&config.internal_domains)?)
}

fn parse_action(action: &str) -> anyhow::Result<IntentType> {
    action
        .parse::<IntentType>()
        .with_context(|| format!("'{}' is not a supported action", action))
}

pub fn assess(args: &ActionArgs, ctx: &Context) -> anyhow::Result<()> {
    let intent = parse_action(&args.action)?;
    let profile = profiler(&ctx.config)?.profile(intent, args.target.as_deref());
    let risk = RiskEngine::new().assess(&profile.context);
    let policy = PolicyEngine::with_configuration(ctx.config.policy()?)?;
    let decision = policy.decide(&risk, intent);
    print_json(&Assessment {
        action: intent,
        risk,
        decision,
    })
}

pub fn plan(args: &ActionArgs, ctx: &Context) -> anyhow::Result<()> {
    let intent = parse_action(&args.action)?;
    let key = ctx.signing_key()?;
    let profile = profiler(&ctx.config)?.profile(intent, args.target.as_deref());
    let plan = profile.build_plan(&args.action, &key)?;
    print_json(&plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_action_is_rejected() {
        let err = parse_action("launch_rocket").unwrap_err();
        assert!(err.to_string().contains("launch_rocket"));
    }

    #[test]
    fn known_action_parses() {
        assert_eq!(parse_action("make_payment").unwrap(), IntentType::MakePayment);
    }
}
