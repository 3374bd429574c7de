// profile.rs — From a requested action to the facts the kernel reasons about.
//
// Each intent category has a fixed profile: the read-only probes that must
// pass, the ordered steps (with rollback actions where one exists), how
// reversible the action is, and the risk context the engine scores. The
// target string contributes recipients, which are external unless their
// domain matches one of the configured internal-domain globs.

use glob::Pattern;
use serde::{Deserialize, Serialize};

use ck_plan::{
    PlanError, PlanIntent, Probe, ProbeType, SigningKey, Step, ToolPlan, ToolPlanBuilder,
};
use ck_policy::IntentType;
use ck_risk::{Reversibility, RiskContext};

use crate::error::KernelError;

/// A requested action, as produced by the intent parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionIntent {
    pub action: String,
    #[serde(default)]
    pub target: Option<String>,
}

impl ExecutionIntent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Everything the kernel derives from an intent before scoring it.
#[derive(Debug, Clone)]
pub struct IntentProfile {
    pub intent: IntentType,
    pub target: String,
    pub context: RiskContext,
    pub probes: Vec<Probe>,
    pub steps: Vec<Step>,
    pub reversibility_reason: String,
    /// Category baseline carried on the plan before the reversibility
    /// modifier is applied.
    pub base_risk: u8,
    pub base_reasons: Vec<String>,
}

impl IntentProfile {
    /// Build and sign the plan this profile describes.
    pub fn build_plan(
        &self,
        originating_action: &str,
        key: &SigningKey,
    ) -> Result<ToolPlan, PlanError> {
        let target = if self.target.is_empty() {
            self.intent.summary().to_string()
        } else {
            self.target.clone()
        };
        ToolPlanBuilder::new()
            .intent(PlanIntent::new(self.intent, self.intent.summary(), target))
            .originating_action(originating_action)
            .base_risk(self.base_risk, self.base_reasons.clone())
            .reversibility(self.context.reversibility, self.reversibility_reason.clone())
            .probes(self.probes.clone())
            .steps(self.steps.clone())
            .build(key)
    }
}

/// Builds [`IntentProfile`]s. Holds the internal-domain patterns.
#[derive(Debug, Clone, Default)]
pub struct IntentProfiler {
    internal_domains: Vec<Pattern>,
}

/// Split a target into individual recipients.
fn recipients(target: &str) -> impl Iterator<Item = &str> {
    target
        .split([',', ';'])
        .map(str::trim)
        .filter(|r| !r.is_empty())
}

impl IntentProfiler {
    pub fn new<I, S>(internal_domains: I) -> Result<Self, KernelError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let internal_domains = internal_domains
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                Pattern::new(&p.to_ascii_lowercase()).map_err(|source| KernelError::DomainPattern {
                    pattern: p.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { internal_domains })
    }

    /// Is `recipient` (an address or bare domain) inside the organization?
    pub fn is_internal(&self, recipient: &str) -> bool {
        let domain = recipient
            .rsplit_once('@')
            .map(|(_, d)| d)
            .unwrap_or(recipient)
            .to_ascii_lowercase();
        self.internal_domains.iter().any(|p| p.matches(&domain))
    }

    pub fn recipient_count(&self, target: &str) -> u32 {
        count(recipients(target))
    }

    pub fn external_recipient_count(&self, target: &str) -> u32 {
        count(recipients(target).filter(|r| !self.is_internal(r)))
    }

    pub fn profile(&self, intent: IntentType, target: Option<&str>) -> IntentProfile {
        let target = target.map(str::trim).unwrap_or_default().to_string();
        let recipients = self.recipient_count(&target);
        let external = self.external_recipient_count(&target);

        let mut context = RiskContext {
            affected_entity_count: recipients.max(1),
            ..RiskContext::default()
        };

        let (probes, steps, reversibility_reason, base_risk) = match intent {
            IntentType::CreateDraft => {
                context.writes_state = true;
                context.has_rollback_mechanism = true;
                (
                    vec![Probe::required(
                        ProbeType::Permission,
                        "Draft storage is writable",
                        "drafts",
                    )],
                    vec![Step::mutation(
                        1,
                        "drafts.create",
                        "Save the draft",
                        Some("drafts.delete"),
                    )],
                    "drafts can be deleted",
                    5,
                )
            }
            IntentType::CreateReminder => {
                context.writes_state = true;
                context.has_rollback_mechanism = true;
                (
                    vec![Probe::required(
                        ProbeType::Permission,
                        "Reminder list is writable",
                        "reminders",
                    )],
                    vec![Step::mutation(
                        1,
                        "reminders.create",
                        "Create the reminder",
                        Some("reminders.delete"),
                    )],
                    "reminders can be deleted",
                    5,
                )
            }
            IntentType::CreateCalendarEvent => {
                context.writes_state = true;
                context.has_rollback_mechanism = true;
                context.external_recipient_count = external;
                (
                    vec![
                        Probe::required(ProbeType::Permission, "Calendar is writable", "calendar"),
                        Probe::advisory(ProbeType::Conflict, "No overlapping events", "calendar"),
                    ],
                    vec![
                        Step::read_only(1, "calendar.check_availability", "Check free/busy"),
                        Step::mutation(
                            2,
                            "calendar.create_event",
                            "Create the event",
                            Some("calendar.delete_event"),
                        ),
                    ],
                    "event can be deleted, though invitations may already be seen",
                    15,
                )
            }
            IntentType::UpdateCalendarEvent => {
                context.writes_state = true;
                context.has_rollback_mechanism = true;
                context.reversibility = Reversibility::PartiallyReversible;
                context.external_recipient_count = external;
                (
                    vec![Probe::required(
                        ProbeType::ResourceExists,
                        "Event exists",
                        target_or(&target, "calendar"),
                    )],
                    vec![
                        Step::read_only(1, "calendar.snapshot_event", "Snapshot the current event"),
                        Step::mutation(
                            2,
                            "calendar.update_event",
                            "Apply the changes",
                            Some("calendar.restore_event"),
                        ),
                    ],
                    "previous version restored from snapshot; attendees may see the change",
                    20,
                )
            }
            IntentType::DeleteCalendarEvent => {
                context.is_delete_operation = true;
                context.has_rollback_mechanism = true;
                context.reversibility = Reversibility::Irreversible;
                context.external_recipient_count = external;
                (
                    vec![Probe::required(
                        ProbeType::ResourceExists,
                        "Event exists",
                        target_or(&target, "calendar"),
                    )],
                    vec![
                        Step::read_only(1, "calendar.snapshot_event", "Snapshot the event"),
                        Step::mutation(
                            2,
                            "calendar.delete_event",
                            "Delete the event",
                            Some("calendar.recreate_event"),
                        ),
                    ],
                    "deletion notifies attendees; the event can only be recreated",
                    30,
                )
            }
            IntentType::SendEmail => {
                context.writes_state = true;
                context.involves_personal_data = true;
                context.reversibility = Reversibility::Irreversible;
                context.external_recipient_count = external;
                (
                    vec![
                        Probe::required(ProbeType::Permission, "Mail account can send", "mail"),
                        Probe::required(ProbeType::Recipient, "Recipients resolve", target.clone()),
                    ],
                    vec![
                        Step::read_only(1, "mail.compose_preview", "Render the message"),
                        Step::mutation(2, "mail.send", "Send the message", None),
                    ],
                    "a sent email cannot be recalled",
                    35,
                )
            }
            IntentType::SendMessage => {
                context.writes_state = true;
                context.involves_personal_data = true;
                context.reversibility = Reversibility::Irreversible;
                context.external_recipient_count = external;
                (
                    vec![Probe::required(
                        ProbeType::Recipient,
                        "Recipients resolve",
                        target.clone(),
                    )],
                    vec![
                        Step::read_only(1, "messages.compose_preview", "Render the message"),
                        Step::mutation(2, "messages.send", "Send the message", None),
                    ],
                    "a delivered message cannot be recalled",
                    30,
                )
            }
            IntentType::MakePayment => {
                context.involves_payment = true;
                context.writes_state = true;
                context.involves_personal_data = true;
                context.reversibility = Reversibility::Irreversible;
                context.external_recipient_count = external.max(1);
                (
                    vec![
                        Probe::required(ProbeType::Recipient, "Payee resolves", target.clone()),
                        Probe::required(ProbeType::Balance, "Funds are available", "account"),
                    ],
                    vec![
                        Step::read_only(1, "payments.quote", "Quote amount and fees"),
                        Step::mutation(2, "payments.transfer", "Transfer the funds", None),
                    ],
                    "settled transfers cannot be reversed",
                    60,
                )
            }
        };

        let base_reasons = vec![format!("{} baseline ({})", intent, base_risk)];
        IntentProfile {
            intent,
            target,
            context,
            probes,
            steps,
            reversibility_reason: reversibility_reason.to_string(),
            base_risk,
            base_reasons,
        }
    }
}

fn target_or(target: &str, fallback: &str) -> String {
    if target.is_empty() {
        fallback.to_string()
    } else {
        target.to_string()
    }
}

fn count<'a>(it: impl Iterator<Item = &'a str>) -> u32 {
    u32::try_from(it.count()).unwrap_or(u32::MAX)
}
