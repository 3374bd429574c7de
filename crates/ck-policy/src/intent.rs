// intent.rs — The closed set of intent categories.
//
// Every action the kernel can authorize belongs to exactly one category.
// The set is closed on purpose: adding a category forces every `match` on
// IntentType (base approval, probes, steps, risk profile) to be revisited.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::approval::{ApprovalLevel, ApprovalRequirement};
use crate::error::PolicyError;

/// Category of a requested action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    CreateDraft,
    CreateReminder,
    CreateCalendarEvent,
    UpdateCalendarEvent,
    DeleteCalendarEvent,
    SendEmail,
    SendMessage,
    MakePayment,
}

impl IntentType {
    /// Every category, in declaration order.
    pub const ALL: [IntentType; 8] = [
        IntentType::CreateDraft,
        IntentType::CreateReminder,
        IntentType::CreateCalendarEvent,
        IntentType::UpdateCalendarEvent,
        IntentType::DeleteCalendarEvent,
        IntentType::SendEmail,
        IntentType::SendMessage,
        IntentType::MakePayment,
    ];

    /// The action string that names this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentType::CreateDraft => "create_draft",
            IntentType::CreateReminder => "create_reminder",
            IntentType::CreateCalendarEvent => "create_calendar_event",
            IntentType::UpdateCalendarEvent => "update_calendar_event",
            IntentType::DeleteCalendarEvent => "delete_calendar_event",
            IntentType::SendEmail => "send_email",
            IntentType::SendMessage => "send_message",
            IntentType::MakePayment => "make_payment",
        }
    }

    /// Minimum approval for this category regardless of the risk score.
    ///
    /// Sending anything to another person is high risk by category, so a
    /// low-scored send is still gated on biometric approval.
    pub fn base_level(&self) -> ApprovalLevel {
        match self {
            IntentType::CreateDraft | IntentType::CreateReminder => ApprovalLevel::AutoApprove,
            IntentType::CreateCalendarEvent | IntentType::UpdateCalendarEvent => {
                ApprovalLevel::PreviewRequired
            }
            IntentType::DeleteCalendarEvent | IntentType::SendEmail | IntentType::SendMessage => {
                ApprovalLevel::BiometricRequired
            }
            IntentType::MakePayment => ApprovalLevel::CriticalMultiSig,
        }
    }

    /// Requirement for [`base_level`](Self::base_level).
    pub fn base_requirement(&self) -> ApprovalRequirement {
        self.base_level().requirement()
    }

    /// Short human-readable summary used in plan intents.
    pub fn summary(&self) -> &'static str {
        match self {
            IntentType::CreateDraft => "Create a draft",
            IntentType::CreateReminder => "Create a reminder",
            IntentType::CreateCalendarEvent => "Create a calendar event",
            IntentType::UpdateCalendarEvent => "Update a calendar event",
            IntentType::DeleteCalendarEvent => "Delete a calendar event",
            IntentType::SendEmail => "Send an email",
            IntentType::SendMessage => "Send a message",
            IntentType::MakePayment => "Make a payment",
        }
    }
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IntentType {
    type Err = PolicyError;

    fn from_str(action: &str) -> Result<Self, Self::Err> {
        let normalized = action.trim().to_ascii_lowercase();
        IntentType::ALL
            .into_iter()
            .find(|intent| intent.as_str() == normalized)
            .ok_or_else(|| PolicyError::UnknownIntent(action.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_strings_round_trip() {
        for intent in IntentType::ALL {
            assert_eq!(intent.as_str().parse::<IntentType>().unwrap(), intent);
        }
    }

    #[test]
    fn parsing_ignores_case_and_whitespace() {
        assert_eq!(
            "  Send_Email ".parse::<IntentType>().unwrap(),
            IntentType::SendEmail
        );
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(matches!(
            "launch_rocket".parse::<IntentType>(),
            Err(PolicyError::UnknownIntent(_))
        ));
    }

    #[test]
    fn sending_is_biometric_by_category() {
        assert_eq!(
            IntentType::SendEmail.base_level(),
            ApprovalLevel::BiometricRequired
        );
        assert_eq!(
            IntentType::CreateDraft.base_level(),
            ApprovalLevel::AutoApprove
        );
        assert!(IntentType::MakePayment.base_requirement().requires_quorum());
    }
}
