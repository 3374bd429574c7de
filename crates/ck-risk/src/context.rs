// context.rs — Inputs to the risk engine.
//
// A RiskContext is a flat description of what an action touches. It is
// built by the kernel from the intent category and target; the engine
// never inspects free text.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How far an action's effects can be undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reversibility {
    /// Effects can be fully undone.
    #[default]
    Reversible,
    /// Some effects persist after an undo (e.g. a notification already delivered).
    PartiallyReversible,
    /// Effects cannot be undone once performed.
    Irreversible,
}

impl fmt::Display for Reversibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reversibility::Reversible => write!(f, "reversible"),
            Reversibility::PartiallyReversible => write!(f, "partially_reversible"),
            Reversibility::Irreversible => write!(f, "irreversible"),
        }
    }
}

/// Everything the risk engine looks at when scoring an action.
///
/// `Default` gives the least risky context: nothing sensitive, nothing
/// external, fully reversible, one affected entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskContext {
    /// The action moves money.
    pub involves_payment: bool,
    /// The action reads, sends, or changes credentials or secrets.
    pub involves_credentials: bool,
    /// Number of recipients outside the owner's trusted domains.
    pub external_recipient_count: u32,
    /// The result becomes visible to anyone (public post, public link).
    pub is_public_share: bool,
    /// The action touches health records.
    pub involves_health_data: bool,
    /// The action touches personal data (contacts, addresses, messages).
    pub involves_personal_data: bool,
    /// The action deletes something.
    pub is_delete_operation: bool,
    /// The action changes device or account settings.
    pub modifies_settings: bool,
    /// The action creates or updates persistent state.
    pub writes_state: bool,
    /// How far the action can be undone.
    pub reversibility: Reversibility,
    /// A rollback path exists for the action's mutations.
    pub has_rollback_mechanism: bool,
    /// Number of entities (events, messages, files) the action affects.
    pub affected_entity_count: u32,
}

impl Default for RiskContext {
    fn default() -> Self {
        Self {
            involves_payment: false,
            involves_credentials: false,
            external_recipient_count: 0,
            is_public_share: false,
            involves_health_data: false,
            involves_personal_data: false,
            is_delete_operation: false,
            modifies_settings: false,
            writes_state: false,
            reversibility: Reversibility::Reversible,
            has_rollback_mechanism: false,
            affected_entity_count: 1,
        }
    }
}

impl RiskContext {
    /// True when the irreversibility penalty applies.
    pub fn is_irreversible_without_rollback(&self) -> bool {
        self.reversibility == Reversibility::Irreversible && !self.has_rollback_mechanism
    }
}
