//! Pure create/update/no-op decision for one candidate.

use serde::{Deserialize, Serialize};

use binsync_core::RuleId;

use crate::bin::BinLabel;
use crate::candidate::Candidate;

/// What the reconciler should do for a candidate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReconcileAction {
    /// No rule is linked to the item yet.
    Create,
    /// The linked rule points at a different (or no) bin.
    Update { rule_id: RuleId },
    /// The linked rule already points at the preferred bin.
    Unchanged { rule_id: RuleId },
}

impl ReconcileAction {
    pub fn name(&self) -> &'static str {
        match self {
            ReconcileAction::Create => "create",
            ReconcileAction::Update { .. } => "update",
            ReconcileAction::Unchanged { .. } => "unchanged",
        }
    }
}

/// Decide the action for `candidate` given the linked rule's current bin label.
///
/// `existing_label` is `None` when the rule has no bin, is inactive, or could
/// not be read; all of these count as a mismatch.
pub fn decide(candidate: &Candidate, existing_label: Option<&BinLabel>) -> ReconcileAction {
    match candidate.rule_id {
        None => ReconcileAction::Create,
        Some(rule_id) if existing_label == Some(&candidate.bin_label) => {
            ReconcileAction::Unchanged { rule_id }
        }
        Some(rule_id) => ReconcileAction::Update { rule_id },
    }
}
