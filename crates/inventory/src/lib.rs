//! Inventory bin reconciliation domain.
//!
//! Record shapes (items, bins, programs, bin enhancement rules), the
//! eligibility predicate, candidate grouping and the create/update decision.
//! Pure domain logic: no IO, no storage.

pub mod bin;
pub mod candidate;
pub mod decision;
pub mod eligibility;
pub mod item;
pub mod rule;

pub use bin::{Bin, BinLabel};
pub use candidate::{Candidate, CandidateRow, collapse_rows};
pub use decision::{ReconcileAction, decide};
pub use eligibility::{EligibilityFacts, EligibilityFilter, Exclusion};
pub use item::{ClassThresholds, InventoryItem, ItemBin, ItemType, Program};
pub use rule::{BinRule, NewBinRule, RulePatch, RuleStatus};
