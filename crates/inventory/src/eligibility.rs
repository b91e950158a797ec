//! Eligibility predicate for bin reconciliation candidates.
//!
//! The filter is plain data so that a store adapter can either evaluate it
//! row-by-row (in-memory store) or translate it into its own query language.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use binsync_core::{ItemId, LocationId, ProgramId};

use crate::bin::{Bin, BinLabel};
use crate::item::{InventoryItem, Program};

/// Conjunctive eligibility filter over joined item/bin/program/rule facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityFilter {
    /// Warehouse the preferred bin must belong to.
    pub location_id: LocationId,
    /// Bin labels starting with any of these are skipped.
    pub excluded_bin_prefixes: Vec<String>,
    /// Item names starting with any of these are skipped.
    pub excluded_item_prefixes: Vec<String>,
    /// Programs whose items are skipped.
    pub excluded_programs: BTreeSet<ProgramId>,
    /// When set, only these items are eligible.
    pub item_allowlist: Option<BTreeSet<ItemId>>,
}

/// Joined facts for one item × preferred-bin × rule row.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityFacts<'a> {
    pub item: &'a InventoryItem,
    pub bin: &'a Bin,
    /// Whether the item-bin association is flagged preferred.
    pub preferred: bool,
    pub program: Option<&'a Program>,
    /// Label of the bin on the joined rule, if a rule is joined and has a bin.
    pub rule_bin_label: Option<&'a BinLabel>,
}

/// The first clause that excluded a row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Exclusion {
    NotStockable,
    ItemInactive,
    NotPreferredBin,
    RuleAlreadyMatches,
    ExcludedBinPrefix,
    BinInactive,
    ExcludedItemPrefix,
    WrongLocation,
    ProgramClosed,
    ExcludedProgram,
    NoActivity,
    NotAllowlisted,
}

impl EligibilityFilter {
    /// Evaluate every clause in order; `Err` names the first one that failed.
    pub fn evaluate(&self, facts: &EligibilityFacts<'_>) -> Result<(), Exclusion> {
        let item = facts.item;
        let bin = facts.bin;

        if !item.item_type.is_stockable() {
            return Err(Exclusion::NotStockable);
        }
        if item.inactive {
            return Err(Exclusion::ItemInactive);
        }
        if !facts.preferred {
            return Err(Exclusion::NotPreferredBin);
        }
        if facts.rule_bin_label == Some(&bin.label) {
            return Err(Exclusion::RuleAlreadyMatches);
        }
        if bin.label.starts_with_any(self.excluded_bin_prefixes.as_slice()) {
            return Err(Exclusion::ExcludedBinPrefix);
        }
        if bin.inactive {
            return Err(Exclusion::BinInactive);
        }
        if self
            .excluded_item_prefixes
            .iter()
            .any(|p| item.name.starts_with(p.as_str()))
        {
            return Err(Exclusion::ExcludedItemPrefix);
        }
        if bin.location_id != self.location_id {
            return Err(Exclusion::WrongLocation);
        }
        if facts.program.is_some_and(|p| p.closed) {
            return Err(Exclusion::ProgramClosed);
        }
        if item
            .program_id
            .is_some_and(|p| self.excluded_programs.contains(&p))
        {
            return Err(Exclusion::ExcludedProgram);
        }
        if !item.has_activity() {
            return Err(Exclusion::NoActivity);
        }
        if let Some(allow) = &self.item_allowlist {
            if !allow.contains(&item.id) {
                return Err(Exclusion::NotAllowlisted);
            }
        }
        Ok(())
    }

    pub fn matches(&self, facts: &EligibilityFacts<'_>) -> bool {
        self.evaluate(facts).is_ok()
    }
}
