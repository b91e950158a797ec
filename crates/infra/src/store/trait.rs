use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use binsync_core::{BinId, ItemId, RuleId};
use binsync_inventory::{BinLabel, CandidateRow, EligibilityFilter, NewBinRule, RulePatch};

/// One page of a paginated query.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Offset of the first row (0-based).
    pub offset: usize,
    /// Maximum number of rows to return.
    pub limit: usize,
}

impl PageRequest {
    pub fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }
}

/// Paginated query result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub rows: Vec<T>,
    /// Total rows matching the query across all pages.
    pub total: usize,
    /// Request for the following page, `None` on the last page.
    pub next: Option<PageRequest>,
}

/// Rule lookup criteria. Only active (non-inactive) rules are returned.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RuleQuery {
    ById(RuleId),
    ByItem(ItemId),
}

/// Projection of a rule row: identity plus the bin it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRow {
    pub id: RuleId,
    pub item_id: ItemId,
    pub bin_id: Option<BinId>,
    /// Display text of the rule's bin field.
    pub bin_label: Option<BinLabel>,
}

/// Projection of a bin row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinRow {
    pub id: BinId,
    pub label: BinLabel,
}

/// Partial update of an item record. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPatch {
    pub error_marker: Option<String>,
}

impl ItemPatch {
    pub fn error_marker(marker: impl Into<String>) -> Self {
        Self {
            error_marker: Some(marker.into()),
        }
    }

    pub fn clear_error_marker() -> Self {
        Self::error_marker(String::new())
    }
}

/// Record type named in store errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Item,
    Rule,
    Bin,
}

impl core::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            RecordKind::Item => "inventory item",
            RecordKind::Rule => "bin enhancement",
            RecordKind::Bin => "bin",
        })
    }
}

/// Record store operation error.
///
/// Infrastructure errors as reported by the system of record. `Unavailable`
/// is the only transient kind; everything else fails the same way on retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: RecordKind, id: u64 },

    #[error("invalid value for field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// The system of record the reconciliation reads from and writes to.
///
/// Queries are side-effect free. Mutations are atomic per call and only touch
/// the fields they name.
pub trait RecordStore: Send + Sync {
    /// Joined item × rule rows matching `filter`, one page at a time.
    ///
    /// Rows are returned in a stable order so that consecutive pages neither
    /// overlap nor skip rows while the underlying data is unchanged.
    fn query_items(
        &self,
        filter: &EligibilityFilter,
        page: PageRequest,
    ) -> Result<Page<CandidateRow>, StoreError>;

    /// Active rules matching `query`.
    fn query_rules(&self, query: &RuleQuery) -> Result<Vec<RuleRow>, StoreError>;

    /// Bins whose label equals `label` exactly.
    fn query_bins(&self, label: &BinLabel) -> Result<Vec<BinRow>, StoreError>;

    /// Create a rule; the bin label is resolved by the store at save time.
    ///
    /// Fails with `Conflict` when an active rule is already linked to the item.
    fn create_rule(&self, rule: &NewBinRule) -> Result<RuleId, StoreError>;

    /// Partially update an existing rule.
    fn update_rule(&self, rule_id: RuleId, patch: &RulePatch) -> Result<RuleId, StoreError>;

    /// Partially update an item.
    fn update_item(&self, item_id: ItemId, patch: &ItemPatch) -> Result<ItemId, StoreError>;
}

impl<S> RecordStore for Arc<S>
where
    S: RecordStore + ?Sized,
{
    fn query_items(
        &self,
        filter: &EligibilityFilter,
        page: PageRequest,
    ) -> Result<Page<CandidateRow>, StoreError> {
        (**self).query_items(filter, page)
    }

    fn query_rules(&self, query: &RuleQuery) -> Result<Vec<RuleRow>, StoreError> {
        (**self).query_rules(query)
    }

    fn query_bins(&self, label: &BinLabel) -> Result<Vec<BinRow>, StoreError> {
        (**self).query_bins(label)
    }

    fn create_rule(&self, rule: &NewBinRule) -> Result<RuleId, StoreError> {
        (**self).create_rule(rule)
    }

    fn update_rule(&self, rule_id: RuleId, patch: &RulePatch) -> Result<RuleId, StoreError> {
        (**self).update_rule(rule_id, patch)
    }

    fn update_item(&self, item_id: ItemId, patch: &ItemPatch) -> Result<ItemId, StoreError> {
        (**self).update_item(item_id, patch)
    }
}

impl<S> RecordStore for &S
where
    S: RecordStore + ?Sized,
{
    fn query_items(
        &self,
        filter: &EligibilityFilter,
        page: PageRequest,
    ) -> Result<Page<CandidateRow>, StoreError> {
        (**self).query_items(filter, page)
    }

    fn query_rules(&self, query: &RuleQuery) -> Result<Vec<RuleRow>, StoreError> {
        (**self).query_rules(query)
    }

    fn query_bins(&self, label: &BinLabel) -> Result<Vec<BinRow>, StoreError> {
        (**self).query_bins(label)
    }

    fn create_rule(&self, rule: &NewBinRule) -> Result<RuleId, StoreError> {
        (**self).create_rule(rule)
    }

    fn update_rule(&self, rule_id: RuleId, patch: &RulePatch) -> Result<RuleId, StoreError> {
        (**self).update_rule(rule_id, patch)
    }

    fn update_item(&self, item_id: ItemId, patch: &ItemPatch) -> Result<ItemId, StoreError> {
        (**self).update_item(item_id, patch)
    }
}
