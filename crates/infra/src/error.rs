//! Reconciliation error taxonomy.
//!
//! None of these is fatal to a batch. Each is logged where it is recovered:
//! selection errors by the selector, the rest at the candidate boundary.

use thiserror::Error;

use binsync_core::{BinId, ItemId, RuleId};
use binsync_inventory::BinLabel;

use crate::store::StoreError;

/// The candidate query failed; the batch proceeds with zero candidates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("item query failed at offset {offset}: {source}")]
    Query {
        offset: usize,
        #[source]
        source: StoreError,
    },

    #[error("item query did not advance past offset {offset}")]
    StalledPagination { offset: usize },
}

/// A bin label could not be turned into exactly one bin id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("bin {label} not found")]
    Unresolved { label: BinLabel },

    #[error("bin {label} matches {} bins: {ids:?}", .ids.len())]
    Ambiguous { label: BinLabel, ids: Vec<BinId> },

    #[error("bin lookup for {label} failed: {source}")]
    Store {
        label: BinLabel,
        #[source]
        source: StoreError,
    },
}

/// Reading or writing the rule store failed for one candidate.
///
/// Its display text is what lands in the item's error marker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    #[error("could not create bin enhancement: {source}")]
    Create {
        item_id: ItemId,
        #[source]
        source: StoreError,
    },

    #[error("could not update bin enhancement {rule_id}: {source}")]
    Update {
        rule_id: RuleId,
        #[source]
        source: StoreError,
    },

    #[error("could not read bin enhancements linked to the item: {source}")]
    Lookup {
        item_id: ItemId,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Resolution(ResolutionError),
}

impl PersistenceError {
    fn store_error(&self) -> Option<&StoreError> {
        match self {
            PersistenceError::Create { source, .. }
            | PersistenceError::Update { source, .. }
            | PersistenceError::Lookup { source, .. } => Some(source),
            PersistenceError::Resolution(ResolutionError::Store { source, .. }) => Some(source),
            PersistenceError::Resolution(_) => None,
        }
    }

    /// Whether re-running the reduce step may succeed.
    pub fn is_transient(&self) -> bool {
        self.store_error().is_some_and(StoreError::is_transient)
    }
}

/// Setting or clearing the item's error marker failed. Logged and swallowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not write error marker on item {item_id}: {source}")]
pub struct MarkerWriteError {
    pub item_id: ItemId,
    #[source]
    pub source: StoreError,
}
