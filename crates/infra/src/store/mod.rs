//! Record store boundary.
//!
//! The platform that owns items, bins and bin enhancement rules is an external
//! system of record. This module defines the typed contract the reconciliation
//! needs from it, plus an in-memory implementation for tests, benchmarks and
//! snapshot dry runs.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::{Fault, InMemoryRecordStore, StoreOp, StoreSnapshot, WriteRecord};
pub use r#trait::{
    BinRow, ItemPatch, Page, PageRequest, RecordKind, RecordStore, RuleQuery, RuleRow, StoreError,
};
