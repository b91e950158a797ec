//! Infrastructure layer: record store boundary, selection, reconciliation
//! and the local batch harness.

pub mod bin_lookup;
pub mod config;
pub mod error;
pub mod jobs;
pub mod reconciler;
pub mod selector;
pub mod store;


pub use bin_lookup::find_bin_id;
pub use config::{ConfigError, EligibilitySettings, ReconcileConfig};
pub use error::{MarkerWriteError, PersistenceError, ResolutionError, SelectionError};
pub use jobs::{BatchExecutor, BatchSummary, RetryPolicy};
pub use reconciler::{MarkerWrite, ReconcileOutcome, ReconcileReport, Reconciler};
pub use selector::CandidateSelector;
pub use store::{InMemoryRecordStore, RecordStore, StoreError, StoreSnapshot};
