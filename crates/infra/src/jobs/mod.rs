//! Local batch harness: one map pass, then a pool of reduce workers.
//!
//! ## Design
//!
//! - Selection runs once per batch, on the calling thread
//! - Candidates are distributed over worker threads through a shared channel
//! - A reduce step that failed with a transient store error is re-run per
//!   `RetryPolicy`; every other outcome is final for this batch
//! - The batch always completes and returns a `BatchSummary`

pub mod executor;
pub mod types;

pub use executor::BatchExecutor;
pub use types::{
    BackoffStrategy, BatchRunId, BatchSummary, CandidateReport, OutcomeKind, RetryPolicy,
};
