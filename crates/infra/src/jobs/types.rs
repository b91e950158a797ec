//! Batch job types: run ids, retry policy, per-candidate reports, summaries.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use binsync_core::{ItemId, RuleId};

use crate::reconciler::{MarkerWrite, ReconcileOutcome, ReconcileReport};

/// Unique id of one batch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchRunId(pub Uuid);

impl BatchRunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BatchRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backoff strategy between reduce attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// base * 2^(attempt-1)
    #[default]
    Exponential,
    /// base * attempt
    Linear,
}

/// Retry policy for reduce steps that failed with a transient store error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = no retries).
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Retries without sleeping; for tests and dry runs.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay_ms: 0,
            max_delay_ms: 0,
            strategy: BackoffStrategy::Fixed,
        }
    }

    /// Delay before retry number `retry` (1-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let base = self.base_delay_ms;
        let ms = match self.strategy {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Exponential => {
                let pow = 1u64 << (retry - 1).min(20);
                base.saturating_mul(pow)
            }
            BackoffStrategy::Linear => base.saturating_mul(u64::from(retry)),
        };

        Duration::from_millis(ms.min(self.max_delay_ms))
    }

    /// Whether another attempt is allowed after `retries_done` retries.
    pub fn should_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }
}

/// Terminal state of one candidate, flattened for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Created,
    Updated,
    Unchanged,
    Skipped,
    Failed,
}

/// Result of reducing one candidate, including retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateReport {
    pub item_id: ItemId,
    pub rule_id: Option<RuleId>,
    pub outcome: OutcomeKind,
    /// Reason for `skipped`/`failed`.
    pub detail: Option<String>,
    pub attempts: u32,
    pub marker_write_failed: bool,
}

impl CandidateReport {
    pub fn from_report(report: &ReconcileReport, attempts: u32) -> Self {
        let (outcome, rule_id, detail) = match &report.outcome {
            ReconcileOutcome::Created { rule_id } => (OutcomeKind::Created, Some(*rule_id), None),
            ReconcileOutcome::Updated { rule_id } => (OutcomeKind::Updated, Some(*rule_id), None),
            ReconcileOutcome::Unchanged { rule_id } => {
                (OutcomeKind::Unchanged, Some(*rule_id), None)
            }
            ReconcileOutcome::Skipped { reason } => {
                (OutcomeKind::Skipped, report.rule_id, Some(reason.to_string()))
            }
            ReconcileOutcome::Failed { error } => {
                (OutcomeKind::Failed, report.rule_id, Some(error.to_string()))
            }
        };

        Self {
            item_id: report.item_id,
            rule_id,
            outcome,
            detail,
            attempts,
            marker_write_failed: matches!(report.marker, MarkerWrite::Failed(_)),
        }
    }
}

/// Summary of one batch cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub run_id: BatchRunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Set when selection failed and the batch ran with zero candidates.
    pub selection_error: Option<String>,
    pub selected: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Reduce attempts beyond the first, across all candidates.
    pub retries: u32,
    pub marker_write_failures: usize,
    pub candidates: Vec<CandidateReport>,
}

impl BatchSummary {
    pub fn new(
        run_id: BatchRunId,
        started_at: DateTime<Utc>,
        selection_error: Option<String>,
        selected: usize,
        mut candidates: Vec<CandidateReport>,
    ) -> Self {
        candidates.sort_by_key(|c| c.item_id);
        let count = |kind: OutcomeKind| candidates.iter().filter(|c| c.outcome == kind).count();

        Self {
            run_id,
            started_at,
            finished_at: Utc::now(),
            selection_error,
            selected,
            created: count(OutcomeKind::Created),
            updated: count(OutcomeKind::Updated),
            unchanged: count(OutcomeKind::Unchanged),
            skipped: count(OutcomeKind::Skipped),
            failed: count(OutcomeKind::Failed),
            retries: candidates.iter().map(|c| c.attempts.saturating_sub(1)).sum(),
            marker_write_failures: candidates.iter().filter(|c| c.marker_write_failed).count(),
            candidates,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at).num_milliseconds().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles_until_capped() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay_ms: 100,
            max_delay_ms: 500,
            strategy: BackoffStrategy::Exponential,
        };

        assert_eq!(policy.delay_for_retry(0), Duration::ZERO);
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_retry(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for_retry(60), Duration::from_millis(500));
    }

    #[test]
    fn linear_and_fixed_backoff() {
        let linear = RetryPolicy {
            strategy: BackoffStrategy::Linear,
            base_delay_ms: 100,
            ..Default::default()
        };
        assert_eq!(linear.delay_for_retry(3), Duration::from_millis(300));

        let fixed = RetryPolicy {
            strategy: BackoffStrategy::Fixed,
            base_delay_ms: 250,
            ..Default::default()
        };
        assert_eq!(fixed.delay_for_retry(1), Duration::from_millis(250));
        assert_eq!(fixed.delay_for_retry(4), Duration::from_millis(250));
    }

    #[test]
    fn should_retry_respects_max_retries() {
        let policy = RetryPolicy::immediate(2);
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
        assert!(!RetryPolicy::no_retry().should_retry(0));
    }

    #[test]
    fn summary_counts_outcomes_and_retries() {
        let report = |id: u64, outcome: OutcomeKind, attempts: u32| CandidateReport {
            item_id: ItemId::new(id),
            rule_id: None,
            outcome,
            detail: None,
            attempts,
            marker_write_failed: id == 3,
        };

        let summary = BatchSummary::new(
            BatchRunId::new(),
            Utc::now(),
            None,
            4,
            vec![
                report(4, OutcomeKind::Failed, 3),
                report(1, OutcomeKind::Created, 1),
                report(2, OutcomeKind::Created, 2),
                report(3, OutcomeKind::Skipped, 1),
            ],
        );

        assert_eq!(summary.created, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.retries, 3);
        assert_eq!(summary.marker_write_failures, 1);
        assert_eq!(summary.candidates[0].item_id, ItemId::new(1));
    }
}
