//! Batch executor with per-candidate retry and backoff.

use std::sync::{Mutex, mpsc};
use std::thread;

use chrono::Utc;
use tracing::{debug, error, info, info_span, warn};

use binsync_inventory::Candidate;

use crate::config::ReconcileConfig;
use crate::reconciler::Reconciler;
use crate::selector::CandidateSelector;
use crate::store::RecordStore;

use super::types::{BatchRunId, BatchSummary, CandidateReport, RetryPolicy};

/// Runs one reconciliation batch against a record store.
///
/// Holds no state between runs; calling [`BatchExecutor::run`] again simply
/// re-selects from the store's current contents.
#[derive(Debug, Clone)]
pub struct BatchExecutor<S> {
    store: S,
    config: ReconcileConfig,
}

impl<S: RecordStore> BatchExecutor<S> {
    pub fn new(store: S, config: ReconcileConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Select candidates, reduce each of them, and summarize.
    pub fn run(&self) -> BatchSummary {
        let run_id = BatchRunId::new();
        let started_at = Utc::now();
        let span = info_span!("batch", run_id = %run_id);
        let _guard = span.enter();

        info!(
            location_id = %self.config.location_id,
            workers = self.config.workers,
            "batch started"
        );

        let selector = CandidateSelector::from_config(&self.store, &self.config);
        let (candidates, selection_error) = match selector.try_select() {
            Ok(candidates) => (candidates, None),
            Err(e) => {
                error!(error = %e, "candidate selection failed; running with no candidates");
                (Vec::new(), Some(e.to_string()))
            }
        };

        let selected = candidates.len();
        let reports = self.reduce_all(candidates);
        let summary = BatchSummary::new(run_id, started_at, selection_error, selected, reports);

        info!(
            selected = summary.selected,
            created = summary.created,
            updated = summary.updated,
            unchanged = summary.unchanged,
            skipped = summary.skipped,
            failed = summary.failed,
            retries = summary.retries,
            duration_ms = summary.duration_ms(),
            "batch finished"
        );
        summary
    }

    /// Reduce every candidate exactly once (plus transient retries).
    ///
    /// Reports come back in completion order.
    pub fn reduce_all(&self, candidates: Vec<Candidate>) -> Vec<CandidateReport> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let reconciler = Reconciler::from_config(&self.store, &self.config);
        let policy = &self.config.retry;
        let workers = self.config.workers.clamp(1, candidates.len());

        let (job_tx, job_rx) = mpsc::channel::<Candidate>();
        for candidate in candidates {
            // The receiver lives until the end of this function.
            let _ = job_tx.send(candidate);
        }
        drop(job_tx);
        let jobs = Mutex::new(job_rx);
        let (result_tx, result_rx) = mpsc::channel::<CandidateReport>();

        thread::scope(|scope| {
            let mut spawned = 0usize;
            for n in 0..workers {
                let jobs = &jobs;
                let results = result_tx.clone();
                let reconciler = &reconciler;
                let spawn = thread::Builder::new()
                    .name(format!("binsync-reduce-{n}"))
                    .spawn_scoped(scope, move || worker_loop(jobs, &results, reconciler, policy));
                match spawn {
                    Ok(_) => spawned += 1,
                    Err(e) => warn!(worker = n, error = %e, "failed to spawn reduce worker"),
                }
            }

            if spawned == 0 {
                warn!("no reduce workers available; reducing on the calling thread");
                worker_loop(&jobs, &result_tx, &reconciler, policy);
            }
            debug!(workers = spawned, "reduce workers running");
        });
        drop(result_tx);

        result_rx.into_iter().collect()
    }
}

fn worker_loop<S: RecordStore>(
    jobs: &Mutex<mpsc::Receiver<Candidate>>,
    results: &mpsc::Sender<CandidateReport>,
    reconciler: &Reconciler<S>,
    policy: &RetryPolicy,
) {
    loop {
        let next = {
            let rx = jobs.lock().unwrap_or_else(|e| e.into_inner());
            rx.recv().ok()
        };
        let Some(candidate) = next else {
            break;
        };

        let report = reduce_with_retry(reconciler, policy, &candidate);
        if results.send(report).is_err() {
            break;
        }
    }
}

fn reduce_with_retry<S: RecordStore>(
    reconciler: &Reconciler<S>,
    policy: &RetryPolicy,
    candidate: &Candidate,
) -> CandidateReport {
    let mut retries = 0u32;

    loop {
        let report = reconciler.reconcile(candidate);

        if report.outcome.is_transient_failure() && policy.should_retry(retries) {
            retries += 1;
            let delay = policy.delay_for_retry(retries);
            warn!(
                item_id = %candidate.item_id,
                retry = retries,
                delay_ms = delay.as_millis() as u64,
                "transient failure; retrying candidate"
            );
            thread::sleep(delay);
            continue;
        }

        return CandidateReport::from_report(&report, retries + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binsync_core::{BinId, ItemId, LocationId, RuleId};
    use binsync_inventory::{
        Bin, BinLabel, BinRule, ClassThresholds, InventoryItem, ItemBin, ItemType, RuleStatus,
    };

    use crate::jobs::OutcomeKind;
    use crate::store::{Fault, InMemoryRecordStore, StoreOp};

    fn config(workers: usize, retries: u32) -> ReconcileConfig {
        ReconcileConfig {
            workers,
            retry: RetryPolicy::immediate(retries),
            ..ReconcileConfig::default()
        }
    }

    fn store_with_items(count: u64) -> InMemoryRecordStore {
        let store = InMemoryRecordStore::new();
        store.insert_bin(Bin {
            id: BinId::new(900),
            label: BinLabel::new("A-12").unwrap(),
            location_id: LocationId::new(7),
            inactive: false,
        });
        for id in 1..=count {
            store.insert_item(InventoryItem {
                id: ItemId::new(id),
                name: format!("TS-{id}"),
                item_type: ItemType::InventoryPart,
                inactive: false,
                program_id: None,
                quantity_on_hand: 1.0,
                ninety_day_sales: 0.0,
                class: Some(ClassThresholds {
                    min: Some(2),
                    max: Some(10),
                }),
                bins: vec![ItemBin {
                    bin_id: BinId::new(900),
                    preferred: true,
                }],
                error_marker: String::new(),
            });
        }
        store
    }

    #[test]
    fn every_candidate_is_reduced_exactly_once() {
        let store = store_with_items(25);
        let summary = BatchExecutor::new(&store, config(4, 0)).run();

        assert_eq!(summary.selected, 25);
        assert_eq!(summary.created, 25);
        assert_eq!(summary.candidates.len(), 25);
        assert_eq!(store.calls(StoreOp::CreateRule), 25);
        for id in 1..=25 {
            assert_eq!(store.rules_for_item(ItemId::new(id)).len(), 1);
        }
    }

    #[test]
    fn second_run_finds_nothing_to_do() {
        let store = store_with_items(5);
        let executor = BatchExecutor::new(&store, config(2, 0));
        executor.run();
        store.reset_log();

        let summary = executor.run();
        assert_eq!(summary.selected, 0);
        assert!(store.writes().is_empty());
    }

    #[test]
    fn transient_failures_are_retried() {
        let store = store_with_items(1);
        store.inject(StoreOp::CreateRule, Fault::transient("timeout", 2));

        let summary = BatchExecutor::new(&store, config(1, 2)).run();

        assert_eq!(summary.created, 1);
        assert_eq!(summary.retries, 2);
        assert_eq!(summary.candidates[0].attempts, 3);
        assert_eq!(store.item(ItemId::new(1)).unwrap().error_marker, "");
    }

    #[test]
    fn retries_stop_at_policy_limit() {
        let store = store_with_items(1);
        store.inject(StoreOp::CreateRule, Fault::transient("timeout", 5));

        let summary = BatchExecutor::new(&store, config(1, 1)).run();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.candidates[0].attempts, 2);
        assert!(!store.item(ItemId::new(1)).unwrap().error_marker.is_empty());
    }

    #[test]
    fn permanent_failures_are_not_retried() {
        let store = store_with_items(1);
        store.insert_rule(BinRule {
            id: RuleId::new(55),
            item_id: ItemId::new(1),
            bin_id: None,
            location_id: LocationId::new(7),
            status: RuleStatus::Active,
            min: None,
            max: None,
            inactive: false,
        });
        store.inject(StoreOp::UpdateRule, Fault::permanent("record locked"));

        let summary = BatchExecutor::new(&store, config(2, 3)).run();

        assert_eq!(summary.failed, 1);
        assert_eq!(store.calls(StoreOp::UpdateRule), 1);
        let report = &summary.candidates[0];
        assert_eq!(report.outcome, OutcomeKind::Failed);
        assert_eq!(report.rule_id, Some(RuleId::new(55)));
        assert_eq!(
            store.item(ItemId::new(1)).unwrap().error_marker,
            "could not update bin enhancement 55: storage error: record locked"
        );
    }

    #[test]
    fn selection_failure_yields_empty_batch() {
        let store = store_with_items(3);
        store.inject(StoreOp::QueryItems, Fault::permanent("search unavailable"));

        let summary = BatchExecutor::new(&store, config(2, 0)).run();

        assert_eq!(summary.selected, 0);
        assert!(summary.selection_error.is_some());
        assert!(store.writes().is_empty());
    }
}
