//! Per-candidate reconciliation (the reduce step).
//!
//! For each candidate the reconciler decides between create, update and no-op,
//! applies at most one rule write, then clears or sets the item's error
//! marker. Nothing here panics or propagates: every failure ends up in the
//! returned [`ReconcileReport`].

use tracing::{Span, debug, error, info, info_span, warn};

use binsync_core::{ItemId, LocationId, RuleId};
use binsync_inventory::{
    BinLabel, Candidate, NewBinRule, ReconcileAction, RulePatch, RuleStatus, decide,
};

use crate::bin_lookup::find_bin_id;
use crate::config::ReconcileConfig;
use crate::error::{MarkerWriteError, PersistenceError, ResolutionError};
use crate::store::{ItemPatch, RecordStore, RuleQuery, RuleRow, StoreError};

/// Error markers longer than this are truncated.
pub const MARKER_MAX_CHARS: usize = 300;

/// Terminal state of one reconciliation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created { rule_id: RuleId },
    Updated { rule_id: RuleId },
    Unchanged { rule_id: RuleId },
    /// The preferred bin label did not resolve to exactly one bin.
    Skipped { reason: ResolutionError },
    Failed { error: PersistenceError },
}

impl ReconcileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::Created { .. }
                | ReconcileOutcome::Updated { .. }
                | ReconcileOutcome::Unchanged { .. }
        )
    }

    /// A failure that re-running the reduce step may fix.
    pub fn is_transient_failure(&self) -> bool {
        matches!(self, ReconcileOutcome::Failed { error } if error.is_transient())
    }
}

/// What happened to the item's error marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerWrite {
    Untouched,
    Cleared,
    Set,
    Failed(MarkerWriteError),
}

/// Full account of one `reconcile` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub item_id: ItemId,
    /// Rule the candidate was linked to when selected.
    pub rule_id: Option<RuleId>,
    pub bin_label: BinLabel,
    /// The action actually taken; a guarded create may end as an update or a no-op.
    pub action: ReconcileAction,
    pub outcome: ReconcileOutcome,
    pub marker: MarkerWrite,
}

/// Applies candidates to the rule store.
#[derive(Debug, Clone)]
pub struct Reconciler<S> {
    store: S,
    location_id: LocationId,
}

impl<S: RecordStore> Reconciler<S> {
    pub fn new(store: S, location_id: LocationId) -> Self {
        Self { store, location_id }
    }

    pub fn from_config(store: S, config: &ReconcileConfig) -> Self {
        Self::new(store, config.location_id)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reconcile one candidate. Safe to call again with the same candidate.
    ///
    /// A create that finds the item already linked to an active rule settles
    /// on that rule instead. That rule may be the one an earlier attempt
    /// committed without an acknowledgement, so the marker is cleared even
    /// when no write was needed.
    pub fn reconcile(&self, candidate: &Candidate) -> ReconcileReport {
        let span = info_span!(
            "reconcile",
            item_id = %candidate.item_id,
            rule_id = tracing::field::Empty,
            bin_label = %candidate.bin_label,
        );
        if let Some(rule_id) = candidate.rule_id {
            span.record("rule_id", rule_id.get());
        }
        let _guard = span.enter();

        let existing = candidate.rule_id.and_then(|id| self.rule_label(id));
        let action = decide(candidate, existing.as_ref());
        debug!(action = action.name(), existing_label = ?existing, "decided");

        let (action, outcome, marker) = match action {
            ReconcileAction::Create => {
                let (action, outcome) = self.create(candidate);
                let marker = self.write_marker(candidate.item_id, &outcome, true);
                (action, outcome, marker)
            }
            ReconcileAction::Update { rule_id } => {
                let outcome = self.update(candidate, rule_id);
                let marker = self.write_marker(candidate.item_id, &outcome, false);
                (action, outcome, marker)
            }
            ReconcileAction::Unchanged { rule_id } => {
                (action, ReconcileOutcome::Unchanged { rule_id }, MarkerWrite::Untouched)
            }
        };
        log_outcome(&outcome, &marker);

        ReconcileReport {
            item_id: candidate.item_id,
            rule_id: candidate.rule_id,
            bin_label: candidate.bin_label.clone(),
            action,
            outcome,
            marker,
        }
    }

    /// Current bin label of an active rule. Read failures count as "no label".
    fn rule_label(&self, rule_id: RuleId) -> Option<BinLabel> {
        match self.store.query_rules(&RuleQuery::ById(rule_id)) {
            Ok(rows) => rows.into_iter().next().and_then(|row| row.bin_label),
            Err(e) => {
                warn!(
                    rule_id = %rule_id,
                    error = %e,
                    "could not read rule bin; treating as mismatch"
                );
                None
            }
        }
    }

    /// Conditional create: only when no active rule is linked to the item.
    fn create(&self, candidate: &Candidate) -> (ReconcileAction, ReconcileOutcome) {
        let mut conflicted = false;

        loop {
            match self.active_rule(candidate.item_id) {
                Err(source) => {
                    let error = PersistenceError::Lookup {
                        item_id: candidate.item_id,
                        source,
                    };
                    return (ReconcileAction::Create, ReconcileOutcome::Failed { error });
                }
                Ok(Some(row)) => {
                    info!(rule_id = %row.id, "item already has a bin enhancement; not creating");
                    Span::current().record("rule_id", row.id.get());
                    return self.settle_on(candidate, row);
                }
                Ok(None) => {}
            }

            let thresholds = candidate.thresholds();
            let rule = NewBinRule {
                item_id: candidate.item_id,
                bin_label: candidate.bin_label.clone(),
                location_id: self.location_id,
                status: RuleStatus::Active,
                min: thresholds.min,
                max: thresholds.max,
            };

            match self.store.create_rule(&rule) {
                Ok(rule_id) => {
                    return (ReconcileAction::Create, ReconcileOutcome::Created { rule_id });
                }
                Err(StoreError::Conflict(msg)) if !conflicted => {
                    warn!(conflict = %msg, "create raced another writer; re-checking");
                    conflicted = true;
                }
                Err(source) => {
                    let error = PersistenceError::Create {
                        item_id: candidate.item_id,
                        source,
                    };
                    return (ReconcileAction::Create, ReconcileOutcome::Failed { error });
                }
            }
        }
    }

    /// Bring the item's existing active rule in line with the candidate.
    fn settle_on(
        &self,
        candidate: &Candidate,
        row: RuleRow,
    ) -> (ReconcileAction, ReconcileOutcome) {
        let rule_id = row.id;
        if row.bin_label.as_ref() == Some(&candidate.bin_label) {
            return (
                ReconcileAction::Unchanged { rule_id },
                ReconcileOutcome::Unchanged { rule_id },
            );
        }
        let linked = Candidate {
            rule_id: Some(rule_id),
            ..candidate.clone()
        };
        (ReconcileAction::Update { rule_id }, self.update(&linked, rule_id))
    }

    fn active_rule(&self, item_id: ItemId) -> Result<Option<RuleRow>, StoreError> {
        let rows = self.store.query_rules(&RuleQuery::ByItem(item_id))?;
        // Newest wins if the store ever holds more than one.
        Ok(rows.into_iter().max_by_key(|row| row.id))
    }

    /// Point the rule at the candidate's bin.
    ///
    /// A label that resolves to no bin, or to several, skips the candidate.
    /// A store failure while resolving the label is a failed attempt and sets
    /// the marker; it is not mistaken for a missing bin.
    fn update(&self, candidate: &Candidate, rule_id: RuleId) -> ReconcileOutcome {
        let bin_id = match find_bin_id(&self.store, &candidate.bin_label) {
            Ok(Some(bin_id)) => bin_id,
            Ok(None) => {
                return ReconcileOutcome::Skipped {
                    reason: ResolutionError::Unresolved {
                        label: candidate.bin_label.clone(),
                    },
                };
            }
            Err(reason @ ResolutionError::Store { .. }) => {
                return ReconcileOutcome::Failed {
                    error: PersistenceError::Resolution(reason),
                };
            }
            Err(reason) => return ReconcileOutcome::Skipped { reason },
        };

        let thresholds = candidate.thresholds();
        let patch = RulePatch {
            bin_id,
            location_id: self.location_id,
            status: RuleStatus::Active,
            min: thresholds.min,
            max: thresholds.max,
        };

        match self.store.update_rule(rule_id, &patch) {
            Ok(rule_id) => ReconcileOutcome::Updated { rule_id },
            Err(source) => ReconcileOutcome::Failed {
                error: PersistenceError::Update { rule_id, source },
            },
        }
    }

    /// Clear the marker on success, set it on failure.
    ///
    /// `Unchanged` clears only when it settles a create; otherwise it and
    /// `Skipped` leave the marker as it was.
    fn write_marker(
        &self,
        item_id: ItemId,
        outcome: &ReconcileOutcome,
        settles_create: bool,
    ) -> MarkerWrite {
        let (patch, written) = match outcome {
            ReconcileOutcome::Created { .. } | ReconcileOutcome::Updated { .. } => {
                (ItemPatch::clear_error_marker(), MarkerWrite::Cleared)
            }
            ReconcileOutcome::Unchanged { .. } if settles_create => {
                (ItemPatch::clear_error_marker(), MarkerWrite::Cleared)
            }
            ReconcileOutcome::Failed { error } => {
                (ItemPatch::error_marker(marker_text(error)), MarkerWrite::Set)
            }
            ReconcileOutcome::Unchanged { .. } | ReconcileOutcome::Skipped { .. } => {
                return MarkerWrite::Untouched;
            }
        };

        match self.store.update_item(item_id, &patch) {
            Ok(_) => written,
            Err(source) => {
                let e = MarkerWriteError { item_id, source };
                error!(error = %e, "error marker write failed");
                MarkerWrite::Failed(e)
            }
        }
    }
}

/// Marker text for a failure, cut to [`MARKER_MAX_CHARS`] characters.
pub fn marker_text(error: &PersistenceError) -> String {
    let text = error.to_string();
    match text.char_indices().nth(MARKER_MAX_CHARS) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text,
    }
}

fn log_outcome(outcome: &ReconcileOutcome, marker: &MarkerWrite) {
    match outcome {
        ReconcileOutcome::Created { rule_id } => {
            info!(rule_id = %rule_id, ?marker, "bin enhancement created");
        }
        ReconcileOutcome::Updated { rule_id } => {
            info!(rule_id = %rule_id, ?marker, "bin enhancement updated");
        }
        ReconcileOutcome::Unchanged { rule_id } => {
            debug!(rule_id = %rule_id, "bin enhancement already matches");
        }
        ReconcileOutcome::Skipped { reason } => {
            warn!(reason = %reason, "bin not resolved; skipping");
        }
        ReconcileOutcome::Failed { error } => {
            error!(
                error = %error,
                transient = error.is_transient(),
                ?marker,
                "reconciliation failed"
            );
        }
    }
}
