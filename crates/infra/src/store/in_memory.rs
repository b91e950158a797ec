use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};

use binsync_core::{BinId, Entity, ItemId, ProgramId, RuleId};
use binsync_inventory::{
    Bin, BinLabel, BinRule, CandidateRow, EligibilityFacts, EligibilityFilter, InventoryItem,
    NewBinRule, Program, RulePatch,
};

use super::r#trait::{
    BinRow, ItemPatch, Page, PageRequest, RecordKind, RecordStore, RuleQuery, RuleRow, StoreError,
};

/// Store operation, used to target injected faults and count calls.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StoreOp {
    QueryItems,
    QueryRules,
    QueryBins,
    CreateRule,
    UpdateRule,
    UpdateItem,
}

/// Injected failure for one store operation.
#[derive(Debug, Clone)]
pub struct Fault {
    error: StoreError,
    /// Remaining failures; `None` fails forever.
    remaining: Option<u32>,
}

impl Fault {
    /// Fail every call with a non-transient storage error.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            error: StoreError::Storage(message.into()),
            remaining: None,
        }
    }

    /// Fail the next `times` calls with a transient error, then succeed.
    pub fn transient(message: impl Into<String>, times: u32) -> Self {
        Self {
            error: StoreError::Unavailable(message.into()),
            remaining: Some(times),
        }
    }

    /// Fail every call with the given error.
    pub fn always(error: StoreError) -> Self {
        Self {
            error,
            remaining: None,
        }
    }
}

/// Mutation applied to the store, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteRecord {
    RuleCreated { rule_id: RuleId, rule: NewBinRule },
    RuleUpdated { rule_id: RuleId, patch: RulePatch },
    ItemUpdated { item_id: ItemId, patch: ItemPatch },
}

/// Serializable store contents, used to seed and dump the in-memory store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub items: Vec<InventoryItem>,
    #[serde(default)]
    pub bins: Vec<Bin>,
    #[serde(default)]
    pub programs: Vec<Program>,
    #[serde(default)]
    pub rules: Vec<BinRule>,
}

#[derive(Debug, Default)]
struct State {
    items: BTreeMap<ItemId, InventoryItem>,
    bins: BTreeMap<BinId, Bin>,
    programs: BTreeMap<ProgramId, Program>,
    rules: BTreeMap<RuleId, BinRule>,
    next_rule_id: u64,
}

impl State {
    fn active_rules_for(&self, item_id: ItemId) -> impl Iterator<Item = &BinRule> {
        self.rules
            .values()
            .filter(move |r| r.item_id == item_id && !r.inactive)
    }

    fn bin_label(&self, bin_id: Option<BinId>) -> Option<&BinLabel> {
        bin_id.and_then(|id| self.bins.get(&id)).map(|b| &b.label)
    }

    fn rule_row(&self, rule: &BinRule) -> RuleRow {
        RuleRow {
            id: rule.id,
            item_id: rule.item_id,
            bin_id: rule.bin_id,
            bin_label: self.bin_label(rule.bin_id).cloned(),
        }
    }

    /// All joined rows matching `filter`, ordered by item id, then bin association, then rule id.
    fn matching_rows(&self, filter: &EligibilityFilter) -> Vec<CandidateRow> {
        let mut rows = Vec::new();

        for item in self.items.values() {
            let program = item.program_id.and_then(|p| self.programs.get(&p));
            let rules: Vec<&BinRule> = self.active_rules_for(item.id).collect();
            let thresholds = item.thresholds();

            for assoc in &item.bins {
                let Some(bin) = self.bins.get(&assoc.bin_id) else {
                    continue;
                };

                // Left join: an item without rules still yields one row.
                let joined: Vec<Option<&BinRule>> = if rules.is_empty() {
                    vec![None]
                } else {
                    rules.iter().copied().map(Some).collect()
                };

                for rule in joined {
                    let facts = EligibilityFacts {
                        item,
                        bin,
                        preferred: assoc.preferred,
                        program,
                        rule_bin_label: rule.and_then(|r| self.bin_label(r.bin_id)),
                    };
                    if filter.matches(&facts) {
                        rows.push(CandidateRow {
                            item_id: item.id,
                            rule_id: rule.map(|r| r.id),
                            bin_label: bin.label.clone(),
                            class_min: thresholds.min,
                            class_max: thresholds.max,
                        });
                    }
                }
            }
        }

        rows
    }
}

/// In-memory record store for tests/dev and snapshot dry runs.
///
/// Enforces the same constraints a production store would: one active rule
/// per item, bin labels resolved at rule creation, partial updates only.
/// Faults can be injected per operation and every mutation is recorded.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    state: RwLock<State>,
    faults: Mutex<HashMap<StoreOp, Fault>>,
    calls: Mutex<HashMap<StoreOp, usize>>,
    writes: Mutex<Vec<WriteRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.write().unwrap_or_else(|e| e.into_inner());
            upsert_all(&mut state.items, snapshot.items);
            upsert_all(&mut state.bins, snapshot.bins);
            upsert_all(&mut state.programs, snapshot.programs);
            state.next_rule_id = snapshot
                .rules
                .iter()
                .map(|r| r.id.get())
                .fold(state.next_rule_id, u64::max);
            upsert_all(&mut state.rules, snapshot.rules);
        }
        store
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        StoreSnapshot {
            items: state.items.values().cloned().collect(),
            bins: state.bins.values().cloned().collect(),
            programs: state.programs.values().cloned().collect(),
            rules: state.rules.values().cloned().collect(),
        }
    }

    pub fn insert_item(&self, item: InventoryItem) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        upsert_all(&mut state.items, [item]);
    }

    pub fn insert_bin(&self, bin: Bin) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        upsert_all(&mut state.bins, [bin]);
    }

    pub fn insert_program(&self, program: Program) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        upsert_all(&mut state.programs, [program]);
    }

    pub fn insert_rule(&self, rule: BinRule) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.next_rule_id = state.next_rule_id.max(rule.id.get());
        upsert_all(&mut state.rules, [rule]);
    }

    /// Change an item's preferred bin (simulates an edit made on the platform).
    pub fn set_preferred_bin(&self, item_id: ItemId, bin_id: BinId) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if let Some(item) = state.items.get_mut(&item_id) {
            let mut found = false;
            for assoc in &mut item.bins {
                assoc.preferred = assoc.bin_id == bin_id;
                found |= assoc.preferred;
            }
            if !found {
                item.bins.push(binsync_inventory::ItemBin {
                    bin_id,
                    preferred: true,
                });
            }
        }
    }

    pub fn item(&self, item_id: ItemId) -> Option<InventoryItem> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.items.get(&item_id).cloned()
    }

    pub fn rule(&self, rule_id: RuleId) -> Option<BinRule> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.rules.get(&rule_id).cloned()
    }

    /// All rules (active or not) linked to an item, by id.
    pub fn rules_for_item(&self, item_id: ItemId) -> Vec<BinRule> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .rules
            .values()
            .filter(|r| r.item_id == item_id)
            .cloned()
            .collect()
    }

    /// Label of the bin a rule points at.
    pub fn rule_bin_label(&self, rule_id: RuleId) -> Option<BinLabel> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let rule = state.rules.get(&rule_id)?;
        state.bin_label(rule.bin_id).cloned()
    }

    pub fn inject(&self, op: StoreOp, fault: Fault) {
        self.faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(op, fault);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Number of calls made to `op` (including failed ones).
    pub fn calls(&self, op: StoreOp) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Rule creations and updates only.
    pub fn rule_writes(&self) -> Vec<WriteRecord> {
        self.writes()
            .into_iter()
            .filter(|w| !matches!(w, WriteRecord::ItemUpdated { .. }))
            .collect()
    }

    /// Error marker values written to one item, in order.
    pub fn marker_writes(&self, item_id: ItemId) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                WriteRecord::ItemUpdated { item_id: id, patch } if id == item_id => {
                    patch.error_marker
                }
                _ => None,
            })
            .collect()
    }

    pub fn reset_log(&self) {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Count the call and apply any injected fault.
    fn enter(&self, op: StoreOp) -> Result<(), StoreError> {
        *self
            .calls
            .lock()
            .map_err(|_| poisoned())?
            .entry(op)
            .or_insert(0) += 1;

        let mut faults = self.faults.lock().map_err(|_| poisoned())?;
        let Some(fault) = faults.get_mut(&op) else {
            return Ok(());
        };
        let outcome = match fault.remaining {
            None => Some(fault.error.clone()),
            Some(0) => None,
            Some(n) => {
                fault.remaining = Some(n - 1);
                Some(fault.error.clone())
            }
        };
        if fault.remaining == Some(0) {
            faults.remove(&op);
        }
        match outcome {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn record(&self, write: WriteRecord) -> Result<(), StoreError> {
        self.writes.lock().map_err(|_| poisoned())?.push(write);
        Ok(())
    }
}

/// Insert or replace records keyed by their id.
fn upsert_all<E: Entity>(table: &mut BTreeMap<E::Id, E>, records: impl IntoIterator<Item = E>) {
    for record in records {
        table.insert(record.id(), record);
    }
}

fn poisoned() -> StoreError {
    StoreError::Storage("in-memory store lock poisoned".to_string())
}

impl RecordStore for InMemoryRecordStore {
    fn query_items(
        &self,
        filter: &EligibilityFilter,
        page: PageRequest,
    ) -> Result<Page<CandidateRow>, StoreError> {
        self.enter(StoreOp::QueryItems)?;
        if page.limit == 0 {
            return Err(StoreError::InvalidField {
                field: "limit",
                reason: "page size must be positive".to_string(),
            });
        }

        let state = self.state.read().map_err(|_| poisoned())?;
        let rows = state.matching_rows(filter);
        let total = rows.len();
        let end = page.offset.saturating_add(page.limit).min(total);
        let slice = if page.offset < total {
            rows[page.offset..end].to_vec()
        } else {
            Vec::new()
        };
        let next = (end < total).then_some(PageRequest {
            offset: end,
            limit: page.limit,
        });

        Ok(Page {
            rows: slice,
            total,
            next,
        })
    }

    fn query_rules(&self, query: &RuleQuery) -> Result<Vec<RuleRow>, StoreError> {
        self.enter(StoreOp::QueryRules)?;
        let state = self.state.read().map_err(|_| poisoned())?;

        let rows = match *query {
            RuleQuery::ById(rule_id) => state
                .rules
                .get(&rule_id)
                .filter(|r| !r.inactive)
                .map(|r| vec![state.rule_row(r)])
                .unwrap_or_default(),
            RuleQuery::ByItem(item_id) => state
                .active_rules_for(item_id)
                .map(|r| state.rule_row(r))
                .collect(),
        };
        Ok(rows)
    }

    fn query_bins(&self, label: &BinLabel) -> Result<Vec<BinRow>, StoreError> {
        self.enter(StoreOp::QueryBins)?;
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .bins
            .values()
            .filter(|b| &b.label == label)
            .map(|b| BinRow {
                id: b.id,
                label: b.label.clone(),
            })
            .collect())
    }

    fn create_rule(&self, rule: &NewBinRule) -> Result<RuleId, StoreError> {
        self.enter(StoreOp::CreateRule)?;
        let mut state = self.state.write().map_err(|_| poisoned())?;

        if !state.items.contains_key(&rule.item_id) {
            return Err(StoreError::InvalidField {
                field: "item",
                reason: format!("{} {} not found", RecordKind::Item, rule.item_id),
            });
        }

        if let Some(existing) = state.active_rules_for(rule.item_id).next() {
            return Err(StoreError::Conflict(format!(
                "item {} already has active bin enhancement {}",
                rule.item_id, existing.id
            )));
        }

        // Text-to-id resolution at save time; prefer a bin at the rule's location.
        let bin_id = {
            let matches: Vec<&Bin> = state
                .bins
                .values()
                .filter(|b| b.label == rule.bin_label)
                .collect();
            match matches.as_slice() {
                [] => {
                    return Err(StoreError::InvalidField {
                        field: "bin",
                        reason: format!("invalid reference {:?}", rule.bin_label.as_str()),
                    });
                }
                [only] => only.id,
                many => {
                    let local: Vec<BinId> = many
                        .iter()
                        .filter(|b| b.location_id == rule.location_id)
                        .map(|b| b.id)
                        .collect();
                    match local.as_slice() {
                        [only] => *only,
                        _ => {
                            return Err(StoreError::InvalidField {
                                field: "bin",
                                reason: format!(
                                    "ambiguous reference {:?} ({} bins)",
                                    rule.bin_label.as_str(),
                                    many.len()
                                ),
                            });
                        }
                    }
                }
            }
        };

        state.next_rule_id += 1;
        let rule_id = RuleId::new(state.next_rule_id);
        state.rules.insert(
            rule_id,
            BinRule {
                id: rule_id,
                item_id: rule.item_id,
                bin_id: Some(bin_id),
                location_id: rule.location_id,
                status: rule.status,
                min: rule.min,
                max: rule.max,
                inactive: false,
            },
        );
        drop(state);

        self.record(WriteRecord::RuleCreated {
            rule_id,
            rule: rule.clone(),
        })?;
        Ok(rule_id)
    }

    fn update_rule(&self, rule_id: RuleId, patch: &RulePatch) -> Result<RuleId, StoreError> {
        self.enter(StoreOp::UpdateRule)?;
        let mut state = self.state.write().map_err(|_| poisoned())?;

        if !state.bins.contains_key(&patch.bin_id) {
            return Err(StoreError::InvalidField {
                field: "bin",
                reason: format!("{} {} not found", RecordKind::Bin, patch.bin_id),
            });
        }

        let rule = state.rules.get_mut(&rule_id).ok_or(StoreError::NotFound {
            kind: RecordKind::Rule,
            id: rule_id.get(),
        })?;
        rule.bin_id = Some(patch.bin_id);
        rule.location_id = patch.location_id;
        rule.status = patch.status;
        rule.min = patch.min;
        rule.max = patch.max;
        drop(state);

        self.record(WriteRecord::RuleUpdated {
            rule_id,
            patch: patch.clone(),
        })?;
        Ok(rule_id)
    }

    fn update_item(&self, item_id: ItemId, patch: &ItemPatch) -> Result<ItemId, StoreError> {
        self.enter(StoreOp::UpdateItem)?;
        let mut state = self.state.write().map_err(|_| poisoned())?;

        let item = state.items.get_mut(&item_id).ok_or(StoreError::NotFound {
            kind: RecordKind::Item,
            id: item_id.get(),
        })?;
        if let Some(marker) = &patch.error_marker {
            item.error_marker = marker.clone();
        }
        drop(state);

        self.record(WriteRecord::ItemUpdated {
            item_id,
            patch: patch.clone(),
        })?;
        Ok(item_id)
    }
}
