//! Candidate selection: paginated item query + grouping.

use std::collections::BTreeSet;

use tracing::{debug, error, info};

use binsync_inventory::{Candidate, CandidateRow, EligibilityFilter, collapse_rows};

use crate::config::ReconcileConfig;
use crate::error::SelectionError;
use crate::store::{PageRequest, RecordStore};

/// Selects the items whose preferred bin disagrees with their bin enhancement.
///
/// Stateless apart from the store handle and the filter; every call re-runs
/// the query from the first page.
#[derive(Debug, Clone)]
pub struct CandidateSelector<S> {
    store: S,
    filter: EligibilityFilter,
    page_size: usize,
}

impl<S: RecordStore> CandidateSelector<S> {
    pub fn new(store: S, filter: EligibilityFilter, page_size: usize) -> Self {
        Self {
            store,
            filter,
            page_size: page_size.max(1),
        }
    }

    pub fn from_config(store: S, config: &ReconcileConfig) -> Self {
        Self::new(store, config.eligibility_filter(), config.page_size)
    }

    pub fn filter(&self) -> &EligibilityFilter {
        &self.filter
    }

    /// Select candidates, degrading to an empty selection on failure.
    pub fn select_candidates(&self) -> Vec<Candidate> {
        match self.try_select() {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "candidate selection failed; continuing with no candidates");
                Vec::new()
            }
        }
    }

    /// Select candidates, reporting query failures.
    ///
    /// Reads every page before grouping, so rows of one item split across a
    /// page boundary still collapse into a single candidate.
    pub fn try_select(&self) -> Result<Vec<Candidate>, SelectionError> {
        let rows = self.fetch_all_rows()?;
        let row_count = rows.len();
        let candidates = collapse_rows(rows);

        info!(
            rows = row_count,
            candidates = candidates.len(),
            "candidate selection complete"
        );
        Ok(candidates)
    }

    fn fetch_all_rows(&self) -> Result<Vec<CandidateRow>, SelectionError> {
        let mut rows = Vec::new();
        let mut seen_offsets = BTreeSet::new();
        let mut request = Some(PageRequest::first(self.page_size));

        while let Some(page_req) = request {
            if !seen_offsets.insert(page_req.offset) {
                return Err(SelectionError::StalledPagination {
                    offset: page_req.offset,
                });
            }

            let page = self
                .store
                .query_items(&self.filter, page_req)
                .map_err(|source| SelectionError::Query {
                    offset: page_req.offset,
                    source,
                })?;

            debug!(
                offset = page_req.offset,
                rows = page.rows.len(),
                total = page.total,
                "fetched item page"
            );

            if let Some(next) = page.next {
                if next.offset <= page_req.offset {
                    return Err(SelectionError::StalledPagination {
                        offset: page_req.offset,
                    });
                }
            }

            rows.extend(page.rows);
            request = page.next;
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binsync_core::{BinId, ItemId, LocationId, RuleId};
    use binsync_inventory::{
        Bin, BinLabel, BinRule, ClassThresholds, InventoryItem, ItemBin, ItemType, NewBinRule,
        RulePatch, RuleStatus,
    };

    use crate::store::{
        BinRow, Fault, InMemoryRecordStore, ItemPatch, Page, RuleQuery, RuleRow, StoreError,
        StoreOp,
    };

    fn config() -> ReconcileConfig {
        ReconcileConfig::default()
    }

    fn bin(id: u64, label: &str) -> Bin {
        Bin {
            id: BinId::new(id),
            label: BinLabel::new(label).unwrap(),
            location_id: LocationId::new(7),
            inactive: false,
        }
    }

    fn item(id: u64, bin_id: u64) -> InventoryItem {
        InventoryItem {
            id: ItemId::new(id),
            name: format!("TS-{id}"),
            item_type: ItemType::InventoryPart,
            inactive: false,
            program_id: None,
            quantity_on_hand: 3.0,
            ninety_day_sales: 0.0,
            class: Some(ClassThresholds {
                min: Some(2),
                max: Some(10),
            }),
            bins: vec![ItemBin {
                bin_id: BinId::new(bin_id),
                preferred: true,
            }],
            error_marker: String::new(),
        }
    }

    fn rule(id: u64, item: u64, bin: u64) -> BinRule {
        BinRule {
            id: RuleId::new(id),
            item_id: ItemId::new(item),
            bin_id: Some(BinId::new(bin)),
            location_id: LocationId::new(7),
            status: RuleStatus::Active,
            min: Some(2),
            max: Some(10),
            inactive: false,
        }
    }

    #[test]
    fn selects_across_page_boundaries_without_loss() {
        let store = InMemoryRecordStore::new();
        store.insert_bin(bin(900, "A-12"));
        for id in 1..=7 {
            store.insert_item(item(id, 900));
        }

        let selector = CandidateSelector::new(&store, config().eligibility_filter(), 3);
        let candidates = selector.try_select().unwrap();

        assert_eq!(candidates.len(), 7);
        assert_eq!(store.calls(StoreOp::QueryItems), 3);
    }

    #[test]
    fn fan_out_split_across_pages_collapses_to_max_rule() {
        let store = InMemoryRecordStore::new();
        store.insert_bin(bin(900, "A-12"));
        store.insert_bin(bin(901, "A-11"));
        store.insert_item(item(386791, 900));
        store.insert_rule(rule(55, 386791, 901));
        store.insert_rule(rule(71, 386791, 901));

        // One row per page: the two rows of the item land on different pages.
        let selector = CandidateSelector::new(&store, config().eligibility_filter(), 1);
        let candidates = selector.try_select().unwrap();

        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.item_id, ItemId::new(386791));
        assert_eq!(c.rule_id, Some(RuleId::new(71)));
        assert_eq!(c.bin_label.as_str(), "A-12");
        assert_eq!((c.class_min, c.class_max), (Some(2), Some(10)));
    }

    #[test]
    fn items_whose_rule_already_matches_are_not_selected() {
        let store = InMemoryRecordStore::new();
        store.insert_bin(bin(900, "A-12"));
        store.insert_item(item(1, 900));
        store.insert_rule(rule(55, 1, 900));

        let selector = CandidateSelector::from_config(&store, &config());
        assert!(selector.select_candidates().is_empty());
    }

    #[test]
    fn allowlist_restricts_selection() {
        let store = InMemoryRecordStore::new();
        store.insert_bin(bin(900, "A-12"));
        store.insert_item(item(1, 900));
        store.insert_item(item(386791, 900));

        let mut cfg = config();
        cfg.eligibility.item_allowlist = Some(vec![ItemId::new(386791)]);
        let selector = CandidateSelector::from_config(&store, &cfg);
        let ids: Vec<ItemId> = selector.select_candidates().iter().map(|c| c.item_id).collect();
        assert_eq!(ids, vec![ItemId::new(386791)]);
    }

    #[test]
    fn query_failure_degrades_to_empty_selection() {
        let store = InMemoryRecordStore::new();
        store.insert_bin(bin(900, "A-12"));
        store.insert_item(item(1, 900));
        store.inject(StoreOp::QueryItems, Fault::permanent("search timed out"));

        let selector = CandidateSelector::from_config(&store, &config());
        assert!(matches!(
            selector.try_select(),
            Err(SelectionError::Query { offset: 0, .. })
        ));
        assert!(selector.select_candidates().is_empty());
    }

    #[test]
    fn failure_on_a_later_page_discards_partial_results() {
        let store = InMemoryRecordStore::new();
        store.insert_bin(bin(900, "A-12"));
        for id in 1..=4 {
            store.insert_item(item(id, 900));
        }

        let flaky = FlakyPages {
            inner: &store,
            fail_at: 2,
        };
        let selector = CandidateSelector::new(flaky, config().eligibility_filter(), 2);
        assert!(matches!(
            selector.try_select(),
            Err(SelectionError::Query { offset: 2, .. })
        ));
        assert!(selector.select_candidates().is_empty());
    }

    #[test]
    fn non_advancing_pagination_is_an_error() {
        let selector = CandidateSelector::new(StuckStore, config().eligibility_filter(), 10);
        assert!(matches!(
            selector.try_select(),
            Err(SelectionError::StalledPagination { offset: 0 })
        ));
    }

    /// Fails the item query at one offset, delegates everything else.
    struct FlakyPages<'a> {
        inner: &'a InMemoryRecordStore,
        fail_at: usize,
    }

    impl RecordStore for FlakyPages<'_> {
        fn query_items(
            &self,
            filter: &EligibilityFilter,
            page: PageRequest,
        ) -> Result<Page<CandidateRow>, StoreError> {
            if page.offset == self.fail_at {
                return Err(StoreError::Unavailable("connection reset".into()));
            }
            self.inner.query_items(filter, page)
        }

        fn query_rules(&self, query: &RuleQuery) -> Result<Vec<RuleRow>, StoreError> {
            self.inner.query_rules(query)
        }

        fn query_bins(&self, label: &BinLabel) -> Result<Vec<BinRow>, StoreError> {
            self.inner.query_bins(label)
        }

        fn create_rule(&self, rule: &NewBinRule) -> Result<RuleId, StoreError> {
            self.inner.create_rule(rule)
        }

        fn update_rule(&self, rule_id: RuleId, patch: &RulePatch) -> Result<RuleId, StoreError> {
            self.inner.update_rule(rule_id, patch)
        }

        fn update_item(&self, item_id: ItemId, patch: &ItemPatch) -> Result<ItemId, StoreError> {
            self.inner.update_item(item_id, patch)
        }
    }

    /// Always answers with a page pointing back at offset 0.
    struct StuckStore;

    impl RecordStore for StuckStore {
        fn query_items(
            &self,
            _filter: &EligibilityFilter,
            page: PageRequest,
        ) -> Result<Page<CandidateRow>, StoreError> {
            Ok(Page {
                rows: Vec::new(),
                total: 1,
                next: Some(PageRequest {
                    offset: 0,
                    limit: page.limit,
                }),
            })
        }

        fn query_rules(&self, _query: &RuleQuery) -> Result<Vec<RuleRow>, StoreError> {
            Ok(Vec::new())
        }

        fn query_bins(&self, _label: &BinLabel) -> Result<Vec<BinRow>, StoreError> {
            Ok(Vec::new())
        }

        fn create_rule(&self, _rule: &NewBinRule) -> Result<RuleId, StoreError> {
            Err(StoreError::Storage("read-only".into()))
        }

        fn update_rule(&self, _rule_id: RuleId, _patch: &RulePatch) -> Result<RuleId, StoreError> {
            Err(StoreError::Storage("read-only".into()))
        }

        fn update_item(&self, _item_id: ItemId, _patch: &ItemPatch) -> Result<ItemId, StoreError> {
            Err(StoreError::Storage("read-only".into()))
        }
    }
}
