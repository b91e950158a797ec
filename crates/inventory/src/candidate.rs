//! Selection rows and their collapse into reconciliation candidates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use binsync_core::{ItemId, RuleId};

use crate::bin::BinLabel;
use crate::item::ClassThresholds;

/// One joined item × rule row as returned by the item query.
///
/// An item linked to more than one rule yields one row per rule (join
/// fan-out), so several rows may share an `item_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRow {
    pub item_id: ItemId,
    pub rule_id: Option<RuleId>,
    pub bin_label: BinLabel,
    pub class_min: Option<i64>,
    pub class_max: Option<i64>,
}

/// An item selected for reconciliation in the current batch pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub item_id: ItemId,
    pub rule_id: Option<RuleId>,
    pub bin_label: BinLabel,
    pub class_min: Option<i64>,
    pub class_max: Option<i64>,
}

impl Candidate {
    pub fn thresholds(&self) -> ClassThresholds {
        ClassThresholds {
            min: self.class_min,
            max: self.class_max,
        }
    }
}

impl From<CandidateRow> for Candidate {
    fn from(row: CandidateRow) -> Self {
        Self {
            item_id: row.item_id,
            rule_id: row.rule_id,
            bin_label: row.bin_label,
            class_min: row.class_min,
            class_max: row.class_max,
        }
    }
}

/// Group rows by item and collapse each group to a single candidate.
///
/// The representative row is the one with the greatest rule id (`None` sorts
/// lowest); ties fall to the lexicographically smallest bin label. Output is
/// ordered by item id, independent of input order.
pub fn collapse_rows(rows: impl IntoIterator<Item = CandidateRow>) -> Vec<Candidate> {
    let mut groups: BTreeMap<ItemId, CandidateRow> = BTreeMap::new();

    for row in rows {
        match groups.get_mut(&row.item_id) {
            None => {
                groups.insert(row.item_id, row);
            }
            Some(current) => {
                if current.bin_label != row.bin_label {
                    warn!(
                        item_id = %row.item_id,
                        kept = %current.bin_label,
                        other = %row.bin_label,
                        "item has more than one preferred bin label in selection"
                    );
                }
                if outranks(&row, current) {
                    *current = row;
                }
            }
        }
    }

    groups.into_values().map(Candidate::from).collect()
}

fn outranks(row: &CandidateRow, current: &CandidateRow) -> bool {
    match row.rule_id.cmp(&current.rule_id) {
        core::cmp::Ordering::Greater => true,
        core::cmp::Ordering::Less => false,
        core::cmp::Ordering::Equal => row.bin_label < current.bin_label,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn row(item: u64, rule: Option<u64>, label: &str) -> CandidateRow {
        CandidateRow {
            item_id: ItemId::new(item),
            rule_id: rule.map(RuleId::new),
            bin_label: BinLabel::new(label).unwrap(),
            class_min: Some(2),
            class_max: Some(10),
        }
    }

    #[test]
    fn fan_out_collapses_to_max_rule_id() {
        let out = collapse_rows(vec![
            row(386791, Some(55), "A-12"),
            row(386791, Some(71), "A-12"),
            row(386791, None, "A-12"),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rule_id, Some(RuleId::new(71)));
    }

    #[test]
    fn conflicting_labels_break_ties_on_smallest_label() {
        let out = collapse_rows(vec![row(1, Some(5), "B-01"), row(1, Some(5), "A-01")]);
        assert_eq!(out[0].bin_label.as_str(), "A-01");
    }

    #[test]
    fn distinct_items_stay_separate_and_sorted() {
        let out = collapse_rows(vec![
            row(3, None, "C"),
            row(1, None, "A"),
            row(2, Some(9), "B"),
        ]);
        let ids: Vec<u64> = out.iter().map(|c| c.item_id.get()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    fn rows() -> impl Strategy<Value = Vec<CandidateRow>> {
        let labels = ["A-01", "A-02", "B-01"];
        let raw = (1u64..20, prop::option::of(1u64..50), 0usize..3);
        prop::collection::vec(raw, 0..40).prop_map(move |raw| {
            raw.into_iter()
                .map(|(item, rule, l)| row(item, rule, labels[l]))
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: collapse is insensitive to row order and yields one candidate per item.
        #[test]
        fn collapse_is_order_independent(
            (rows, shuffled) in rows()
                .prop_flat_map(|rows| (Just(rows.clone()), Just(rows).prop_shuffle())),
        ) {
            let a = collapse_rows(rows.clone());
            let b = collapse_rows(shuffled);
            prop_assert_eq!(&a, &b);

            let mut items: Vec<ItemId> = rows.iter().map(|r| r.item_id).collect();
            items.sort_unstable();
            items.dedup();
            prop_assert_eq!(a.len(), items.len());

            for c in &a {
                let max_rule = rows
                    .iter()
                    .filter(|r| r.item_id == c.item_id)
                    .map(|r| r.rule_id)
                    .max()
                    .flatten();
                prop_assert_eq!(c.rule_id, max_rule);
            }
        }
    }
}
