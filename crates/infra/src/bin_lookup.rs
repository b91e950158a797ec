//! Bin label → bin id resolution.

use tracing::debug;

use binsync_core::BinId;
use binsync_inventory::BinLabel;

use crate::error::ResolutionError;
use crate::store::RecordStore;

/// Exact-match lookup of a bin by label.
///
/// Returns `Ok(None)` when no bin carries the label. More than one distinct
/// match is an `Ambiguous` error rather than an arbitrary pick.
pub fn find_bin_id<S>(store: &S, label: &BinLabel) -> Result<Option<BinId>, ResolutionError>
where
    S: RecordStore + ?Sized,
{
    let rows = store
        .query_bins(label)
        .map_err(|source| ResolutionError::Store {
            label: label.clone(),
            source,
        })?;

    let mut ids: Vec<BinId> = rows
        .into_iter()
        .filter(|row| &row.label == label)
        .map(|row| row.id)
        .collect();
    ids.sort_unstable();
    ids.dedup();

    debug!(bin_label = %label, matches = ids.len(), "bin lookup");

    match ids.as_slice() {
        [] => Ok(None),
        [id] => Ok(Some(*id)),
        _ => Err(ResolutionError::Ambiguous {
            label: label.clone(),
            ids,
        }),
    }
}
