//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Implemented by every record type the reconciliation reads or writes
/// (items, bins, programs, rules).
pub trait Entity {
    /// Strongly-typed record identifier. Ordered so stores can keep records
    /// in id order.
    type Id: Copy + Ord + core::hash::Hash + core::fmt::Debug;

    /// Returns the record identifier.
    fn id(&self) -> Self::Id;
}
