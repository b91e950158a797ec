//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects carry no identity of their own; two instances with the same
/// attribute values are interchangeable. Class thresholds and bin labels are
/// the main examples here: a rule mirrors them, it does not reference them.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct ClassThresholds { min: Option<i64>, max: Option<i64> }
///
/// impl ValueObject for ClassThresholds {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
