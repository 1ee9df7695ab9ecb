//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have **no identity**; two instances holding the same values are
/// the same value. In this workspace the order number, a priced order line and a
/// shipment's tracking details are value objects.
///
/// Value objects are immutable: to "change" one, build a new one.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct OrderNo(String);
///
/// impl ValueObject for OrderNo {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
