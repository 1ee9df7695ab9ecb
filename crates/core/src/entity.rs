//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Inventory rows, orders and deliveries are entities: two records with the same
/// id are the same record, whatever their counters or status say.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
