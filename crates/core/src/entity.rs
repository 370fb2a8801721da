//! Entity trait: identity + continuity across state changes.

/// Anything stored under a stable identifier (positions, ledger entries, staged receipts).
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Ord + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    /// Human-readable entity kind, used in `NotFound` messages.
    const KIND: &'static str;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
