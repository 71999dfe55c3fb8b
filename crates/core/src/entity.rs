//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Stock records, containers, locations and demand requests are entities: a
/// stock record keeps its identity while its quantities change in place.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + Ord + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}
