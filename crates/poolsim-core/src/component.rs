//! Component identifiers.

/// Identifier of a simulation component.
///
/// Assigned sequentially from 0 in the order components are registered.
pub type Id = u32;
