//! Relation Registry and Loader
//!
//! The [`RelationRegistry`] indexes the relations of a [`crate::Schema`] by
//! owning table. The [`RelationLoader`] uses it with the query builder to fetch
//! related rows for BelongsTo, HasOne, HasMany and BelongsToMany relations and
//! attaches them to parent rows, recursing into nested includes.
//!
//! Include graphs are expected to be finite; a cyclic include request recurses
//! until the data runs out.

pub mod loader;
pub mod registry;

pub use loader::{Loaded, RelationLoader};
pub use registry::RelationRegistry;
