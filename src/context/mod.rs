//! Contexts - scoped, parent-chaining maps from slot id to value.
//!
//! A context is created per render activation: one per template instance,
//! per conditional branch, per mapped item. Contexts live in an arena inside
//! the [`Store`] and refer to each other by [`ContextId`].
//!
//! # Lookup rules
//!
//! - A context's own entries shadow its parent's.
//! - A lookup that misses locally continues in the parent...
//! - ...unless the context is a component boundary (`derive_isolated`).
//!   Named components start a fresh namespace there; cells explicitly passed
//!   as bindings are visible because they are own entries of the boundary.
//! - When an explicit binding and an inherited cell share a name, the
//!   explicit binding wins.
//! - Releasing a context never touches its parent's entries.

mod scope;
mod store;

pub use crate::engine::ContextId;
pub use scope::{Binding, Bindings, ContextData, Entry, Hook, HookHandler};
pub use store::{Store, Write};
