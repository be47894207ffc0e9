//! Engine - the runtime that owns every context, observable, effect and
//! template instance.
//!
//! # Architecture
//!
//! Nothing in the engine is an object graph. Contexts, observables, live
//! effects and template instances are entries in generational arenas, and
//! refer to each other through copyable handles:
//!
//! ```text
//! ContextId(0v0)  root      parent=-       entries={10: Observed(0v0), 2: Value(..)}
//! ContextId(1v0)  branch    parent=0v0     entries={}
//! ContextId(2v0)  item #0   parent=0v0     entries={40: Value(10), 8: Value(0)}
//! ```
//!
//! The [`Runtime`] is the single owner of all of it. Every operation takes
//! `&mut Runtime` and an explicit [`ContextId`]; there is no ambient
//! "current context".

pub mod arena;
mod propagation;
mod runtime;

pub use arena::{ContextId, EffectId, InstanceId, ObservableId};
pub use runtime::Runtime;
