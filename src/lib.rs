//! # spark-dom
//!
//! Fine-grained reactive rendering for DOM-like output trees.
//!
//! ## Architecture
//!
//! Values live in **cells**: stable slot ids that hold a different value in
//! every [`context`] (one per template instance, branch or mapped item).
//! A cell read by an effect is backed by an [`Observable`](cells::Observable);
//! writing it notifies the effects synchronously, and each effect projects
//! the new value onto the output through an [`Effector`](surface::Effector).
//!
//! ```text
//! set() → Observable → Effect::unify(current, previous) → Effector
//!                         │
//!                         ├─ Formatting / Attribute / Style   one node or attribute
//!                         ├─ Template / Application           a nested instance
//!                         ├─ Conditional                      cached branches
//!                         └─ Mapping                          keyed items, append-only
//! ```
//!
//! Only what changed is touched: an effect whose input is the same value as
//! before makes no output call at all, mapped items keep their context and
//! nodes across updates, and an inactive branch is kept for reuse.
//!
//! All state is owned by one [`Runtime`], passed explicitly.
//!
//! ## Modules
//!
//! - [`types`] - Values, keys, node handles
//! - [`cells`] - Slots, cells, observables
//! - [`context`] - Scopes and lookup
//! - [`derive`] - Arguments, applications, extractions, injections
//! - [`effects`] - Effect kinds and their lifecycle
//! - [`template`] - Declarative trees, compiler, instances
//! - [`pipeline`] - Rendering a template at an anchor
//! - [`surface`] - Output adapter trait and the in-memory DOM
//! - [`engine`] - Runtime, arenas, propagation

pub mod cells;
pub mod config;
pub mod context;
pub mod derive;
pub mod effects;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod surface;
pub mod template;
pub mod types;

// Re-export commonly used items
pub use types::{Flow, Key, NodeId, Propagation, Value, ValueMap};

pub use cells::{Cell, Notification, Slot, SlotAllocator, SlotId, Subscription};

pub use config::RuntimeConfig;

pub use context::{Bindings, Hook};

pub use derive::{ArgShape, Argument, Selection};

pub use effects::{Branch, EffectDef, EffectKind, Guard, Lifecycle, TemplateRef};

pub use engine::{ContextId, EffectId, InstanceId, ObservableId, Runtime};

pub use error::{Diagnostic, Error, Result};

pub use pipeline::RenderHandle;

pub use surface::{Effector, MemoryDom};

pub use template::{element, fragment, text, Compiler, Template, VNode};
