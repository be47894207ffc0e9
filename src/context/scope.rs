//! Context data - one scope of slot values.

use std::collections::HashMap;
use std::rc::Rc;

use crate::cells::{Cell, Slot, SlotId};
use crate::engine::{ContextId, ObservableId, Runtime};
use crate::error::Result;
use crate::types::{Key, Value};

// =============================================================================
// Entries
// =============================================================================

/// What a context stores under a slot id.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// A plain value, not watched by anything yet.
    Value(Value),
    /// A value held by an observable, owned by this context or shared from
    /// another one.
    Observed(ObservableId),
    /// A cached child context (derivations store their derived context here).
    Context(ContextId),
}

// =============================================================================
// Lifecycle hooks
// =============================================================================

/// Lifecycle events a context can listen to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    Mount,
    Unmount,
}

/// Callback fired for a [`Hook`]. Receives the context that triggered it.
pub type HookHandler = Rc<dyn Fn(&mut Runtime, ContextId) -> Result<()>>;

// =============================================================================
// Context data
// =============================================================================

/// One scope of the lookup chain.
///
/// Lookups that miss locally continue in the parent, unless the context is
/// `isolated` (a component boundary).
pub struct ContextData {
    pub(crate) parent: Option<ContextId>,
    pub(crate) isolated: bool,
    pub(crate) entries: HashMap<SlotId, Entry>,
    pub(crate) names: HashMap<Rc<str>, SlotId>,
    pub(crate) key: Option<Key>,
    pub(crate) children: Vec<ContextId>,
    pub(crate) owned: Vec<ObservableId>,
    pub(crate) hooks: Vec<(Hook, HookHandler)>,
}

impl ContextData {
    pub(crate) fn new(parent: Option<ContextId>, isolated: bool) -> Self {
        Self {
            parent,
            isolated,
            entries: HashMap::new(),
            names: HashMap::new(),
            key: None,
            children: Vec::new(),
            owned: Vec::new(),
            hooks: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<ContextId> {
        self.parent
    }

    pub fn is_isolated(&self) -> bool {
        self.isolated
    }

    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn entry(&self, slot: SlotId) -> Option<&Entry> {
        self.entries.get(&slot)
    }

    pub fn children(&self) -> &[ContextId] {
        &self.children
    }

    pub fn has_hook(&self, hook: Hook) -> bool {
        self.hooks.iter().any(|(h, _)| *h == hook)
    }
}

// =============================================================================
// Bindings
// =============================================================================

/// How a slot is populated in a derived context.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// A literal, stored as a fresh entry of the new context.
    Value(Value),
    /// A cell passed through from another context: the observable behind it
    /// is shared, so writes on either side reach every holder.
    Shared { from: ContextId, slot: SlotId },
}

/// Own entries of a context being derived.
///
/// ```ignore
/// let bindings = Bindings::new()
///     .cell(&count, 0)
///     .share(&items, parent_ctx);
/// let ctx = rt.derive(parent_ctx, bindings)?;
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    pub(crate) entries: Vec<(SlotId, Option<Rc<str>>, Binding)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a literal to a slot.
    pub fn value(mut self, slot: &Slot, value: impl Into<Value>) -> Self {
        self.entries.push((slot.id, None, Binding::Value(value.into())));
        self
    }

    /// Bind a literal to a cell, registering the cell's name.
    pub fn cell(mut self, cell: &Cell, value: impl Into<Value>) -> Self {
        self.entries
            .push((cell.id(), cell.name.clone(), Binding::Value(value.into())));
        self
    }

    /// Bind a cell to its default value (or leave it unset without one).
    pub fn default_of(mut self, cell: &Cell) -> Self {
        if let Some(default) = cell.default.clone() {
            self.entries.push((cell.id(), cell.name.clone(), Binding::Value(default)));
        }
        self
    }

    /// Pass a cell through from `from`, sharing its observable.
    pub fn share(mut self, cell: &Cell, from: ContextId) -> Self {
        self.entries.push((
            cell.id(),
            cell.name.clone(),
            Binding::Shared {
                from,
                slot: cell.id(),
            },
        ));
        self
    }

    /// Pass `source` from `from` through under a different slot.
    pub fn share_as(mut self, target: &Slot, from: ContextId, source: SlotId) -> Self {
        self.entries
            .push((target.id, None, Binding::Shared { from, slot: source }));
        self
    }

    /// Bind a raw value under a reserved or computed id.
    pub fn raw(mut self, id: SlotId, value: impl Into<Value>) -> Self {
        self.entries.push((id, None, Binding::Value(value.into())));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
