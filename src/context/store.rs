//! Store - the context arena and the observables its contexts own.
//!
//! All lookups are explicit walks up the parent chain. Nothing here knows
//! about subscribers being called: a write that changes an observable is
//! reported back as [`Write::Changed`] and the runtime publishes it.

use std::rc::Rc;

use crate::cells::{Comparator, Observable, SlotId};
use crate::engine::arena::Arena;
use crate::engine::{ContextId, ObservableId};
use crate::error::{Error, Result};
use crate::types::{Key, Value};

use super::scope::{Binding, Bindings, ContextData, Entry};

/// Outcome of writing a slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// A plain entry was written, nobody watches it.
    Raw,
    /// The observable saw no change.
    Unchanged,
    /// The observable changed and must be published.
    Changed {
        observable: ObservableId,
        previous: Option<Value>,
    },
    /// A new own entry of `context` now hides `observable`, held by an
    /// ancestor. Effects under `context` watching it must be rebound.
    Shadowed {
        context: ContextId,
        observable: ObservableId,
    },
}

#[derive(Default)]
pub struct Store {
    contexts: Arena<ContextId, ContextData>,
    observables: Arena<ObservableId, Observable>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Context lifecycle
    // =========================================================================

    /// Create a context with no parent.
    pub fn root(&mut self, bindings: Bindings) -> Result<ContextId> {
        let ctx = self.contexts.insert(ContextData::new(None, false));
        self.bind(ctx, bindings)?;
        tracing::debug!(context = %ctx, "created root context");
        Ok(ctx)
    }

    /// Create a child context sharing the parent's lookup chain.
    pub fn derive(&mut self, parent: ContextId, bindings: Bindings) -> Result<ContextId> {
        self.create_child(parent, false, bindings)
    }

    /// Create a component boundary: lookups stop at this context, only its
    /// own entries (including explicitly shared cells) are visible.
    pub fn derive_isolated(&mut self, parent: ContextId, bindings: Bindings) -> Result<ContextId> {
        self.create_child(parent, true, bindings)
    }

    fn create_child(&mut self, parent: ContextId, isolated: bool, bindings: Bindings) -> Result<ContextId> {
        if !self.contexts.contains(parent) {
            return Err(Error::StaleContext(parent));
        }
        let ctx = self.contexts.insert(ContextData::new(Some(parent), isolated));
        if let Some(data) = self.contexts.get_mut(parent) {
            data.children.push(ctx);
        }
        self.bind(ctx, bindings)?;
        tracing::debug!(context = %ctx, parent = %parent, isolated, "derived context");
        Ok(ctx)
    }

    fn bind(&mut self, ctx: ContextId, bindings: Bindings) -> Result<()> {
        for (slot, name, binding) in bindings.entries {
            let entry = match binding {
                Binding::Value(value) => Entry::Value(value),
                Binding::Shared { from, slot: source } => Entry::Observed(self.observable(from, source)?),
            };
            let data = self.contexts.get_mut(ctx).ok_or(Error::StaleContext(ctx))?;
            data.entries.insert(slot, entry);
            if let Some(name) = name {
                data.names.insert(name, slot);
            }
        }
        Ok(())
    }

    /// Release a context, its descendants and the observables it owns.
    ///
    /// The parent only loses the child from its bookkeeping; its entries are
    /// left untouched.
    pub fn release(&mut self, ctx: ContextId) {
        let Some(data) = self.contexts.remove(ctx) else {
            return;
        };
        for child in data.children {
            self.release(child);
        }
        for observable in data.owned {
            self.observables.remove(observable);
        }
        if let Some(parent) = data.parent.and_then(|p| self.contexts.get_mut(p)) {
            parent.children.retain(|c| *c != ctx);
        }
        tracing::debug!(context = %ctx, "released context");
    }

    pub fn contains(&self, ctx: ContextId) -> bool {
        self.contexts.contains(ctx)
    }

    pub fn context(&self, ctx: ContextId) -> Option<&ContextData> {
        self.contexts.get(ctx)
    }

    pub(crate) fn context_mut(&mut self, ctx: ContextId) -> Option<&mut ContextData> {
        self.contexts.get_mut(ctx)
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    pub fn observable_count(&self) -> usize {
        self.observables.len()
    }

    pub fn parent(&self, ctx: ContextId) -> Option<ContextId> {
        self.contexts.get(ctx).and_then(|d| d.parent)
    }

    /// Whether `ctx` is `ancestor` or one of its descendants.
    pub fn is_within(&self, ctx: ContextId, ancestor: ContextId) -> bool {
        let mut current = Some(ctx);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Find the context holding `slot`, walking up until a hit or a boundary.
    pub fn holder(&self, ctx: ContextId, slot: SlotId) -> Option<(ContextId, &Entry)> {
        let mut current = Some(ctx);
        while let Some(id) = current {
            let data = self.contexts.get(id)?;
            if let Some(entry) = data.entries.get(&slot) {
                return Some((id, entry));
            }
            if data.isolated {
                return None;
            }
            current = data.parent;
        }
        None
    }

    /// Nearest value of `slot`: the observable's value if there is one,
    /// else the plain entry, else `None`.
    pub fn get(&self, ctx: ContextId, slot: SlotId) -> Option<Value> {
        match self.holder(ctx, slot)? {
            (_, Entry::Value(value)) => Some(value.clone()),
            (_, Entry::Observed(obs)) => self.observables.get(*obs)?.value().cloned(),
            (_, Entry::Context(_)) => None,
        }
    }

    /// Own entry of `ctx` only, no fallthrough.
    pub fn own(&self, ctx: ContextId, slot: SlotId) -> Option<&Entry> {
        self.contexts.get(ctx)?.entries.get(&slot)
    }

    /// Resolve a cell name, stopping at boundaries. Unknown names are `None`.
    pub fn lookup_name(&self, ctx: ContextId, name: &str) -> Option<SlotId> {
        let mut current = Some(ctx);
        while let Some(id) = current {
            let data = self.contexts.get(id)?;
            if let Some(slot) = data.names.get(name) {
                return Some(*slot);
            }
            if data.isolated {
                return None;
            }
            current = data.parent;
        }
        None
    }

    pub fn set_name(&mut self, ctx: ContextId, name: &str, slot: SlotId) -> Result<()> {
        let data = self.contexts.get_mut(ctx).ok_or(Error::StaleContext(ctx))?;
        data.names.insert(Rc::from(name), slot);
        Ok(())
    }

    pub fn key(&self, ctx: ContextId) -> Option<&Key> {
        self.contexts.get(ctx)?.key.as_ref()
    }

    pub fn set_key(&mut self, ctx: ContextId, key: Key) -> Result<()> {
        let data = self.contexts.get_mut(ctx).ok_or(Error::StaleContext(ctx))?;
        data.key = Some(key);
        Ok(())
    }

    /// Cached child context stored under `slot` in `ctx` (own entries only).
    pub fn cached_context(&self, ctx: ContextId, slot: SlotId) -> Option<ContextId> {
        match self.own(ctx, slot)? {
            Entry::Context(child) if self.contexts.contains(*child) => Some(*child),
            _ => None,
        }
    }

    pub fn cache_context(&mut self, ctx: ContextId, slot: SlotId, child: ContextId) -> Result<()> {
        let data = self.contexts.get_mut(ctx).ok_or(Error::StaleContext(ctx))?;
        data.entries.insert(slot, Entry::Context(child));
        Ok(())
    }

    // =========================================================================
    // Observables
    // =========================================================================

    /// Observable backing `slot` as seen from `ctx`, created lazily.
    ///
    /// A plain entry found up the chain is promoted in place, in the context
    /// that holds it, so every context reading through it watches the same
    /// observable. A slot bound nowhere gets an empty observable in `ctx`.
    pub fn observable(&mut self, ctx: ContextId, slot: SlotId) -> Result<ObservableId> {
        if !self.contexts.contains(ctx) {
            return Err(Error::StaleContext(ctx));
        }
        let (owner, initial) = match self.holder(ctx, slot) {
            Some((_, Entry::Observed(obs))) if self.observables.contains(*obs) => return Ok(*obs),
            Some((holder, Entry::Value(value))) => (holder, Some(value.clone())),
            _ => (self.outermost(ctx), None),
        };
        let obs = self.observables.insert(Observable::new(owner, slot, initial));
        let data = self.contexts.get_mut(owner).ok_or(Error::StaleContext(owner))?;
        data.entries.insert(slot, Entry::Observed(obs));
        data.owned.push(obs);
        Ok(obs)
    }

    /// Farthest context reachable from `ctx` before a boundary. Unbound
    /// placeholders live there so a later write anywhere on the chain finds
    /// them.
    fn outermost(&self, ctx: ContextId) -> ContextId {
        let mut current = ctx;
        while let Some(data) = self.contexts.get(current) {
            match data.parent {
                Some(parent) if !data.isolated => current = parent,
                _ => break,
            }
        }
        current
    }

    /// Observable backing `slot`, if one already exists. Never creates.
    pub fn existing_observable(&self, ctx: ContextId, slot: SlotId) -> Option<ObservableId> {
        match self.holder(ctx, slot)? {
            (_, Entry::Observed(obs)) if self.observables.contains(*obs) => Some(*obs),
            _ => None,
        }
    }

    pub fn observable_data(&self, obs: ObservableId) -> Option<&Observable> {
        self.observables.get(obs)
    }

    pub(crate) fn observable_data_mut(&mut self, obs: ObservableId) -> Option<&mut Observable> {
        self.observables.get_mut(obs)
    }

    pub fn set_comparator(&mut self, ctx: ContextId, slot: SlotId, comparator: Comparator) -> Result<()> {
        let obs = self.observable(ctx, slot)?;
        if let Some(data) = self.observables.get_mut(obs) {
            data.set_comparator(comparator);
        }
        Ok(())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write `slot` as seen from `ctx`.
    ///
    /// An observable anywhere up the chain receives the write (so every
    /// holder of a shared cell stays consistent). Otherwise the plain entry
    /// of `ctx` itself is written, shadowing whatever a parent holds.
    /// `None` clears the slot.
    pub fn write(&mut self, ctx: ContextId, slot: SlotId, value: Option<Value>, force: bool) -> Result<Write> {
        if !self.contexts.contains(ctx) {
            return Err(Error::StaleContext(ctx));
        }
        if let Some(obs) = self.existing_observable(ctx, slot) {
            let data = self.observables.get_mut(obs).ok_or(Error::StaleObservable(obs))?;
            return Ok(match data.store(value, force) {
                Some(previous) => Write::Changed {
                    observable: obs,
                    previous,
                },
                None => Write::Unchanged,
            });
        }
        let data = self.contexts.get_mut(ctx).ok_or(Error::StaleContext(ctx))?;
        match value {
            Some(value) => {
                data.entries.insert(slot, Entry::Value(value));
            }
            None => {
                data.entries.remove(&slot);
            }
        }
        Ok(Write::Raw)
    }

    /// Write `slot` in `ctx` itself, never in an ancestor.
    ///
    /// Derivations use this to fill the context they own: an ancestor that
    /// happens to hold the same slot keeps its value. A first own value that
    /// hides an ancestor's observable is reported as [`Write::Shadowed`].
    pub fn write_local(&mut self, ctx: ContextId, slot: SlotId, value: Option<Value>, force: bool) -> Result<Write> {
        let hidden = match self.own(ctx, slot) {
            Some(Entry::Observed(obs)) if self.observables.contains(*obs) => {
                let obs = *obs;
                return self.write_observable(obs, value, force);
            }
            None if value.is_some() => self.inherited_observable(ctx, slot),
            _ => None,
        };
        let data = self.contexts.get_mut(ctx).ok_or(Error::StaleContext(ctx))?;
        match value {
            Some(value) => {
                data.entries.insert(slot, Entry::Value(value));
            }
            None => {
                data.entries.remove(&slot);
            }
        }
        Ok(match hidden {
            Some(observable) => Write::Shadowed { context: ctx, observable },
            None => Write::Raw,
        })
    }

    /// Observable an ancestor exposes to `ctx` for `slot`.
    fn inherited_observable(&self, ctx: ContextId, slot: SlotId) -> Option<ObservableId> {
        let data = self.contexts.get(ctx)?;
        if data.isolated {
            return None;
        }
        self.existing_observable(data.parent?, slot)
    }

    /// Write directly to an observable.
    pub fn write_observable(&mut self, obs: ObservableId, value: Option<Value>, force: bool) -> Result<Write> {
        let data = self.observables.get_mut(obs).ok_or(Error::StaleObservable(obs))?;
        Ok(match data.store(value, force) {
            Some(previous) => Write::Changed {
                observable: obs,
                previous,
            },
            None => Write::Unchanged,
        })
    }

    /// Own entries of `ctx` resolved to values, sorted by slot id.
    ///
    /// Cached child contexts are skipped. Useful to compare two states of a
    /// context.
    pub fn snapshot(&self, ctx: ContextId) -> Vec<(SlotId, Option<Value>)> {
        let Some(data) = self.contexts.get(ctx) else {
            return Vec::new();
        };
        let mut entries: Vec<(SlotId, Option<Value>)> = data
            .entries
            .iter()
            .filter_map(|(slot, entry)| match entry {
                Entry::Value(v) => Some((*slot, Some(v.clone()))),
                Entry::Observed(obs) => Some((*slot, self.observables.get(*obs).and_then(|o| o.value().cloned()))),
                Entry::Context(_) => None,
            })
            .collect();
        entries.sort_by_key(|(slot, _)| *slot);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::SlotAllocator;

    #[test]
    fn test_child_shadows_parent() {
        let alloc = SlotAllocator::default();
        let a = alloc.cell("a", 0);
        let mut store = Store::new();

        let root = store.root(Bindings::new().cell(&a, 1)).unwrap();
        let child = store.derive(root, Bindings::new().cell(&a, 2)).unwrap();

        assert_eq!(store.get(root, a.id()), Some(Value::from(1)));
        assert_eq!(store.get(child, a.id()), Some(Value::from(2)));
    }

    #[test]
    fn test_lookup_falls_through_to_parent() {
        let alloc = SlotAllocator::default();
        let a = alloc.cell("a", 0);
        let mut store = Store::new();

        let root = store.root(Bindings::new().cell(&a, 1)).unwrap();
        let child = store.derive(root, Bindings::new()).unwrap();

        assert_eq!(store.get(child, a.id()), Some(Value::from(1)));
        assert_eq!(store.lookup_name(child, "a"), Some(a.id()));
    }

    #[test]
    fn test_isolated_boundary_stops_lookup() {
        let alloc = SlotAllocator::default();
        let a = alloc.cell("a", 0);
        let b = alloc.cell("b", 0);
        let mut store = Store::new();

        let root = store.root(Bindings::new().cell(&a, 1).cell(&b, 2)).unwrap();
        let component = store
            .derive_isolated(root, Bindings::new().share(&b, root))
            .unwrap();

        assert_eq!(store.get(component, a.id()), None);
        assert_eq!(store.lookup_name(component, "a"), None);
        assert_eq!(store.get(component, b.id()), Some(Value::from(2)));
        assert_eq!(store.lookup_name(component, "b"), Some(b.id()));
    }

    #[test]
    fn test_shared_cell_writes_reach_every_holder() {
        let alloc = SlotAllocator::default();
        let b = alloc.cell("b", 0);
        let mut store = Store::new();

        let root = store.root(Bindings::new().cell(&b, 2)).unwrap();
        let component = store
            .derive_isolated(root, Bindings::new().share(&b, root))
            .unwrap();

        let write = store.write(component, b.id(), Some(Value::from(3)), true).unwrap();
        assert!(matches!(write, Write::Changed { .. }));
        assert_eq!(store.get(root, b.id()), Some(Value::from(3)));
    }

    #[test]
    fn test_release_child_keeps_parent_entries() {
        let alloc = SlotAllocator::default();
        let a = alloc.cell("a", 0);
        let mut store = Store::new();

        let root = store.root(Bindings::new().cell(&a, 1)).unwrap();
        let child = store.derive(root, Bindings::new()).unwrap();
        store.observable(child, a.id()).unwrap();
        let before = store.snapshot(root);

        store.release(child);

        assert!(!store.contains(child));
        assert_eq!(store.snapshot(root), before);
        assert_eq!(store.get(root, a.id()), Some(Value::from(1)));
        assert!(store.context(root).unwrap().children().is_empty());
    }

    #[test]
    fn test_release_frees_descendants_and_observables() {
        let alloc = SlotAllocator::default();
        let a = alloc.cell("a", 0);
        let mut store = Store::new();

        let root = store.root(Bindings::new()).unwrap();
        let child = store.derive(root, Bindings::new().cell(&a, 1)).unwrap();
        let grandchild = store.derive(child, Bindings::new()).unwrap();
        store.observable(grandchild, a.id()).unwrap();
        assert_eq!(store.observable_count(), 1);

        store.release(child);
        assert!(!store.contains(grandchild));
        assert_eq!(store.observable_count(), 0);
        assert_eq!(store.context_count(), 1);
    }

    #[test]
    fn test_observable_promotes_plain_entry_in_holder() {
        let alloc = SlotAllocator::default();
        let a = alloc.cell("a", 0);
        let mut store = Store::new();

        let root = store.root(Bindings::new().cell(&a, 5)).unwrap();
        let child = store.derive(root, Bindings::new()).unwrap();

        let obs = store.observable(child, a.id()).unwrap();
        assert_eq!(store.observable_data(obs).unwrap().owner(), root);
        assert_eq!(store.observable_data(obs).unwrap().revision(), 0);
        assert_eq!(store.observable(root, a.id()).unwrap(), obs);
    }

    #[test]
    fn test_unbound_placeholder_lives_at_the_outermost_context() {
        let alloc = SlotAllocator::default();
        let a = alloc.cell("a", 0);
        let mut store = Store::new();

        let root = store.root(Bindings::new()).unwrap();
        let child = store.derive(root, Bindings::new()).unwrap();
        let component = store.derive_isolated(child, Bindings::new()).unwrap();
        let inner = store.derive(component, Bindings::new()).unwrap();

        let obs = store.observable(child, a.id()).unwrap();
        assert_eq!(store.observable_data(obs).unwrap().owner(), root);
        let write = store.write(root, a.id(), Some(Value::from(4)), false).unwrap();
        assert!(matches!(write, Write::Changed { observable, .. } if observable == obs));
        assert_eq!(store.get(child, a.id()), Some(Value::from(4)));

        let boxed = store.observable(inner, a.id()).unwrap();
        assert_eq!(store.observable_data(boxed).unwrap().owner(), component);
    }

    #[test]
    fn test_plain_write_shadows_in_active_context() {
        let alloc = SlotAllocator::default();
        let a = alloc.cell("a", 0);
        let mut store = Store::new();

        let root = store.root(Bindings::new().cell(&a, 1)).unwrap();
        let child = store.derive(root, Bindings::new()).unwrap();

        assert_eq!(store.write(child, a.id(), Some(Value::from(2)), true).unwrap(), Write::Raw);
        assert_eq!(store.get(child, a.id()), Some(Value::from(2)));
        assert_eq!(store.get(root, a.id()), Some(Value::from(1)));
    }

    #[test]
    fn test_local_write_never_reaches_ancestors() {
        let alloc = SlotAllocator::default();
        let a = alloc.cell("a", 0);
        let mut store = Store::new();

        let root = store.root(Bindings::new().cell(&a, 1)).unwrap();
        let obs = store.observable(root, a.id()).unwrap();
        let child = store.derive(root, Bindings::new()).unwrap();

        assert_eq!(
            store.write_local(child, a.id(), Some(Value::from(7)), false).unwrap(),
            Write::Shadowed {
                context: child,
                observable: obs
            }
        );
        assert_eq!(
            store.write_local(child, a.id(), Some(Value::from(8)), false).unwrap(),
            Write::Raw
        );
        assert_eq!(store.get(child, a.id()), Some(Value::from(8)));
        assert_eq!(store.get(root, a.id()), Some(Value::from(1)));

        store.write_local(child, a.id(), None, false).unwrap();
        assert_eq!(store.get(child, a.id()), Some(Value::from(1)));
    }

    #[test]
    fn test_stale_context_is_an_error() {
        let mut store = Store::new();
        let root = store.root(Bindings::new()).unwrap();
        store.release(root);
        assert_eq!(store.derive(root, Bindings::new()), Err(Error::StaleContext(root)));
    }
}
