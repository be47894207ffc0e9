//! Runtime - single owner of the engine state.

use std::rc::Rc;

use crate::cells::{Comparator, Deferred, Handler, SlotAllocator, SlotId, Subscriber, Subscription, SubscriptionId};
use crate::config::RuntimeConfig;
use crate::context::{Bindings, Hook, HookHandler, Store, Write};
use crate::effects::EffectState;
use crate::error::{Diagnostic, Diagnostics, Error, Result};
use crate::surface::Effector;
use crate::template::{TemplateInstance, TemplateRegistry};
use crate::types::{Flow, Key, Value};

use super::arena::Arena;
use super::{ContextId, EffectId, InstanceId, ObservableId};

/// The reactive engine.
///
/// Holds the context store, the live effects and template instances, the
/// output adapter and the template registry. Single threaded: handlers are
/// `Rc` closures, so a `Runtime` is neither `Send` nor `Sync`.
///
/// # Example
///
/// ```ignore
/// let dom = MemoryDom::new();
/// let mut rt = Runtime::new(dom.clone());
///
/// let count = rt.allocator().cell("count", 0);
/// let ctx = rt.root(Bindings::new().cell(&count, 0))?;
/// count.set(&mut rt, ctx, 5)?;
/// ```
pub struct Runtime {
    pub(crate) store: Store,
    pub(crate) effects: Arena<EffectId, EffectState>,
    pub(crate) instances: Arena<InstanceId, TemplateInstance>,
    pub(crate) effector: Box<dyn Effector>,
    pub(crate) templates: TemplateRegistry,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) depth: usize,
    allocator: SlotAllocator,
    config: RuntimeConfig,
    next_subscription: u64,
}

impl Runtime {
    pub fn new(effector: impl Effector + 'static) -> Self {
        Self::with_config(effector, RuntimeConfig::default())
    }

    pub fn with_config(effector: impl Effector + 'static, config: RuntimeConfig) -> Self {
        Self {
            store: Store::new(),
            effects: Arena::new(),
            instances: Arena::new(),
            effector: Box::new(effector),
            templates: TemplateRegistry::new(),
            diagnostics: Diagnostics::new(config.max_diagnostics),
            depth: 0,
            allocator: SlotAllocator::from_config(&config),
            config,
            next_subscription: 0,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Slot allocator shared with every compiler built from this runtime.
    pub fn allocator(&self) -> &SlotAllocator {
        &self.allocator
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn effector(&mut self) -> &mut dyn Effector {
        self.effector.as_mut()
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn templates_mut(&mut self) -> &mut TemplateRegistry {
        &mut self.templates
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.diagnostics.entries()
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.diagnostics.drain()
    }

    pub fn effect_count(&self) -> usize {
        self.effects.len()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    // =========================================================================
    // Contexts
    // =========================================================================

    pub fn root(&mut self, bindings: Bindings) -> Result<ContextId> {
        self.store.root(bindings)
    }

    pub fn derive(&mut self, parent: ContextId, bindings: Bindings) -> Result<ContextId> {
        self.store.derive(parent, bindings)
    }

    pub fn derive_isolated(&mut self, parent: ContextId, bindings: Bindings) -> Result<ContextId> {
        self.store.derive_isolated(parent, bindings)
    }

    /// Release a context and everything below it.
    pub fn release(&mut self, ctx: ContextId) {
        self.store.release(ctx);
    }

    pub fn parent(&self, ctx: ContextId) -> Option<ContextId> {
        self.store.parent(ctx)
    }

    /// Key of a mapped item context.
    pub fn key(&self, ctx: ContextId) -> Option<&Key> {
        self.store.key(ctx)
    }

    // =========================================================================
    // Values
    // =========================================================================

    /// Nearest value of `slot`. No side effects.
    pub fn get(&self, ctx: ContextId, slot: SlotId) -> Option<Value> {
        self.store.get(ctx, slot)
    }

    /// Value of a named cell, `None` when the name is unbound.
    pub fn lookup(&self, ctx: ContextId, name: &str) -> Option<Value> {
        let slot = self.store.lookup_name(ctx, name)?;
        self.store.get(ctx, slot)
    }

    /// Write a slot and publish the change.
    ///
    /// Writes through to the observable backing the slot if there is one,
    /// else writes the plain entry of `ctx`. With `force`, subscribers are
    /// notified even if the comparator sees no change.
    pub fn set(&mut self, ctx: ContextId, slot: SlotId, value: Value, force: bool) -> Result<Flow> {
        if self.depth_exceeded(ctx, slot) {
            return Ok(Flow::Stopped);
        }
        let write = self.store.write(ctx, slot, Some(value), force)?;
        self.publish_write(write)
    }

    /// `set` without force: a no-op when the value did not change.
    pub fn assign(&mut self, ctx: ContextId, slot: SlotId, value: Value) -> Result<Flow> {
        self.set(ctx, slot, value, false)
    }

    /// Remove a slot's value.
    pub fn clear(&mut self, ctx: ContextId, slot: SlotId) -> Result<Flow> {
        if self.depth_exceeded(ctx, slot) {
            return Ok(Flow::Stopped);
        }
        let write = self.store.write(ctx, slot, None, false)?;
        self.publish_write(write)
    }

    /// Write a slot owned by `ctx` itself (see [`Store::write_local`]).
    pub(crate) fn write_local(&mut self, ctx: ContextId, slot: SlotId, value: Option<Value>) -> Result<Flow> {
        if self.depth_exceeded(ctx, slot) {
            return Ok(Flow::Stopped);
        }
        let write = self.store.write_local(ctx, slot, value, false)?;
        self.publish_write(write)
    }

    fn publish_write(&mut self, write: Write) -> Result<Flow> {
        match write {
            Write::Raw | Write::Unchanged => Ok(Flow::Unchanged),
            Write::Changed { observable, previous } => self.publish(observable, previous),
            Write::Shadowed { context, observable } => self.rebind_shadowed(context, observable),
        }
    }

    /// Observable backing `slot` in `ctx`, created on first access.
    pub fn observable(&mut self, ctx: ContextId, slot: SlotId) -> Result<ObservableId> {
        self.store.observable(ctx, slot)
    }

    /// Revision of the observable backing `slot`, if one exists.
    pub fn revision(&self, ctx: ContextId, slot: SlotId) -> Option<i64> {
        let obs = self.store.existing_observable(ctx, slot)?;
        Some(self.store.observable_data(obs)?.revision())
    }

    pub fn set_comparator(&mut self, ctx: ContextId, slot: SlotId, comparator: Comparator) -> Result<()> {
        self.store.set_comparator(ctx, slot, comparator)
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Subscribe a handler to `slot` as seen from `ctx`.
    pub fn sub(&mut self, ctx: ContextId, slot: SlotId, handler: Handler) -> Result<Subscription> {
        self.subscribe(ctx, slot, Subscriber::Handler(handler))
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsub(&mut self, subscription: Subscription) -> bool {
        self.store
            .observable_data_mut(subscription.observable)
            .is_some_and(|obs| obs.unsubscribe(subscription.id))
    }

    pub(crate) fn subscribe(&mut self, ctx: ContextId, slot: SlotId, subscriber: Subscriber) -> Result<Subscription> {
        let observable = self.store.observable(ctx, slot)?;
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.store
            .observable_data_mut(observable)
            .ok_or(Error::StaleObservable(observable))?
            .subscribe(id, subscriber);
        Ok(Subscription { observable, id })
    }

    // =========================================================================
    // Deferred values
    // =========================================================================

    /// Capture the current revision of `slot` for a value that arrives later.
    pub fn defer(&mut self, ctx: ContextId, slot: SlotId) -> Result<Deferred> {
        let observable = self.store.observable(ctx, slot)?;
        let data = self
            .store
            .observable_data(observable)
            .ok_or(Error::StaleObservable(observable))?;
        Ok(data.defer(observable))
    }

    /// Apply a deferred value, unless the slot was written in the meantime.
    pub fn resolve(&mut self, deferred: Deferred, value: Value) -> Result<Flow> {
        let revision = self
            .store
            .observable_data(deferred.observable)
            .ok_or(Error::StaleObservable(deferred.observable))?
            .revision();
        if revision != deferred.revision {
            tracing::warn!(
                observable = %deferred.observable,
                expected = deferred.revision,
                actual = revision,
                "dropping stale deferred value"
            );
            return Ok(Flow::Unchanged);
        }
        if let Some(data) = self.store.observable_data(deferred.observable) {
            let (owner, slot) = (data.owner(), data.slot());
            if self.depth_exceeded(owner, slot) {
                return Ok(Flow::Stopped);
            }
        }
        let write = self.store.write_observable(deferred.observable, Some(value), true)?;
        self.publish_write(write)
    }

    // =========================================================================
    // Errors and hooks
    // =========================================================================

    /// Report a configuration or content problem. Never aborts.
    pub fn on_error(&mut self, origin: &'static str, message: impl Into<String>, context: impl Into<String>) {
        self.diagnostics.report(origin, message, context);
    }

    /// Register a lifecycle hook on `ctx`.
    pub fn on_hook(&mut self, ctx: ContextId, hook: Hook, handler: HookHandler) -> Result<()> {
        let data = self.store.context_mut(ctx).ok_or(Error::StaleContext(ctx))?;
        data.hooks.push((hook, handler));
        Ok(())
    }

    /// Fire `hook` on the nearest context (starting at `ctx`) listening to it.
    pub(crate) fn trigger_hook(&mut self, ctx: ContextId, hook: Hook) {
        let mut current = Some(ctx);
        let handlers: Vec<HookHandler> = loop {
            let Some(id) = current else {
                return;
            };
            let Some(data) = self.store.context(id) else {
                return;
            };
            if data.has_hook(hook) {
                break data
                    .hooks
                    .iter()
                    .filter(|(h, _)| *h == hook)
                    .map(|(_, handler)| Rc::clone(handler))
                    .collect();
            }
            current = data.parent();
        };
        for handler in handlers {
            if let Err(err) = handler(self, ctx) {
                self.on_error("Hook", format!("{hook:?} handler failed: {err}"), ctx.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::MemoryDom;
    use std::cell::RefCell;

    fn runtime() -> Runtime {
        Runtime::new(MemoryDom::new())
    }

    #[test]
    fn test_set_and_get() {
        let mut rt = runtime();
        let count = rt.allocator().cell("count", 0);
        let ctx = rt.root(Bindings::new().cell(&count, 0)).unwrap();

        assert_eq!(rt.get(ctx, count.id()), Some(Value::from(0)));
        rt.set(ctx, count.id(), Value::from(3), true).unwrap();
        assert_eq!(rt.get(ctx, count.id()), Some(Value::from(3)));
        assert_eq!(rt.lookup(ctx, "count"), Some(Value::from(3)));
        assert_eq!(rt.lookup(ctx, "missing"), None);
    }

    #[test]
    fn test_revision_is_monotonic() {
        let mut rt = runtime();
        let count = rt.allocator().cell("count", 0);
        let ctx = rt.root(Bindings::new().cell(&count, 0)).unwrap();
        rt.observable(ctx, count.id()).unwrap();

        assert_eq!(rt.revision(ctx, count.id()), Some(0));
        rt.set(ctx, count.id(), Value::from(1), true).unwrap();
        assert_eq!(rt.revision(ctx, count.id()), Some(1));
        rt.assign(ctx, count.id(), Value::from(1)).unwrap();
        assert_eq!(rt.revision(ctx, count.id()), Some(1));
        rt.set(ctx, count.id(), Value::from(1), true).unwrap();
        assert_eq!(rt.revision(ctx, count.id()), Some(2));
    }

    #[test]
    fn test_stale_deferred_value_is_dropped() {
        let mut rt = runtime();
        let name = rt.allocator().cell("name", "");
        let ctx = rt.root(Bindings::new().cell(&name, "a")).unwrap();

        let pending = rt.defer(ctx, name.id()).unwrap();
        rt.set(ctx, name.id(), Value::from("b"), true).unwrap();

        assert_eq!(rt.resolve(pending, Value::from("late")).unwrap(), Flow::Unchanged);
        assert_eq!(rt.get(ctx, name.id()), Some(Value::from("b")));
    }

    #[test]
    fn test_fresh_deferred_value_applies() {
        let mut rt = runtime();
        let name = rt.allocator().cell("name", "");
        let ctx = rt.root(Bindings::new().cell(&name, "a")).unwrap();

        let pending = rt.defer(ctx, name.id()).unwrap();
        assert_eq!(rt.resolve(pending, Value::from("loaded")).unwrap(), Flow::Propagated);
        assert_eq!(rt.get(ctx, name.id()), Some(Value::from("loaded")));
    }

    #[test]
    fn test_hooks_fire_on_nearest_listener() {
        let mut rt = runtime();
        let root = rt.root(Bindings::new()).unwrap();
        let child = rt.derive(root, Bindings::new()).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        rt.on_hook(
            root,
            Hook::Mount,
            Rc::new(move |_, ctx| {
                log.borrow_mut().push(ctx);
                Ok(())
            }),
        )
        .unwrap();

        rt.trigger_hook(child, Hook::Mount);
        rt.trigger_hook(child, Hook::Unmount);
        assert_eq!(*seen.borrow(), vec![child]);
    }

    #[test]
    fn test_failing_hook_is_recorded() {
        let mut rt = runtime();
        let root = rt.root(Bindings::new()).unwrap();
        rt.on_hook(root, Hook::Unmount, Rc::new(|_, _| Err(Error::Handler("boom".into()))))
            .unwrap();

        rt.trigger_hook(root, Hook::Unmount);
        assert_eq!(rt.diagnostics().len(), 1);
        assert_eq!(rt.diagnostics()[0].origin, "Hook");
    }
}
