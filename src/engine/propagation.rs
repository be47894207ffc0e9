//! Propagation - synchronous, depth-first publish of observable changes.
//!
//! A changed observable notifies its subscribers in registration order
//! before `set` returns. A subscriber that writes another cell publishes
//! that change right away, on the same call stack. There is no batching:
//! an effect reachable through two paths runs twice.
//!
//! The subscriber list is copied before notifying, so subscribing or
//! unsubscribing from inside a handler never corrupts the iteration.
//! Subscriptions removed mid-publish are skipped.

use crate::cells::{Notification, SlotId, Subscriber, SubscriptionId};
use crate::error::{Error, Result};
use crate::types::{Flow, Propagation, Value};

use super::{ContextId, ObservableId, Runtime};

impl Runtime {
    /// Notify every subscriber of `observable` about its current value.
    pub(crate) fn publish(&mut self, observable: ObservableId, previous: Option<Value>) -> Result<Flow> {
        let data = self
            .store
            .observable_data(observable)
            .ok_or(Error::StaleObservable(observable))?;
        let note = Notification {
            observable,
            context: data.owner(),
            slot: data.slot(),
            value: data.value().cloned(),
            previous,
            revision: data.revision(),
        };
        let subscribers = data.snapshot();

        tracing::trace!(
            observable = %observable,
            slot = %note.slot,
            revision = note.revision,
            subscribers = subscribers.len(),
            "publish"
        );

        self.depth += 1;
        let flow = self.notify(&note, subscribers);
        self.depth -= 1;
        Ok(flow)
    }

    /// Whether a write issued now would nest past `max_propagation_depth`.
    /// Checked before the value is stored, so every stored value has been
    /// published.
    pub(crate) fn depth_exceeded(&mut self, ctx: ContextId, slot: SlotId) -> bool {
        let limit = self.config().max_propagation_depth;
        if self.depth < limit {
            return false;
        }
        self.on_error(
            "Observable",
            Error::PropagationDepth(limit).to_string(),
            format!("{slot} in {ctx}"),
        );
        true
    }

    fn notify(&mut self, note: &Notification, subscribers: Vec<(SubscriptionId, Subscriber)>) -> Flow {
        for (id, subscriber) in subscribers {
            let live = self
                .store
                .observable_data(note.observable)
                .is_some_and(|obs| obs.is_subscribed(id));
            if !live {
                continue;
            }
            if self.config().trace_propagation {
                tracing::trace!(subscription = id.0, subscriber = ?subscriber, "notify");
            }
            match subscriber {
                Subscriber::Effect(effect) => {
                    if let Err(err) = self.refresh_effect(effect) {
                        self.on_error("Effect", format!("update failed: {err}"), effect.to_string());
                    }
                }
                Subscriber::Handler(handler) => match handler(self, note) {
                    Ok(Propagation::Continue) => {}
                    Ok(Propagation::Stop) => return Flow::Stopped,
                    Err(err) => {
                        self.on_error(
                            "Observable",
                            format!("subscriber failed: {err}"),
                            format!("{} in {}", note.slot, note.context),
                        );
                    }
                },
            }
        }
        Flow::Propagated
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::cells::Handler;
    use crate::config::RuntimeConfig;
    use crate::context::Bindings;
    use crate::engine::Runtime;
    use crate::error::Error;
    use crate::surface::MemoryDom;
    use crate::types::{Flow, Propagation, Value};

    fn recorder(log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str) -> Handler {
        let log = Rc::clone(log);
        Rc::new(move |_, _| {
            log.borrow_mut().push(tag);
            Ok(Propagation::Continue)
        })
    }

    #[test]
    fn test_subscribers_fire_in_registration_order() {
        let mut rt = Runtime::new(MemoryDom::new());
        let a = rt.allocator().cell("a", 0);
        let ctx = rt.root(Bindings::new().cell(&a, 0)).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));

        rt.sub(ctx, a.id(), recorder(&log, "first")).unwrap();
        rt.sub(ctx, a.id(), recorder(&log, "second")).unwrap();
        rt.sub(ctx, a.id(), recorder(&log, "third")).unwrap();

        assert_eq!(a.set(&mut rt, ctx, 1).unwrap(), Flow::Propagated);
        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_stop_skips_remaining_subscribers() {
        let mut rt = Runtime::new(MemoryDom::new());
        let a = rt.allocator().cell("a", 0);
        let ctx = rt.root(Bindings::new().cell(&a, 0)).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));

        rt.sub(ctx, a.id(), recorder(&log, "first")).unwrap();
        rt.sub(ctx, a.id(), Rc::new(|_, _| Ok(Propagation::Stop))).unwrap();
        rt.sub(ctx, a.id(), recorder(&log, "third")).unwrap();

        assert_eq!(a.set(&mut rt, ctx, 1).unwrap(), Flow::Stopped);
        assert_eq!(*log.borrow(), vec!["first"]);
    }

    #[test]
    fn test_failing_subscriber_does_not_stop_others() {
        let mut rt = Runtime::new(MemoryDom::new());
        let a = rt.allocator().cell("a", 0);
        let ctx = rt.root(Bindings::new().cell(&a, 0)).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));

        rt.sub(ctx, a.id(), Rc::new(|_, _| Err(Error::Handler("boom".into()))))
            .unwrap();
        rt.sub(ctx, a.id(), recorder(&log, "after")).unwrap();

        assert_eq!(a.set(&mut rt, ctx, 1).unwrap(), Flow::Propagated);
        assert_eq!(*log.borrow(), vec!["after"]);
        assert_eq!(rt.diagnostics().len(), 1);
    }

    #[test]
    fn test_unchanged_assign_notifies_nobody() {
        let mut rt = Runtime::new(MemoryDom::new());
        let a = rt.allocator().cell("a", 0);
        let ctx = rt.root(Bindings::new().cell(&a, 1)).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));
        rt.sub(ctx, a.id(), recorder(&log, "hit")).unwrap();

        assert_eq!(rt.assign(ctx, a.id(), Value::from(1)).unwrap(), Flow::Unchanged);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_unsubscribed_mid_publish_is_skipped() {
        let mut rt = Runtime::new(MemoryDom::new());
        let a = rt.allocator().cell("a", 0);
        let ctx = rt.root(Bindings::new().cell(&a, 0)).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));

        let victim = Rc::new(RefCell::new(None));
        let target = Rc::clone(&victim);
        rt.sub(
            ctx,
            a.id(),
            Rc::new(move |rt, _| {
                if let Some(sub) = target.borrow_mut().take() {
                    rt.unsub(sub);
                }
                Ok(Propagation::Continue)
            }),
        )
        .unwrap();
        let second = rt.sub(ctx, a.id(), recorder(&log, "second")).unwrap();
        *victim.borrow_mut() = Some(second);

        a.set(&mut rt, ctx, 1).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_reentrant_set_propagates_depth_first() {
        let mut rt = Runtime::new(MemoryDom::new());
        let a = rt.allocator().cell("a", 0);
        let b = rt.allocator().cell("b", 0);
        let ctx = rt.root(Bindings::new().cell(&a, 0).cell(&b, 0)).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));

        let b_id = b.id();
        let inner = Rc::clone(&log);
        rt.sub(
            ctx,
            a.id(),
            Rc::new(move |rt, note| {
                inner.borrow_mut().push("a");
                let doubled = note.value.as_ref().and_then(Value::as_int).unwrap_or(0) * 2;
                rt.set(note.context, b_id, Value::from(doubled), true)?;
                inner.borrow_mut().push("a done");
                Ok(Propagation::Continue)
            }),
        )
        .unwrap();
        rt.sub(ctx, b.id(), recorder(&log, "b")).unwrap();

        a.set(&mut rt, ctx, 4).unwrap();
        assert_eq!(*log.borrow(), vec!["a", "b", "a done"]);
        assert_eq!(rt.get(ctx, b.id()), Some(Value::from(8)));
    }

    #[test]
    fn test_runaway_propagation_is_cut() {
        let config = RuntimeConfig::default().with_max_propagation_depth(8);
        let mut rt = Runtime::with_config(MemoryDom::new(), config);
        let a = rt.allocator().cell("a", 0);
        let ctx = rt.root(Bindings::new().cell(&a, 0)).unwrap();

        let a_id = a.id();
        rt.sub(
            ctx,
            a.id(),
            Rc::new(move |rt, note| {
                let next = note.value.as_ref().and_then(Value::as_int).unwrap_or(0) + 1;
                rt.set(note.context, a_id, Value::from(next), true)?;
                Ok(Propagation::Continue)
            }),
        )
        .unwrap();

        a.set(&mut rt, ctx, 1).unwrap();
        assert_eq!(rt.get(ctx, a.id()), Some(Value::from(8)));
        assert_eq!(rt.diagnostics().len(), 1);
        assert!(rt.diagnostics()[0].message.contains("maximum depth"));
    }
}
