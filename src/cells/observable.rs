//! Observable - a revisioned, subscribable value holder.
//!
//! An observable backs one slot inside one context. It is created lazily the
//! first time something needs to watch that slot, and it lives as long as the
//! context that owns it.
//!
//! # Invariants
//!
//! 1. `revision` starts at -1 ("never set") and increases by exactly one per
//!    published change.
//! 2. A non-forced store of a value the comparator considers unchanged is a
//!    no-op: no revision bump, no notification.
//! 3. Subscribers are notified in registration order.
//!
//! Publishing itself is driven by the runtime (see `engine::propagation`),
//! because subscribers need `&mut Runtime` to react.

use std::rc::Rc;

use crate::cells::SlotId;
use crate::engine::{ContextId, EffectId, ObservableId, Runtime};
use crate::error::Result;
use crate::types::{Propagation, Value};

// =============================================================================
// Callback types
// =============================================================================

/// Equality used to decide whether a store is a change. Returns true when
/// both values are considered the same.
pub type Comparator = fn(Option<&Value>, Option<&Value>) -> bool;

/// User subscriber callback.
///
/// Returning [`Propagation::Stop`] skips the remaining subscribers of the
/// current publish. Returning an error logs it and moves on to the next
/// subscriber.
pub type Handler = Rc<dyn Fn(&mut Runtime, &Notification) -> Result<Propagation>>;

/// Identity of one subscription on one observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Who gets notified.
#[derive(Clone)]
pub enum Subscriber {
    /// A live effect, re-evaluated through its selection.
    Effect(EffectId),
    /// An arbitrary callback.
    Handler(Handler),
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subscriber::Effect(id) => write!(f, "Effect({id:?})"),
            Subscriber::Handler(_) => f.write_str("Handler"),
        }
    }
}

/// Token returned by `sub`, required by `unsub`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub observable: ObservableId,
    pub id: SubscriptionId,
}

/// What a subscriber receives.
#[derive(Debug, Clone)]
pub struct Notification {
    pub observable: ObservableId,
    pub context: ContextId,
    pub slot: SlotId,
    pub value: Option<Value>,
    pub previous: Option<Value>,
    pub revision: i64,
}

/// A pending assignment, guarded by the revision seen when it was created.
///
/// Resolving it after the observable moved on drops the value: the last
/// `set` wins, not the last resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deferred {
    pub observable: ObservableId,
    pub revision: i64,
}

/// Default comparator: identity as defined by [`Value::same`].
pub fn same(a: Option<&Value>, b: Option<&Value>) -> bool {
    Value::same_opt(a, b)
}

/// Structural comparator: equal content counts as unchanged.
pub fn structural(a: Option<&Value>, b: Option<&Value>) -> bool {
    a == b
}

// =============================================================================
// Observable
// =============================================================================

pub struct Observable {
    value: Option<Value>,
    revision: i64,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    comparator: Comparator,
    owner: ContextId,
    slot: SlotId,
}

impl Observable {
    /// Wrap an initial value. An observable created over an existing value
    /// starts at revision 0, an empty one at -1.
    pub fn new(owner: ContextId, slot: SlotId, value: Option<Value>) -> Self {
        Self {
            revision: if value.is_some() { 0 } else { -1 },
            value,
            subscribers: Vec::new(),
            comparator: same,
            owner,
            slot,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn revision(&self) -> i64 {
        self.revision
    }

    pub fn owner(&self) -> ContextId {
        self.owner
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn set_comparator(&mut self, comparator: Comparator) {
        self.comparator = comparator;
    }

    /// Store a value. Returns the previous value when the store is a change
    /// (and bumps the revision), `None` when it was a no-op.
    pub fn store(&mut self, value: Option<Value>, force: bool) -> Option<Option<Value>> {
        if !force && (self.comparator)(self.value.as_ref(), value.as_ref()) {
            return None;
        }
        self.revision += 1;
        Some(std::mem::replace(&mut self.value, value))
    }

    pub fn subscribe(&mut self, id: SubscriptionId, subscriber: Subscriber) {
        self.subscribers.push((id, subscriber));
    }

    /// Remove a subscription. O(n) in the number of subscribers.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        match self.subscribers.iter().position(|(sid, _)| *sid == id) {
            Some(i) => {
                self.subscribers.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.subscribers.iter().any(|(sid, _)| *sid == id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Copy of the subscriber list, in registration order.
    pub fn snapshot(&self) -> Vec<(SubscriptionId, Subscriber)> {
        self.subscribers.clone()
    }

    /// Capture the current revision for a later guarded assignment.
    pub fn defer(&self, observable: ObservableId) -> Deferred {
        Deferred {
            observable,
            revision: self.revision,
        }
    }
}
