//! Cells - slot identities and observable value holders.
//!
//! - [`slot`] - Slot ids, the injectable allocator, named cells
//! - [`observable`] - Revisioned subscribable values backing a slot in a context

pub mod observable;
pub mod slot;

pub use observable::{
    same, structural, Comparator, Deferred, Handler, Notification, Observable, Subscriber,
    Subscription, SubscriptionId,
};
pub use slot::{Cell, Offset, Slot, SlotAllocator, SlotId};
