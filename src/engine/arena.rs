//! Generational arena - index allocation for engine objects.
//!
//! Contexts, observables, live effects and template instances reference each
//! other (parent/child, owner, subscriber). Instead of `Rc` cycles they live
//! in arenas and point at each other through copyable handles:
//! - Free index pool for O(1) reuse
//! - A generation per index so a handle to a released entry never aliases
//!   whatever reuses its index

use std::fmt;
use std::marker::PhantomData;

// =============================================================================
// Handles
// =============================================================================

/// Raw index + generation pair behind every typed handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle {
    index: u32,
    generation: u32,
}

impl RawHandle {
    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Typed handle into an [`Arena`].
pub trait Handle: Copy {
    fn from_raw(raw: RawHandle) -> Self;
    fn raw(self) -> RawHandle;
}

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name($crate::engine::arena::RawHandle);

        impl $crate::engine::arena::Handle for $name {
            fn from_raw(raw: $crate::engine::arena::RawHandle) -> Self {
                Self(raw)
            }
            fn raw(self) -> $crate::engine::arena::RawHandle {
                self.0
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({:?})", stringify!($name), self.0)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{:?}", self.0)
            }
        }
    };
}

handle!(
    /// Handle to a context.
    ContextId
);
handle!(
    /// Handle to an observable.
    ObservableId
);
handle!(
    /// Handle to a live effect.
    EffectId
);
handle!(
    /// Handle to a live template instance.
    InstanceId
);

// =============================================================================
// Arena
// =============================================================================

enum Entry<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

/// Storage with stable, generation-checked handles.
pub struct Arena<H: Handle, T> {
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
    len: usize,
    _handle: PhantomData<H>,
}

impl<H: Handle, T> Arena<H, T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            len: 0,
            _handle: PhantomData,
        }
    }

    /// Store a value, reusing a freed index if one is available.
    pub fn insert(&mut self, value: T) -> H {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.entries[index as usize];
            let generation = match slot {
                Entry::Vacant { generation } => *generation,
                Entry::Occupied { .. } => unreachable!("free list points at an occupied entry"),
            };
            *slot = Entry::Occupied { generation, value };
            H::from_raw(RawHandle { index, generation })
        } else {
            let index = self.entries.len() as u32;
            self.entries.push(Entry::Occupied { generation: 0, value });
            H::from_raw(RawHandle { index, generation: 0 })
        }
    }

    pub fn get(&self, handle: H) -> Option<&T> {
        let raw = handle.raw();
        match self.entries.get(raw.index()) {
            Some(Entry::Occupied { generation, value }) if *generation == raw.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        let raw = handle.raw();
        match self.entries.get_mut(raw.index()) {
            Some(Entry::Occupied { generation, value }) if *generation == raw.generation => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, handle: H) -> bool {
        self.get(handle).is_some()
    }

    /// Remove a value. The index goes back to the pool with a bumped
    /// generation, so `handle` stays dead forever.
    pub fn remove(&mut self, handle: H) -> Option<T> {
        let raw = handle.raw();
        let slot = self.entries.get_mut(raw.index())?;
        let generation = match slot {
            Entry::Occupied { generation, .. } if *generation == raw.generation => *generation,
            _ => return None,
        };
        let next = Entry::Vacant {
            generation: generation.wrapping_add(1),
        };
        let Entry::Occupied { value, .. } = std::mem::replace(slot, next) else {
            unreachable!("entry checked occupied above")
        };
        self.free.push(raw.index);
        self.len -= 1;
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate live entries.
    pub fn iter(&self) -> impl Iterator<Item = (H, &T)> {
        self.entries.iter().enumerate().filter_map(|(index, entry)| match entry {
            Entry::Occupied { generation, value } => Some((
                H::from_raw(RawHandle {
                    index: index as u32,
                    generation: *generation,
                }),
                value,
            )),
            Entry::Vacant { .. } => None,
        })
    }
}

impl<H: Handle, T> Default for Arena<H, T> {
    fn default() -> Self {
        Self::new()
    }
}
