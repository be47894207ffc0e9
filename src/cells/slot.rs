//! Slots and cells - stable identities for reactive values.
//!
//! A [`Slot`] carries no value. It is a key into a
//! [`Context`](crate::context::ContextData): the same slot holds different
//! values in different contexts (one per template instance, branch or
//! mapped item).
//!
//! # Id layout
//!
//! Ids are handed out by a [`SlotAllocator`] in steps of `stride` (10 by
//! default), starting at `base` (10 by default). The ids in between are
//! offsets reserved for data co-located with the slot in a context:
//!
//! ```text
//! 10  slot value          20  next slot ...
//! 11  parent   (Offset::Parent)
//! 12  input    (Offset::Input)
//! 13  node     (Offset::Node)
//! 14  state    (Offset::State)
//! ...
//! ```
//!
//! Ids below `base` are context-level keys ([`SlotId::INPUT`],
//! [`SlotId::KEY`], [`SlotId::REFS`]).

use std::cell::Cell as StdCell;
use std::fmt;
use std::rc::Rc;

use crate::config::RuntimeConfig;
use crate::context::ContextId;
use crate::engine::Runtime;
use crate::error::Result;
use crate::types::{Flow, Value};

// =============================================================================
// Slot id
// =============================================================================

/// Numeric identity of a slot, or of one of its offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u64);

impl SlotId {
    /// Raw input of a context (the data a template instance was rendered with).
    pub const INPUT: SlotId = SlotId(Offset::Input as u64);
    /// Key of a mapped item context.
    pub const KEY: SlotId = SlotId(8);
    /// Named node references of a template instance.
    pub const REFS: SlotId = SlotId(9);
    /// Ids below this are context-level keys and never allocated.
    pub const RESERVED: u64 = 10;

    /// Id of the given offset of this slot.
    pub const fn at(self, offset: Offset) -> SlotId {
        SlotId(self.0 + offset as u64)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot({})", self.0)
    }
}

/// Offsets reserved after each slot id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum Offset {
    Parent = 1,
    Input = 2,
    Node = 3,
    State = 4,
    Render = 5,
    Revision = 6,
    Sub = 7,
}

// =============================================================================
// Allocator
// =============================================================================

/// Hands out slot ids.
///
/// Cloning an allocator shares its counter, so every compiler and runtime
/// built from clones of one allocator sees unique ids. Ids are never reused
/// unless [`SlotAllocator::reset`] is called, which is meant for tests.
#[derive(Debug, Clone)]
pub struct SlotAllocator {
    next: Rc<StdCell<u64>>,
    base: u64,
    stride: u64,
}

impl SlotAllocator {
    pub fn new(base: u64, stride: u64) -> Self {
        Self {
            next: Rc::new(StdCell::new(0)),
            base: base.max(SlotId::RESERVED),
            stride: stride.max(8),
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.slot_base, config.slot_stride)
    }

    /// Allocate the next id.
    pub fn allocate(&self) -> SlotId {
        let n = self.next.get();
        self.next.set(n + 1);
        SlotId(self.base + n * self.stride)
    }

    /// Number of ids handed out so far.
    pub fn allocated(&self) -> u64 {
        self.next.get()
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Restart numbering from `base` (for tests).
    pub fn reset(&self) {
        self.next.set(0);
    }

    /// Allocate a bare slot.
    pub fn slot(&self) -> Slot {
        Slot { id: self.allocate() }
    }

    /// Allocate a named cell with a default value.
    pub fn cell(&self, name: &str, default: impl Into<Value>) -> Cell {
        Cell {
            slot: self.slot(),
            name: Some(Rc::from(name)),
            default: Some(default.into()),
        }
    }
}

impl Default for SlotAllocator {
    fn default() -> Self {
        Self::from_config(&RuntimeConfig::default())
    }
}

// =============================================================================
// Slot
// =============================================================================

/// A stable identity denoting a reactive value location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub id: SlotId,
}

impl Slot {
    pub fn id(&self) -> SlotId {
        self.id
    }

    /// Current value of this slot in `ctx`.
    pub fn get(&self, rt: &Runtime, ctx: ContextId) -> Option<Value> {
        rt.get(ctx, self.id)
    }

    /// Set and always notify, the semantics of user commands.
    pub fn set(&self, rt: &mut Runtime, ctx: ContextId, value: impl Into<Value>) -> Result<Flow> {
        rt.set(ctx, self.id, value.into(), true)
    }

    /// Apply `f` to the current value and store the result.
    pub fn update(
        &self,
        rt: &mut Runtime,
        ctx: ContextId,
        f: impl FnOnce(Option<Value>) -> Value,
    ) -> Result<Flow> {
        let next = f(rt.get(ctx, self.id));
        rt.set(ctx, self.id, next, true)
    }

    /// Flip a boolean value, returning the previous value.
    pub fn toggle(&self, rt: &mut Runtime, ctx: ContextId) -> Result<Option<Value>> {
        let previous = rt.get(ctx, self.id);
        let next = !previous.as_ref().is_some_and(Value::truthy);
        rt.set(ctx, self.id, Value::Bool(next), true)?;
        Ok(previous)
    }

    /// Append an item to a list value (a missing value counts as empty).
    pub fn append(&self, rt: &mut Runtime, ctx: ContextId, item: impl Into<Value>) -> Result<Flow> {
        let mut items = match rt.get(ctx, self.id) {
            Some(Value::List(items)) => items.as_ref().clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other],
        };
        items.push(item.into());
        rt.set(ctx, self.id, Value::List(Rc::new(items)), true)
    }

    /// Remove and return the last item of a list value.
    pub fn pop(&self, rt: &mut Runtime, ctx: ContextId) -> Result<Option<Value>> {
        let Some(Value::List(items)) = rt.get(ctx, self.id) else {
            return Ok(None);
        };
        let mut items = items.as_ref().clone();
        let last = items.pop();
        rt.set(ctx, self.id, Value::List(Rc::new(items)), true)?;
        Ok(last)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

// =============================================================================
// Cell
// =============================================================================

/// A slot with an optional name and default value.
///
/// Names are used for by-name lookups through a context chain; the default is
/// what [`Cell::value`] reports when the slot is unbound.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub slot: Slot,
    pub name: Option<Rc<str>>,
    pub default: Option<Value>,
}

impl Cell {
    pub fn id(&self) -> SlotId {
        self.slot.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Current value in `ctx`, falling back to the default.
    pub fn value(&self, rt: &Runtime, ctx: ContextId) -> Option<Value> {
        rt.get(ctx, self.slot.id).or_else(|| self.default.clone())
    }
}

impl std::ops::Deref for Cell {
    type Target = Slot;

    fn deref(&self) -> &Slot {
        &self.slot
    }
}
