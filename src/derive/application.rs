//! Application and Extraction - derivations stored at their own slot.
//!
//! Both recompute from their inputs on every evaluation and write the result
//! into the evaluating context. A result structurally equal to the stored
//! one is not written again and the stored value is returned instead, so
//! stable input yields the same value, container identity included.

use std::fmt;
use std::rc::Rc;

use crate::cells::{Slot, SlotId};
use crate::context::ContextId;
use crate::engine::Runtime;
use crate::error::Result;
use crate::types::Value;

use super::Selection;

/// Pure transform applied to an upstream value.
pub type Transform = Rc<dyn Fn(Option<&Value>) -> Value>;

/// Store the result of a derivation, keeping the previous value when equal.
fn store(rt: &mut Runtime, ctx: ContextId, slot: SlotId, value: Value) -> Result<Value> {
    if let Some(stored) = rt.store.own(ctx, slot).and(rt.get(ctx, slot)) {
        if stored == value {
            return Ok(stored);
        }
    }
    rt.write_local(ctx, slot, Some(value.clone()))?;
    Ok(value)
}

// =============================================================================
// Application
// =============================================================================

/// `transform(input)` stored at the application's own slot.
pub struct Application {
    slot: Slot,
    input: Selection,
    transform: Transform,
}

impl Application {
    pub fn new(slot: Slot, input: Selection, transform: Transform) -> Self {
        Self { slot, input, transform }
    }

    pub fn id(&self) -> SlotId {
        self.slot.id
    }

    pub fn input(&self) -> &Selection {
        &self.input
    }

    /// Compute and store. Returns the stored value.
    pub fn evaluate(&self, rt: &mut Runtime, ctx: ContextId) -> Result<Option<Value>> {
        let input = self.input.evaluate(rt, ctx)?;
        let value = (self.transform)(input.as_ref());
        store(rt, ctx, self.slot.id, value).map(Some)
    }

    pub fn apply_context(&self, rt: &mut Runtime, ctx: ContextId) -> Result<ContextId> {
        self.evaluate(rt, ctx)?;
        Ok(ctx)
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("slot", &self.slot)
            .field("input", &self.input)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Several selections combined into one value.
#[derive(Debug)]
pub enum Extraction {
    /// A list, one item per selection. Unset selections become `Null`.
    List { slot: Slot, items: Vec<Selection> },
    /// A map with one entry per named selection. Unset selections are left
    /// out, so an injection reading the map skips them.
    Record {
        slot: Slot,
        fields: Vec<(Rc<str>, Selection)>,
    },
}

impl Extraction {
    pub fn id(&self) -> SlotId {
        match self {
            Extraction::List { slot, .. } | Extraction::Record { slot, .. } => slot.id,
        }
    }

    pub(crate) fn selections(&self) -> Vec<&Selection> {
        match self {
            Extraction::List { items, .. } => items.iter().collect(),
            Extraction::Record { fields, .. } => fields.iter().map(|(_, s)| s).collect(),
        }
    }

    pub fn evaluate(&self, rt: &mut Runtime, ctx: ContextId) -> Result<Option<Value>> {
        let value = match self {
            Extraction::List { items, .. } => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(item.evaluate(rt, ctx)?.unwrap_or_default());
                }
                Value::List(Rc::new(values))
            }
            Extraction::Record { fields, .. } => {
                let mut entries = crate::types::ValueMap::new();
                for (name, selection) in fields {
                    if let Some(value) = selection.evaluate(rt, ctx)? {
                        entries.insert(Rc::clone(name), value);
                    }
                }
                Value::Map(Rc::new(entries))
            }
        };
        store(rt, ctx, self.id(), value).map(Some)
    }

    pub fn apply_context(&self, rt: &mut Runtime, ctx: ContextId) -> Result<ContextId> {
        self.evaluate(rt, ctx)?;
        Ok(ctx)
    }
}
