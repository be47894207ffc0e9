//! Derivations - computations that read a context and store a result in it.
//!
//! - [`Argument`] - a template parameter backed by a cell
//! - [`Application`] - `transform(input)` stored at its own slot
//! - [`Extraction`] - several selections combined into one list or map
//! - [`Injection`] - structured input matched onto parameters in a derived
//!   context
//!
//! [`Selection`] is the common currency: whatever an effect reads its value
//! from. Evaluating a selection is idempotent, and its [`Selection::sources`]
//! are the cells an effect subscribes to.

mod application;
mod argument;
mod injection;

pub use application::{Application, Extraction, Transform};
pub use argument::Argument;
pub use injection::{ArgShape, Injection};

use std::rc::Rc;

use crate::cells::{Cell, Slot, SlotId};
use crate::context::ContextId;
use crate::engine::Runtime;
use crate::error::Result;
use crate::types::Value;

/// Where an effect reads its value from.
#[derive(Debug, Clone)]
pub enum Selection {
    /// A fixed value.
    Constant(Value),
    /// A bare slot, no default.
    Slot(Slot),
    /// A cell, with its default as fallback.
    Argument(Argument),
    Application(Rc<Application>),
    Extraction(Rc<Extraction>),
}

impl Selection {
    pub fn constant(value: impl Into<Value>) -> Self {
        Selection::Constant(value.into())
    }

    /// Slot the selection stores its result at, if any.
    pub fn id(&self) -> Option<SlotId> {
        match self {
            Selection::Constant(_) => None,
            Selection::Slot(slot) => Some(slot.id),
            Selection::Argument(arg) => Some(arg.id()),
            Selection::Application(app) => Some(app.id()),
            Selection::Extraction(ext) => Some(ext.id()),
        }
    }

    /// Current value in `ctx`, recomputing derived values.
    pub fn evaluate(&self, rt: &mut Runtime, ctx: ContextId) -> Result<Option<Value>> {
        match self {
            Selection::Constant(value) => Ok(Some(value.clone())),
            Selection::Slot(slot) => Ok(slot.get(rt, ctx)),
            Selection::Argument(arg) => Ok(arg.evaluate(rt, ctx)),
            Selection::Application(app) => app.evaluate(rt, ctx),
            Selection::Extraction(ext) => ext.evaluate(rt, ctx),
        }
    }

    pub fn apply_context(&self, rt: &mut Runtime, ctx: ContextId) -> Result<ContextId> {
        self.evaluate(rt, ctx)?;
        Ok(ctx)
    }

    /// Cells this selection ultimately reads.
    pub fn sources(&self) -> Vec<SlotId> {
        let mut out = Vec::new();
        self.collect_sources(&mut out);
        out
    }

    fn collect_sources(&self, out: &mut Vec<SlotId>) {
        match self {
            Selection::Constant(_) => {}
            Selection::Slot(slot) => push_unique(out, slot.id),
            Selection::Argument(arg) => push_unique(out, arg.id()),
            Selection::Application(app) => app.input().collect_sources(out),
            Selection::Extraction(ext) => {
                for selection in ext.selections() {
                    selection.collect_sources(out);
                }
            }
        }
    }
}

fn push_unique(out: &mut Vec<SlotId>, id: SlotId) {
    if !out.contains(&id) {
        out.push(id);
    }
}

impl From<&Cell> for Selection {
    fn from(cell: &Cell) -> Self {
        Selection::Argument(Argument::new(cell.clone()))
    }
}

impl From<Cell> for Selection {
    fn from(cell: Cell) -> Self {
        Selection::Argument(Argument::new(cell))
    }
}

impl From<&Argument> for Selection {
    fn from(arg: &Argument) -> Self {
        Selection::Argument(arg.clone())
    }
}

impl From<Slot> for Selection {
    fn from(slot: Slot) -> Self {
        Selection::Slot(slot)
    }
}

impl From<Application> for Selection {
    fn from(app: Application) -> Self {
        Selection::Application(Rc::new(app))
    }
}

impl From<Extraction> for Selection {
    fn from(ext: Extraction) -> Self {
        Selection::Extraction(Rc::new(ext))
    }
}
