//! Argument - a template parameter.

use std::ops::Deref;

use crate::cells::{Cell, SlotId};
use crate::context::ContextId;
use crate::engine::Runtime;
use crate::types::Value;

/// A declared parameter of a template, backed by a cell.
///
/// Reading an argument falls back to the cell's default when the slot is
/// unbound in the context. The user commands of [`Slot`](crate::cells::Slot)
/// (`set`, `toggle`, `append`, `pop`, `update`) are available through
/// `Deref`.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    cell: Cell,
}

impl Argument {
    pub fn new(cell: Cell) -> Self {
        Self { cell }
    }

    pub fn cell(&self) -> &Cell {
        &self.cell
    }

    pub fn id(&self) -> SlotId {
        self.cell.id()
    }

    pub fn evaluate(&self, rt: &Runtime, ctx: ContextId) -> Option<Value> {
        self.cell.value(rt, ctx)
    }
}

impl Deref for Argument {
    type Target = Cell;

    fn deref(&self) -> &Cell {
        &self.cell
    }
}

impl From<Cell> for Argument {
    fn from(cell: Cell) -> Self {
        Self::new(cell)
    }
}
