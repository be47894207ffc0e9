//! Injection - matching a structured input onto declared parameters.
//!
//! ```ignore
//! // card(title, tags: [first, second])
//! let args = ArgShape::map([
//!     ("title", ArgShape::slot(&title)),
//!     ("tags", ArgShape::list([ArgShape::slot(&first), ArgShape::slot(&second)])),
//! ]);
//! let injection = Injection::new(alloc.slot(), args, true);
//!
//! // ctx INPUT = {title: "Hello", tags: ["a", "b"]}
//! let derived = injection.apply_context(&mut rt, ctx)?;
//! assert_eq!(title.value(&rt, derived), Some("Hello".into()));
//! ```
//!
//! `apply_context` creates the derived context once per parent context and
//! caches it there under the injection's `State` offset. Applying again
//! reuses it and reassigns the slots, so repeated application with the same
//! input leaves the derived context unchanged. Template instances do not go
//! through the cache: each one derives its own scope and only re-injects.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::cells::{Cell, Offset, Slot, SlotId};
use crate::context::{Bindings, ContextId};
use crate::engine::Runtime;
use crate::error::Result;
use crate::types::{Key, Value};

use super::Selection;

/// Declared shape of a template's parameters. Leaves are cells.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgShape {
    Slot(Cell),
    Map(IndexMap<Rc<str>, ArgShape>),
    List(Vec<ArgShape>),
}

impl ArgShape {
    pub fn slot(cell: &Cell) -> Self {
        ArgShape::Slot(cell.clone())
    }

    pub fn map<'a>(entries: impl IntoIterator<Item = (&'a str, ArgShape)>) -> Self {
        ArgShape::Map(entries.into_iter().map(|(k, v)| (Rc::from(k), v)).collect())
    }

    pub fn list(items: impl IntoIterator<Item = ArgShape>) -> Self {
        ArgShape::List(items.into_iter().collect())
    }

    /// Shorthand for a map of plain cells keyed by their names.
    pub fn cells<'a>(cells: impl IntoIterator<Item = &'a Cell>) -> Self {
        ArgShape::Map(
            cells
                .into_iter()
                .map(|cell| (cell.name.clone().unwrap_or_else(|| Rc::from("")), ArgShape::slot(cell)))
                .collect(),
        )
    }

    /// Every leaf cell, depth first.
    pub fn leaves(&self) -> Vec<&Cell> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Cell>) {
        match self {
            ArgShape::Slot(cell) => out.push(cell),
            ArgShape::Map(entries) => entries.values().for_each(|shape| shape.collect(out)),
            ArgShape::List(items) => items.iter().for_each(|shape| shape.collect(out)),
        }
    }
}

/// Fills a derived context from structured input.
#[derive(Debug)]
pub struct Injection {
    slot: Slot,
    args: ArgShape,
    isolated: bool,
    extraction: Option<Selection>,
}

impl Injection {
    /// `isolated` makes the derived context a component boundary; otherwise
    /// it shares the parent's lookup chain (inline fragment).
    pub fn new(slot: Slot, args: ArgShape, isolated: bool) -> Self {
        Self {
            slot,
            args,
            isolated,
            extraction: None,
        }
    }

    /// Read the input from a selection instead of the context's `INPUT`.
    pub fn with_extraction(mut self, extraction: Selection) -> Self {
        self.extraction = Some(extraction);
        self
    }

    pub fn id(&self) -> SlotId {
        self.slot.id
    }

    pub fn args(&self) -> &ArgShape {
        &self.args
    }

    pub fn is_isolated(&self) -> bool {
        self.isolated
    }

    /// Derive (or reuse) the context for `ctx` and assign every parameter.
    pub fn apply_context(&self, rt: &mut Runtime, ctx: ContextId) -> Result<ContextId> {
        let cache = self.slot.id.at(Offset::State);
        let derived = match rt.store.cached_context(ctx, cache) {
            Some(derived) => derived,
            None => {
                let derived = self.derive_scope(rt, ctx)?;
                rt.store.cache_context(ctx, cache, derived)?;
                derived
            }
        };
        self.inject(rt, ctx, derived)?;
        Ok(derived)
    }

    /// A fresh, uncached context under `ctx` with the parameter names
    /// registered. Template instances each own one.
    pub(crate) fn derive_scope(&self, rt: &mut Runtime, ctx: ContextId) -> Result<ContextId> {
        let derived = if self.isolated {
            rt.derive_isolated(ctx, Bindings::new())?
        } else {
            rt.derive(ctx, Bindings::new())?
        };
        for cell in self.args.leaves() {
            if let Some(name) = cell.name() {
                rt.store.set_name(derived, name, cell.id())?;
            }
        }
        Ok(derived)
    }

    /// Read the input in `ctx` and assign it to `derived`.
    pub(crate) fn inject(&self, rt: &mut Runtime, ctx: ContextId, derived: ContextId) -> Result<()> {
        let data = match &self.extraction {
            Some(selection) => selection.evaluate(rt, ctx)?,
            None => rt.get(ctx, SlotId::INPUT),
        };
        rt.write_local(derived, SlotId::INPUT, data.clone())?;
        assign(rt, derived, &self.args, data.as_ref())
    }
}

/// Walk `shape` and `value` in lock-step.
fn assign(rt: &mut Runtime, ctx: ContextId, shape: &ArgShape, value: Option<&Value>) -> Result<()> {
    match shape {
        ArgShape::Slot(cell) => match value {
            None | Some(Value::Null) => {
                if rt.store.own(ctx, cell.id()).is_some() {
                    rt.write_local(ctx, cell.id(), None)?;
                }
            }
            Some(value) => {
                rt.write_local(ctx, cell.id(), Some(value.clone()))?;
            }
        },
        ArgShape::Map(entries) => {
            for (name, sub) in entries {
                let child = value.and_then(|v| v.get(&Key::Name(Rc::clone(name))));
                assign(rt, ctx, sub, child)?;
            }
        }
        ArgShape::List(items) => {
            for (index, sub) in items.iter().enumerate() {
                let child = value.and_then(|v| v.get(&Key::Index(index)));
                assign(rt, ctx, sub, child)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::SlotAllocator;
    use crate::surface::MemoryDom;

    struct Fixture {
        rt: Runtime,
        title: Cell,
        first: Cell,
        second: Cell,
        injection: Injection,
    }

    fn fixture(isolated: bool) -> Fixture {
        let rt = Runtime::new(MemoryDom::new());
        let alloc: SlotAllocator = rt.allocator().clone();
        let title = alloc.cell("title", "untitled");
        let first = alloc.cell("first", "");
        let second = alloc.cell("second", "");
        let args = ArgShape::map([
            ("title", ArgShape::slot(&title)),
            (
                "tags",
                ArgShape::list([ArgShape::slot(&first), ArgShape::slot(&second)]),
            ),
        ]);
        let injection = Injection::new(alloc.slot(), args, isolated);
        Fixture {
            rt,
            title,
            first,
            second,
            injection,
        }
    }

    fn input(title: Option<&str>, tags: &[&str]) -> Value {
        let mut entries: Vec<(&str, Value)> = Vec::new();
        if let Some(title) = title {
            entries.push(("title", Value::from(title)));
        }
        entries.push(("tags", Value::list(tags.iter().copied())));
        Value::map(entries)
    }

    #[test]
    fn test_matches_nested_shape() {
        let mut f = fixture(true);
        let ctx = f
            .rt
            .root(Bindings::new().raw(SlotId::INPUT, input(Some("Hello"), &["a", "b"])))
            .unwrap();

        let derived = f.injection.apply_context(&mut f.rt, ctx).unwrap();
        assert_ne!(derived, ctx);
        assert_eq!(f.rt.get(derived, f.title.id()), Some(Value::from("Hello")));
        assert_eq!(f.rt.get(derived, f.first.id()), Some(Value::from("a")));
        assert_eq!(f.rt.get(derived, f.second.id()), Some(Value::from("b")));
        assert_eq!(f.rt.lookup(derived, "title"), Some(Value::from("Hello")));
    }

    #[test]
    fn test_missing_values_are_not_assigned() {
        let mut f = fixture(true);
        let ctx = f
            .rt
            .root(Bindings::new().raw(SlotId::INPUT, input(None, &["a"])))
            .unwrap();

        let derived = f.injection.apply_context(&mut f.rt, ctx).unwrap();
        assert_eq!(f.rt.get(derived, f.title.id()), None);
        assert_eq!(f.rt.get(derived, f.second.id()), None);
        assert_eq!(f.title.value(&f.rt, derived), Some(Value::from("untitled")));
    }

    #[test]
    fn test_apply_twice_is_idempotent() {
        let mut f = fixture(true);
        let ctx = f
            .rt
            .root(Bindings::new().raw(SlotId::INPUT, input(Some("Hello"), &["a", "b"])))
            .unwrap();

        let first = f.injection.apply_context(&mut f.rt, ctx).unwrap();
        let before = f.rt.store().snapshot(first);
        let contexts = f.rt.store().context_count();
        let observables = f.rt.store().observable_count();

        let second = f.injection.apply_context(&mut f.rt, ctx).unwrap();
        assert_eq!(first, second);
        assert_eq!(f.rt.store().snapshot(second), before);
        assert_eq!(f.rt.store().context_count(), contexts);
        assert_eq!(f.rt.store().observable_count(), observables);
    }

    #[test]
    fn test_reapply_clears_values_gone_from_input() {
        let mut f = fixture(true);
        let ctx = f
            .rt
            .root(Bindings::new().raw(SlotId::INPUT, input(Some("Hello"), &["a", "b"])))
            .unwrap();
        let derived = f.injection.apply_context(&mut f.rt, ctx).unwrap();

        f.rt.set(ctx, SlotId::INPUT, input(Some("Bye"), &["a"]), true)
            .unwrap();
        f.injection.apply_context(&mut f.rt, ctx).unwrap();

        assert_eq!(f.rt.get(derived, f.title.id()), Some(Value::from("Bye")));
        assert_eq!(f.rt.get(derived, f.second.id()), None);
    }

    #[test]
    fn test_isolated_derivation_hides_parent_cells() {
        let mut f = fixture(true);
        let outer = f.rt.allocator().cell("outer", 0);
        let ctx = f.rt.root(Bindings::new().cell(&outer, 1)).unwrap();

        let derived = f.injection.apply_context(&mut f.rt, ctx).unwrap();
        assert_eq!(f.rt.lookup(derived, "outer"), None);

        let mut g = fixture(false);
        let outer = g.rt.allocator().cell("outer", 0);
        let ctx = g.rt.root(Bindings::new().cell(&outer, 1)).unwrap();
        let derived = g.injection.apply_context(&mut g.rt, ctx).unwrap();
        assert_eq!(g.rt.lookup(derived, "outer"), Some(Value::from(1)));
    }
}
