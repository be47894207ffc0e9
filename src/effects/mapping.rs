//! Mapping effect - keyed reconciliation of atoms, lists and maps.
//!
//! Every item gets its own context (holding the item value under the
//! effect's target cell and as `INPUT`, plus its key), its own template
//! instance and its own anchor placeholder. A component row reads its
//! parameters from the item's `INPUT`. Items are tracked in a key table:
//!
//! ```text
//! key        stamp  context   instance   anchor
//! Index(0)   7      3v0       2v0        #41
//! Index(1)   7      4v0       3v0        #44
//! ```
//!
//! Each `unify` bumps the effect's revision, then:
//! 1. every key present in the input is stamped with the new revision; new
//!    keys get a new item, existing keys are updated in place, and only when
//!    their value is not the same as in the previous input
//! 2. every item left with an older stamp is unmounted, disposed and dropped
//!
//! Atoms use the single key [`Key::Atom`], lists are keyed by position and
//! maps by property name. An empty input (unset, null, empty list or map)
//! drops every item.
//!
//! Output is append-only: new items are inserted before the effect's
//! placeholder, existing nodes are never moved. Removing the middle of a list
//! therefore shifts values into the surviving positional items and drops the
//! last one.

use indexmap::IndexMap;

use crate::cells::{Cell, SlotId};
use crate::context::{Bindings, ContextId};
use crate::engine::{EffectId, InstanceId, Runtime};
use crate::error::Result;
use crate::types::{Key, NodeId, Value};

use super::{EffectData, Lifecycle, TemplateRef};

#[derive(Debug, Clone, Copy)]
struct MappedItem {
    revision: u64,
    context: ContextId,
    instance: Option<InstanceId>,
    anchor: NodeId,
}

#[derive(Debug, Default)]
pub(crate) struct MappingState {
    revision: u64,
    items: IndexMap<Key, MappedItem>,
}

impl MappingState {
    pub(crate) fn contexts(&self) -> Vec<(Key, ContextId)> {
        self.items.iter().map(|(k, item)| (k.clone(), item.context)).collect()
    }
}

fn state(rt: &mut Runtime, id: EffectId) -> Result<Option<&mut MappingState>> {
    Ok(match &mut rt.effect_mut(id)?.data {
        EffectData::Items(state) => Some(state),
        _ => None,
    })
}

/// `(key, value, previous value under the same key)` for every item of the
/// input, in input order.
fn entries(current: Option<&Value>, previous: Option<&Value>) -> Vec<(Key, Value, Option<Value>)> {
    let Some(current) = current.filter(|v| !v.is_empty()) else {
        return Vec::new();
    };
    match current {
        Value::List(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let key = Key::Index(i);
                let before = previous.and_then(|p| p.as_list()).and_then(|p| p.get(i)).cloned();
                (key, item.clone(), before)
            })
            .collect(),
        Value::Map(fields) => fields
            .iter()
            .map(|(name, item)| {
                let before = previous.and_then(|p| p.as_map()).and_then(|p| p.get(name)).cloned();
                (Key::Name(name.clone()), item.clone(), before)
            })
            .collect(),
        atom => {
            let before = previous.filter(|p| p.is_atom()).cloned();
            vec![(Key::Atom, atom.clone(), before)]
        }
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

pub(super) fn render(
    rt: &mut Runtime,
    id: EffectId,
    template: &TemplateRef,
    target: &Cell,
    current: Option<&Value>,
    previous: Option<&Value>,
) -> Result<()> {
    let Some(revision) = state(rt, id)?.map(|s| {
        s.revision += 1;
        s.revision
    }) else {
        return Ok(());
    };

    for (key, value, before) in entries(current, previous) {
        let existing = state(rt, id)?.and_then(|s| {
            let item = s.items.get_mut(&key)?;
            item.revision = revision;
            Some((item.context, item.instance))
        });
        match existing {
            Some((context, instance)) => {
                if !Value::same_opt(Some(&value), before.as_ref()) {
                    tracing::trace!(effect = %id, key = %key, "updating item in place");
                    rt.set(context, target.id(), value.clone(), false)?;
                    rt.write_local(context, SlotId::INPUT, Some(value))?;
                    if let Some(instance) = instance {
                        rt.refresh_instance(instance)?;
                    }
                }
            }
            None => create(rt, id, template, target, key, value, revision)?,
        }
    }

    let stale: Vec<(Key, MappedItem)> = match state(rt, id)? {
        Some(state) => {
            let keys: Vec<Key> = state
                .items
                .iter()
                .filter(|(_, item)| item.revision != revision)
                .map(|(key, _)| key.clone())
                .collect();
            keys.into_iter()
                .filter_map(|key| state.items.shift_remove(&key).map(|item| (key, item)))
                .collect()
        }
        None => Vec::new(),
    };
    for (key, item) in stale {
        tracing::debug!(effect = %id, key = %key, "dropping item");
        drop_item(rt, item)?;
    }
    Ok(())
}

fn create(
    rt: &mut Runtime,
    id: EffectId,
    template: &TemplateRef,
    target: &Cell,
    key: Key,
    value: Value,
    revision: u64,
) -> Result<()> {
    let (ctx, placeholder, mounted) = {
        let effect = rt.effect_mut(id)?;
        (effect.context, effect.node, effect.flags.contains(Lifecycle::MOUNTED))
    };
    tracing::debug!(effect = %id, key = %key, "creating item");

    let bindings = Bindings::new()
        .cell(target, value.clone())
        .raw(SlotId::INPUT, value)
        .raw(SlotId::KEY, &key);
    let context = rt.derive(ctx, bindings)?;
    rt.store.set_key(context, key.clone())?;

    let anchor = rt.effector.ensure_placeholder(None, 0, "item");
    let instance = match rt.resolve_template(context, template, "MappingEffect")? {
        Some(template) => Some(rt.instantiate(&template, context)?),
        None => None,
    };

    if let Some(state) = state(rt, id)? {
        state.items.insert(
            key,
            MappedItem {
                revision,
                context,
                instance,
                anchor,
            },
        );
    }

    if mounted {
        rt.effector.append_child(placeholder, anchor);
        if let Some(instance) = instance {
            rt.mount_instance(instance, anchor)?;
        }
    }
    Ok(())
}

fn drop_item(rt: &mut Runtime, item: MappedItem) -> Result<()> {
    if let Some(instance) = item.instance {
        rt.unmount_instance(instance)?;
        rt.dispose_instance(instance)?;
    }
    rt.effector.unmount(item.anchor);
    rt.effector.release(item.anchor);
    rt.release(item.context);
    Ok(())
}

// =============================================================================
// Lifecycle
// =============================================================================

fn items(rt: &mut Runtime, id: EffectId) -> Result<Vec<MappedItem>> {
    Ok(state(rt, id)?
        .map(|s| s.items.values().copied().collect())
        .unwrap_or_default())
}

pub(super) fn mount(rt: &mut Runtime, id: EffectId, placeholder: NodeId) -> Result<()> {
    for item in items(rt, id)? {
        rt.effector.append_child(placeholder, item.anchor);
        if let Some(instance) = item.instance {
            rt.mount_instance(instance, item.anchor)?;
        }
    }
    Ok(())
}

pub(super) fn unmount(rt: &mut Runtime, id: EffectId) -> Result<()> {
    for item in items(rt, id)? {
        if let Some(instance) = item.instance {
            rt.unmount_instance(instance)?;
        }
        rt.effector.unmount(item.anchor);
    }
    Ok(())
}

pub(super) fn dispose(rt: &mut Runtime, id: EffectId) -> Result<()> {
    let all: Vec<MappedItem> = match state(rt, id)? {
        Some(state) => state.items.drain(..).map(|(_, item)| item).collect(),
        None => return Ok(()),
    };
    for item in all {
        drop_item(rt, item)?;
    }
    Ok(())
}
