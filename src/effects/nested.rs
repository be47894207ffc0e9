//! Template and application effects - a whole sub-template at a placeholder.
//!
//! A template effect derives a child context holding its input as `INPUT`
//! and instantiates the template there. When the input changes the child's
//! `INPUT` is rewritten and the instance's injection re-run, so parameters
//! update in place. A template selected by name is swapped when the name
//! changes: the old instance is disposed, a fresh one takes its place.
//!
//! An application effect renders its template in an isolated scope that only
//! sees the cells explicitly shared with it.

use std::rc::Rc;

use crate::cells::SlotId;
use crate::context::{Bindings, ContextId};
use crate::engine::{EffectId, InstanceId, Runtime};
use crate::error::Result;
use crate::template::Template;
use crate::types::{NodeId, Value};

use super::{EffectData, EffectDef, EffectKind, Lifecycle, TemplateRef};

#[derive(Debug, Default)]
pub(crate) struct NestedState {
    pub(crate) template: Option<Rc<Template>>,
    pub(crate) name: Option<Rc<str>>,
    pub(crate) context: Option<ContextId>,
    pub(crate) instance: Option<InstanceId>,
}

fn state(rt: &mut Runtime, id: EffectId) -> Result<Option<&mut NestedState>> {
    Ok(match &mut rt.effect_mut(id)?.data {
        EffectData::Nested(state) => Some(state),
        _ => None,
    })
}

fn selected_name(rt: &mut Runtime, ctx: ContextId, reference: &TemplateRef) -> Result<Option<Rc<str>>> {
    Ok(match reference {
        TemplateRef::Selected(selection) => match selection.evaluate(rt, ctx)? {
            Some(Value::Str(name)) => Some(name),
            _ => None,
        },
        _ => None,
    })
}

/// Build the child context and instance.
pub(super) fn apply(rt: &mut Runtime, id: EffectId, def: &EffectDef, ctx: ContextId) -> Result<()> {
    let (context, reference) = match &def.kind {
        EffectKind::Template { input, template } => {
            let bindings = match input {
                Some(input) => {
                    let data = input.evaluate(rt, ctx)?;
                    rt.effect_mut(id)?.value = data.clone();
                    match data {
                        Some(data) => Bindings::new().raw(SlotId::INPUT, data),
                        None => Bindings::new(),
                    }
                }
                None => Bindings::new(),
            };
            (rt.derive(ctx, bindings)?, template)
        }
        EffectKind::Application { shared, template } => {
            let bindings = shared
                .iter()
                .fold(Bindings::new(), |bindings, cell| bindings.share(cell, ctx));
            (rt.derive_isolated(ctx, bindings)?, template)
        }
        _ => return Ok(()),
    };

    let name = selected_name(rt, ctx, reference)?;
    let template = rt.resolve_template(ctx, reference, def.kind.name())?;
    let instance = match &template {
        Some(template) => Some(rt.instantiate(template, context)?),
        None => None,
    };
    if let Some(state) = state(rt, id)? {
        *state = NestedState {
            template,
            name,
            context: Some(context),
            instance,
        };
    }
    Ok(())
}

/// Handle a notification: swap the template if its name changed, then push
/// the new input.
pub(super) fn refresh(rt: &mut Runtime, id: EffectId, def: &EffectDef, ctx: ContextId) -> Result<()> {
    let EffectKind::Template { input, template } = &def.kind else {
        return Ok(());
    };

    if matches!(template, TemplateRef::Selected(_)) {
        let name = selected_name(rt, ctx, template)?;
        let current = state(rt, id)?.and_then(|s| s.name.clone());
        if name != current {
            tracing::debug!(effect = %id, from = ?current, to = ?name, "swapping template");
            let mounted = rt.effect(id).is_some_and(|s| s.flags.contains(Lifecycle::MOUNTED));
            let node = rt.effect_mut(id)?.node;
            dispose(rt, id)?;
            apply(rt, id, def, ctx)?;
            if mounted {
                mount(rt, id, node)?;
            }
            return Ok(());
        }
    }

    let Some(input) = input else {
        return Ok(());
    };
    let current = input.evaluate(rt, ctx)?;
    let previous = rt.effect_mut(id)?.value.clone();
    rt.unify(id, current, previous)
}

/// Push a changed input into the child context.
pub(super) fn update(rt: &mut Runtime, id: EffectId, current: Option<Value>) -> Result<()> {
    let Some((context, instance)) = state(rt, id)?.map(|s| (s.context, s.instance)) else {
        return Ok(());
    };
    let Some(context) = context else {
        return Ok(());
    };
    rt.write_local(context, SlotId::INPUT, current)?;
    if let Some(instance) = instance {
        rt.refresh_instance(instance)?;
    }
    Ok(())
}

pub(super) fn mount(rt: &mut Runtime, id: EffectId, placeholder: NodeId) -> Result<()> {
    if let Some(instance) = state(rt, id)?.and_then(|s| s.instance) {
        rt.mount_instance(instance, placeholder)?;
    }
    Ok(())
}

pub(super) fn unmount(rt: &mut Runtime, id: EffectId) -> Result<()> {
    if let Some(instance) = state(rt, id)?.and_then(|s| s.instance) {
        rt.unmount_instance(instance)?;
    }
    Ok(())
}

pub(super) fn dispose(rt: &mut Runtime, id: EffectId) -> Result<()> {
    let Some(taken) = state(rt, id)?.map(std::mem::take) else {
        return Ok(());
    };
    if let Some(instance) = taken.instance {
        rt.dispose_instance(instance)?;
    }
    if let Some(context) = taken.context {
        rt.release(context);
    }
    Ok(())
}
