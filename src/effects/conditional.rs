//! Conditional effect - branch selection with branch caching.
//!
//! # State machine
//!
//! ```text
//! {no branch} ──value──► {branch i} ──value──► {branch j} ──► ...
//! ```
//!
//! Branches are scanned in declaration order. The first branch whose literal
//! equals the value, or whose predicate accepts it, wins. If none does, the
//! first default branch wins. Nothing matching means no branch.
//!
//! A branch's context and instance are created the first time it is
//! selected. Leaving a branch only unmounts it: the context and instance
//! stay cached, so selecting it again resumes exactly where it left off.
//! Only disposing the effect releases cached branches.

use std::fmt;
use std::rc::Rc;

use crate::context::{Bindings, ContextId};
use crate::engine::{EffectId, InstanceId, Runtime};
use crate::error::Result;
use crate::types::{NodeId, Value};

use super::{EffectData, Lifecycle, TemplateRef};

/// What a branch matches.
#[derive(Clone)]
pub enum Guard {
    /// Equal to this literal.
    Value(Value),
    /// Accepted by this predicate.
    Predicate(Rc<dyn Fn(&Value) -> bool>),
    /// Anything, if no literal or predicate branch matched.
    Default,
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Guard::Predicate(_) => f.write_str("Predicate"),
            Guard::Default => f.write_str("Default"),
        }
    }
}

/// One branch of a conditional. A branch without a template renders nothing.
#[derive(Debug, Clone)]
pub struct Branch {
    pub guard: Guard,
    pub template: Option<TemplateRef>,
}

impl Branch {
    pub fn value(value: impl Into<Value>, template: impl Into<TemplateRef>) -> Self {
        Self {
            guard: Guard::Value(value.into()),
            template: Some(template.into()),
        }
    }

    pub fn when(predicate: impl Fn(&Value) -> bool + 'static, template: impl Into<TemplateRef>) -> Self {
        Self {
            guard: Guard::Predicate(Rc::new(predicate)),
            template: Some(template.into()),
        }
    }

    pub fn default(template: impl Into<TemplateRef>) -> Self {
        Self {
            guard: Guard::Default,
            template: Some(template.into()),
        }
    }

    /// A branch that matches but renders nothing.
    pub fn empty(guard: Guard) -> Self {
        Self { guard, template: None }
    }
}

/// Index of the branch selected by `value`.
pub(crate) fn select(branches: &[Branch], value: Option<&Value>) -> Option<usize> {
    let subject = value.unwrap_or(&Value::Null);
    let mut fallback = None;
    for (index, branch) in branches.iter().enumerate() {
        match &branch.guard {
            Guard::Value(literal) if literal == subject => return Some(index),
            Guard::Predicate(predicate) if predicate(subject) => return Some(index),
            Guard::Default if fallback.is_none() => fallback = Some(index),
            _ => {}
        }
    }
    fallback
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Cached {
    context: ContextId,
    instance: Option<InstanceId>,
}

#[derive(Debug)]
pub(crate) struct BranchState {
    active: Option<usize>,
    cached: Vec<Option<Cached>>,
}

impl BranchState {
    pub(crate) fn new(branches: usize) -> Self {
        Self {
            active: None,
            cached: vec![None; branches],
        }
    }

    pub(crate) fn active(&self) -> Option<usize> {
        self.active
    }

    pub(crate) fn contexts(&self) -> Vec<Option<ContextId>> {
        self.cached.iter().map(|c| c.map(|c| c.context)).collect()
    }

    fn active_instance(&self) -> Option<InstanceId> {
        self.active.and_then(|i| self.cached.get(i).copied().flatten()).and_then(|c| c.instance)
    }
}

fn state(rt: &mut Runtime, id: EffectId) -> Result<Option<&mut BranchState>> {
    Ok(match &mut rt.effect_mut(id)?.data {
        EffectData::Branches(state) => Some(state),
        _ => None,
    })
}

// =============================================================================
// Lifecycle
// =============================================================================

pub(super) fn render(rt: &mut Runtime, id: EffectId, branches: &[Branch], value: Option<&Value>) -> Result<()> {
    let next = select(branches, value);
    let (previous, leaving) = match state(rt, id)? {
        Some(state) if state.active != next => (state.active, state.active_instance()),
        _ => return Ok(()),
    };
    let (ctx, placeholder, mounted) = {
        let effect = rt.effect_mut(id)?;
        (effect.context, effect.node, effect.flags.contains(Lifecycle::MOUNTED))
    };
    tracing::debug!(effect = %id, from = ?previous, to = ?next, "switching branch");

    if let Some(instance) = leaving {
        rt.unmount_instance(instance)?;
    }
    if let Some(state) = state(rt, id)? {
        state.active = next;
    }
    let Some(index) = next else {
        return Ok(());
    };

    let cached = state(rt, id)?.and_then(|s| s.cached.get(index).copied().flatten());
    let instance = match cached {
        Some(cached) => cached.instance,
        None => {
            let context = rt.derive(ctx, Bindings::new())?;
            let template = match &branches[index].template {
                Some(reference) => rt.resolve_template(context, reference, "ConditionalEffect")?,
                None => None,
            };
            let instance = match template {
                Some(template) => Some(rt.instantiate(&template, context)?),
                None => None,
            };
            if let Some(slot) = state(rt, id)?.and_then(|s| s.cached.get_mut(index)) {
                *slot = Some(Cached { context, instance });
            }
            instance
        }
    };

    if mounted {
        if let Some(instance) = instance {
            rt.mount_instance(instance, placeholder)?;
        }
    }
    Ok(())
}

pub(super) fn mount(rt: &mut Runtime, id: EffectId, placeholder: NodeId) -> Result<()> {
    if let Some(instance) = state(rt, id)?.and_then(|s| s.active_instance()) {
        rt.mount_instance(instance, placeholder)?;
    }
    Ok(())
}

pub(super) fn unmount(rt: &mut Runtime, id: EffectId) -> Result<()> {
    if let Some(instance) = state(rt, id)?.and_then(|s| s.active_instance()) {
        rt.unmount_instance(instance)?;
    }
    Ok(())
}

pub(super) fn dispose(rt: &mut Runtime, id: EffectId) -> Result<()> {
    let cached: Vec<Cached> = match state(rt, id)? {
        Some(state) => {
            state.active = None;
            state.cached.iter_mut().filter_map(Option::take).collect()
        }
        None => return Ok(()),
    };
    for branch in cached {
        if let Some(instance) = branch.instance {
            rt.dispose_instance(instance)?;
        }
        rt.release(branch.context);
    }
    Ok(())
}
