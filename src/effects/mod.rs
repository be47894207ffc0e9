//! Effects - nodes that project derived values onto the output surface.
//!
//! An [`EffectDef`] is compiled once per template and shared by every
//! instance. Each instance gets a live [`EffectState`] in the runtime arena,
//! attached to one output node: the element itself for attribute and style
//! effects, a placeholder marker for content effects.
//!
//! # Lifecycle
//!
//! ```text
//! apply ──► bind ──► mount          (first use)
//! unbind ──► unmount ──► dispose    (teardown)
//! ```
//!
//! - `apply` evaluates the input and renders the initial output.
//! - `bind` subscribes the effect to every cell its input reads.
//! - `mount`/`unmount` attach and detach owned output. Both are idempotent:
//!   parents may mount a subtree that is already mounted.
//! - `dispose` releases owned child contexts, instances and nodes.
//!
//! Updates enter through `unify(current, previous)`, which does nothing at
//! all (no output call) when the two values are the same.

mod conditional;
mod content;
mod mapping;
mod nested;

pub use conditional::{Branch, Guard};

use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;

use crate::cells::{Cell, SlotId, Subscriber, Subscription};
use crate::context::ContextId;
use crate::derive::Selection;
use crate::engine::{EffectId, InstanceId, ObservableId, Runtime};
use crate::error::{Error, Result};
use crate::template::Template;
use crate::types::{Flow, Key, NodeId, Value};

use conditional::BranchState;
use mapping::MappingState;
use nested::NestedState;

/// Renders a value as text.
pub type Format = Rc<dyn Fn(&Value) -> String>;

// =============================================================================
// Definitions
// =============================================================================

/// How a content effect finds the template it instantiates.
#[derive(Debug, Clone)]
pub enum TemplateRef {
    /// A template known at compile time.
    Compiled(Rc<Template>),
    /// A template looked up in the runtime's registry when applied.
    Named(Rc<str>),
    /// A registry name read from a selection; changing it swaps templates.
    Selected(Selection),
}

impl From<Rc<Template>> for TemplateRef {
    fn from(template: Rc<Template>) -> Self {
        TemplateRef::Compiled(template)
    }
}

impl From<&Rc<Template>> for TemplateRef {
    fn from(template: &Rc<Template>) -> Self {
        TemplateRef::Compiled(Rc::clone(template))
    }
}

impl From<&str> for TemplateRef {
    fn from(name: &str) -> Self {
        TemplateRef::Named(Rc::from(name))
    }
}

pub enum EffectKind {
    /// Text content.
    Formatting { input: Selection, format: Option<Format> },
    /// One attribute of the element the effect is attached to.
    Attribute {
        input: Selection,
        namespace: Option<Rc<str>>,
        name: Rc<str>,
        format: Option<Format>,
    },
    /// One style property of the element the effect is attached to.
    Style {
        input: Selection,
        property: Rc<str>,
        format: Option<Format>,
    },
    /// A sub-template, fed with `input` as its `INPUT`.
    Template {
        input: Option<Selection>,
        template: TemplateRef,
    },
    /// A sub-template in an isolated scope that only sees `shared` cells.
    Application { shared: Vec<Cell>, template: TemplateRef },
    /// One of several branches, picked by the input value.
    Conditional { input: Selection, branches: Vec<Branch> },
    /// One template instance per item of an atom, list or map.
    Mapping {
        input: Selection,
        template: TemplateRef,
        target: Cell,
    },
}

impl EffectKind {
    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::Formatting { .. } => "FormattingEffect",
            EffectKind::Attribute { .. } => "AttributeEffect",
            EffectKind::Style { .. } => "StyleEffect",
            EffectKind::Template { .. } => "TemplateEffect",
            EffectKind::Application { .. } => "ApplicationEffect",
            EffectKind::Conditional { .. } => "ConditionalEffect",
            EffectKind::Mapping { .. } => "MappingEffect",
        }
    }

    /// Whether the effect renders content at a placeholder (as opposed to
    /// decorating an element).
    pub fn is_content(&self) -> bool {
        !matches!(self, EffectKind::Attribute { .. } | EffectKind::Style { .. })
    }

    pub fn input(&self) -> Option<&Selection> {
        match self {
            EffectKind::Formatting { input, .. }
            | EffectKind::Attribute { input, .. }
            | EffectKind::Style { input, .. }
            | EffectKind::Conditional { input, .. }
            | EffectKind::Mapping { input, .. } => Some(input),
            EffectKind::Template { input, .. } => input.as_ref(),
            EffectKind::Application { .. } => None,
        }
    }

    /// Cells the effect subscribes to.
    pub fn sources(&self) -> Vec<SlotId> {
        let mut out = self.input().map(Selection::sources).unwrap_or_default();
        if let EffectKind::Template {
            template: TemplateRef::Selected(selection),
            ..
        } = self
        {
            for id in selection.sources() {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
        }
        out
    }
}

impl fmt::Debug for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.name()).field("input", &self.input()).finish_non_exhaustive()
    }
}

/// A compiled effect: a slot id plus what the effect does.
#[derive(Debug)]
pub struct EffectDef {
    pub id: SlotId,
    pub kind: EffectKind,
}

impl EffectDef {
    pub fn new(id: SlotId, kind: EffectKind) -> Rc<Self> {
        Rc::new(Self { id, kind })
    }
}

// =============================================================================
// Live state
// =============================================================================

bitflags! {
    /// Lifecycle stages an effect went through.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Lifecycle: u8 {
        const APPLIED  = 0b0001;
        const BOUND    = 0b0010;
        const MOUNTED  = 0b0100;
        const DISPOSED = 0b1000;
    }
}

pub(crate) enum EffectData {
    None,
    Text(Option<NodeId>),
    Nested(NestedState),
    Branches(BranchState),
    Items(MappingState),
}

/// A live effect.
pub struct EffectState {
    pub(crate) def: Rc<EffectDef>,
    pub(crate) context: ContextId,
    pub(crate) node: NodeId,
    pub(crate) flags: Lifecycle,
    pub(crate) value: Option<Value>,
    pub(crate) subscriptions: Vec<Subscription>,
    pub(crate) data: EffectData,
}

impl EffectState {
    pub fn def(&self) -> &Rc<EffectDef> {
        &self.def
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Node the effect is attached to.
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn flags(&self) -> Lifecycle {
        self.flags
    }

    pub fn is_mounted(&self) -> bool {
        self.flags.contains(Lifecycle::MOUNTED)
    }

    /// Last value the effect rendered.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

// =============================================================================
// Lifecycle driver
// =============================================================================

impl Runtime {
    pub fn effect(&self, id: EffectId) -> Option<&EffectState> {
        self.effects.get(id)
    }

    pub(crate) fn effect_mut(&mut self, id: EffectId) -> Result<&mut EffectState> {
        self.effects.get_mut(id).ok_or(Error::StaleEffect(id))
    }

    fn effect_parts(&self, id: EffectId) -> Result<(Rc<EffectDef>, ContextId, NodeId)> {
        let state = self.effects.get(id).ok_or(Error::StaleEffect(id))?;
        Ok((Rc::clone(&state.def), state.context, state.node))
    }

    fn is_effect_mounted(&self, id: EffectId) -> bool {
        self.effects.get(id).is_some_and(EffectState::is_mounted)
    }

    /// Create the live state of `def` in `ctx`, attached to `node`.
    pub(crate) fn create_effect(&mut self, def: Rc<EffectDef>, ctx: ContextId, node: NodeId) -> EffectId {
        let data = match &def.kind {
            EffectKind::Formatting { .. } => EffectData::Text(None),
            EffectKind::Attribute { .. } | EffectKind::Style { .. } => EffectData::None,
            EffectKind::Template { .. } | EffectKind::Application { .. } => EffectData::Nested(NestedState::default()),
            EffectKind::Conditional { branches, .. } => EffectData::Branches(BranchState::new(branches.len())),
            EffectKind::Mapping { .. } => EffectData::Items(MappingState::default()),
        };
        self.effects.insert(EffectState {
            def,
            context: ctx,
            node,
            flags: Lifecycle::empty(),
            value: None,
            subscriptions: Vec::new(),
            data,
        })
    }

    /// Evaluate the input and render the initial output.
    pub fn apply_effect(&mut self, id: EffectId) -> Result<()> {
        let (def, ctx, _) = self.effect_parts(id)?;
        if self.effect_mut(id)?.flags.contains(Lifecycle::APPLIED) {
            return Ok(());
        }
        match &def.kind {
            EffectKind::Template { .. } | EffectKind::Application { .. } => nested::apply(self, id, &def, ctx)?,
            kind => {
                let current = match kind.input() {
                    Some(input) => input.evaluate(self, ctx)?,
                    None => None,
                };
                self.render_effect(id, &def, current, None)?;
            }
        }
        self.effect_mut(id)?.flags.insert(Lifecycle::APPLIED);
        Ok(())
    }

    /// Subscribe to every cell the effect reads.
    pub fn bind_effect(&mut self, id: EffectId) -> Result<()> {
        let (def, ctx, _) = self.effect_parts(id)?;
        if self.effect_mut(id)?.flags.contains(Lifecycle::BOUND) {
            return Ok(());
        }
        let mut subscriptions = Vec::new();
        for slot in def.kind.sources() {
            subscriptions.push(self.subscribe(ctx, slot, Subscriber::Effect(id))?);
        }
        let state = self.effect_mut(id)?;
        state.subscriptions = subscriptions;
        state.flags.insert(Lifecycle::BOUND);
        Ok(())
    }

    /// Drop every subscription of the effect.
    pub fn unbind_effect(&mut self, id: EffectId) -> Result<()> {
        let state = self.effect_mut(id)?;
        let subscriptions = std::mem::take(&mut state.subscriptions);
        state.flags.remove(Lifecycle::BOUND);
        for subscription in subscriptions {
            self.unsub(subscription);
        }
        Ok(())
    }

    /// Rebind the effects under `ctx` that watch `observable`, now hidden
    /// by an own entry of `ctx`, and refresh them with the value they see.
    pub(crate) fn rebind_shadowed(&mut self, ctx: ContextId, observable: ObservableId) -> Result<Flow> {
        let affected: Vec<EffectId> = self
            .effects
            .iter()
            .filter(|(_, state)| {
                state.subscriptions.iter().any(|s| s.observable == observable)
                    && self.store.is_within(state.context, ctx)
            })
            .map(|(id, _)| id)
            .collect();
        if affected.is_empty() {
            return Ok(Flow::Unchanged);
        }
        tracing::debug!(context = %ctx, observable = %observable, effects = affected.len(), "rebinding shadowed effects");
        for id in affected {
            self.unbind_effect(id)?;
            self.bind_effect(id)?;
            self.refresh_effect(id)?;
        }
        Ok(Flow::Propagated)
    }

    /// Attach the effect's output. No-op if already mounted.
    pub fn mount_effect(&mut self, id: EffectId) -> Result<()> {
        let (def, _, node) = self.effect_parts(id)?;
        let flags = self.effect_mut(id)?.flags;
        if flags.intersects(Lifecycle::MOUNTED | Lifecycle::DISPOSED) {
            return Ok(());
        }
        // Flag first: children created while mounting must see a mounted parent.
        self.effect_mut(id)?.flags.insert(Lifecycle::MOUNTED);
        match &def.kind {
            EffectKind::Formatting { .. } => content::mount(self, id, node)?,
            EffectKind::Attribute { .. } | EffectKind::Style { .. } => {}
            EffectKind::Template { .. } | EffectKind::Application { .. } => nested::mount(self, id, node)?,
            EffectKind::Conditional { .. } => conditional::mount(self, id, node)?,
            EffectKind::Mapping { .. } => mapping::mount(self, id, node)?,
        }
        Ok(())
    }

    /// Detach the effect's output. No-op if not mounted.
    pub fn unmount_effect(&mut self, id: EffectId) -> Result<()> {
        let (def, _, _) = self.effect_parts(id)?;
        if !self.is_effect_mounted(id) {
            return Ok(());
        }
        match &def.kind {
            EffectKind::Formatting { .. } => content::unmount(self, id)?,
            EffectKind::Attribute { .. } | EffectKind::Style { .. } => {}
            EffectKind::Template { .. } | EffectKind::Application { .. } => nested::unmount(self, id)?,
            EffectKind::Conditional { .. } => conditional::unmount(self, id)?,
            EffectKind::Mapping { .. } => mapping::unmount(self, id)?,
        }
        self.effect_mut(id)?.flags.remove(Lifecycle::MOUNTED);
        Ok(())
    }

    /// Tear the effect down and release everything it owns.
    pub fn dispose_effect(&mut self, id: EffectId) -> Result<()> {
        if !self.effects.contains(id) {
            return Ok(());
        }
        self.unbind_effect(id)?;
        self.unmount_effect(id)?;
        let (def, _, _) = self.effect_parts(id)?;
        self.effect_mut(id)?.flags.insert(Lifecycle::DISPOSED);
        match &def.kind {
            EffectKind::Formatting { .. } => content::dispose(self, id)?,
            EffectKind::Attribute { .. } | EffectKind::Style { .. } => {}
            EffectKind::Template { .. } | EffectKind::Application { .. } => nested::dispose(self, id)?,
            EffectKind::Conditional { .. } => conditional::dispose(self, id)?,
            EffectKind::Mapping { .. } => mapping::dispose(self, id)?,
        }
        self.effects.remove(id);
        Ok(())
    }

    /// Update entry point. Does nothing when `current` and `previous` are
    /// the same value.
    pub fn unify(&mut self, id: EffectId, current: Option<Value>, previous: Option<Value>) -> Result<()> {
        if Value::same_opt(current.as_ref(), previous.as_ref()) {
            return Ok(());
        }
        let (def, _, _) = self.effect_parts(id)?;
        self.render_effect(id, &def, current, previous)
    }

    /// Re-read the effect's input after a notification.
    pub(crate) fn refresh_effect(&mut self, id: EffectId) -> Result<()> {
        let Some(state) = self.effects.get(id) else {
            tracing::debug!(effect = %id, "notification for a disposed effect");
            return Ok(());
        };
        if !state.flags.contains(Lifecycle::BOUND) {
            return Ok(());
        }
        let (def, ctx, previous) = (Rc::clone(&state.def), state.context, state.value.clone());
        match &def.kind {
            EffectKind::Template { .. } | EffectKind::Application { .. } => nested::refresh(self, id, &def, ctx),
            kind => {
                let current = match kind.input() {
                    Some(input) => input.evaluate(self, ctx)?,
                    None => None,
                };
                self.unify(id, current, previous)
            }
        }
    }

    fn render_effect(&mut self, id: EffectId, def: &EffectDef, current: Option<Value>, previous: Option<Value>) -> Result<()> {
        self.effect_mut(id)?.value = current.clone();
        match &def.kind {
            EffectKind::Formatting { format, .. } => content::render_text(self, id, format.as_ref(), current.as_ref()),
            EffectKind::Attribute {
                namespace,
                name,
                format,
                ..
            } => content::render_attribute(self, id, namespace.as_deref(), name, format.as_ref(), current.as_ref()),
            EffectKind::Style { property, format, .. } => {
                content::render_style(self, id, property, format.as_ref(), current.as_ref())
            }
            EffectKind::Template { .. } | EffectKind::Application { .. } => nested::update(self, id, current),
            EffectKind::Conditional { branches, .. } => conditional::render(self, id, branches, current.as_ref()),
            EffectKind::Mapping { template, target, .. } => {
                mapping::render(self, id, template, target, current.as_ref(), previous.as_ref())
            }
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Contexts of a conditional effect's cached branches, by branch index.
    pub fn branch_contexts(&self, id: EffectId) -> Vec<Option<ContextId>> {
        match self.effects.get(id).map(|s| &s.data) {
            Some(EffectData::Branches(state)) => state.contexts(),
            _ => Vec::new(),
        }
    }

    /// Index of a conditional effect's active branch.
    pub fn active_branch(&self, id: EffectId) -> Option<usize> {
        match self.effects.get(id).map(|s| &s.data) {
            Some(EffectData::Branches(state)) => state.active(),
            _ => None,
        }
    }

    /// Keys and contexts of a mapping effect's items, in output order.
    pub fn item_contexts(&self, id: EffectId) -> Vec<(Key, ContextId)> {
        match self.effects.get(id).map(|s| &s.data) {
            Some(EffectData::Items(state)) => state.contexts(),
            _ => Vec::new(),
        }
    }

    /// Template instance rendered by a template or application effect.
    pub fn nested_instance(&self, id: EffectId) -> Option<InstanceId> {
        match self.effects.get(id).map(|s| &s.data) {
            Some(EffectData::Nested(state)) => state.instance,
            _ => None,
        }
    }

    /// Resolve a template reference, reporting unknown names.
    pub(crate) fn resolve_template(
        &mut self,
        ctx: ContextId,
        reference: &TemplateRef,
        origin: &'static str,
    ) -> Result<Option<Rc<Template>>> {
        let name: Rc<str> = match reference {
            TemplateRef::Compiled(template) => return Ok(Some(Rc::clone(template))),
            TemplateRef::Named(name) => Rc::clone(name),
            TemplateRef::Selected(selection) => match selection.evaluate(self, ctx)? {
                None | Some(Value::Null) => return Ok(None),
                Some(Value::Str(name)) => name,
                Some(other) => {
                    self.on_error(origin, format!("template selector produced {other:?}"), ctx.to_string());
                    return Ok(None);
                }
            },
        };
        match self.templates.get(&name) {
            Some(template) => Ok(Some(template)),
            None => {
                self.on_error(origin, format!("could not find template '{name}'"), ctx.to_string());
                Ok(None)
            }
        }
    }
}
