//! Compiler - builds effects and compiles VNode trees into templates.
//!
//! The compiler owns a clone of the runtime's [`SlotAllocator`], so every
//! selection and effect it creates gets an id that is unique for the
//! allocator's lifetime.
//!
//! ```ignore
//! let c = Compiler::for_runtime(&rt);
//! let count = c.cell("count", 0);
//!
//! let counter = c.compile(
//!     "counter",
//!     element("p").child(c.format(&count, |v| format!("n={v}"))),
//! );
//! let handle = rt.render_with(&counter, root, Bindings::new().cell(&count, 0))?;
//! ```

use std::rc::Rc;

use crate::cells::{Cell, Slot, SlotAllocator};
use crate::derive::{Application, ArgShape, Argument, Extraction, Injection, Selection};
use crate::effects::{Branch, EffectDef, EffectKind, Format, TemplateRef};
use crate::engine::Runtime;
use crate::types::Value;

use super::vnode::{Element, VNode};
use super::{SkeletonKind, SkeletonNode, Template};

#[derive(Debug, Clone, Default)]
pub struct Compiler {
    alloc: SlotAllocator,
}

impl Compiler {
    pub fn new(alloc: SlotAllocator) -> Self {
        Self { alloc }
    }

    /// A compiler sharing the runtime's allocator.
    pub fn for_runtime(rt: &Runtime) -> Self {
        Self::new(rt.allocator().clone())
    }

    pub fn allocator(&self) -> &SlotAllocator {
        &self.alloc
    }

    // =========================================================================
    // Cells and selections
    // =========================================================================

    pub fn slot(&self) -> Slot {
        self.alloc.slot()
    }

    pub fn cell(&self, name: &str, default: impl Into<Value>) -> Cell {
        self.alloc.cell(name, default)
    }

    pub fn argument(&self, name: &str, default: impl Into<Value>) -> Argument {
        Argument::new(self.cell(name, default))
    }

    /// `transform(input)`, stored at a fresh slot.
    pub fn apply(
        &self,
        input: impl Into<Selection>,
        transform: impl Fn(Option<&Value>) -> Value + 'static,
    ) -> Selection {
        Selection::from(Application::new(self.slot(), input.into(), Rc::new(transform)))
    }

    /// Several selections as one list.
    pub fn extract(&self, items: impl IntoIterator<Item = Selection>) -> Selection {
        Selection::from(Extraction::List {
            slot: self.slot(),
            items: items.into_iter().collect(),
        })
    }

    /// Several selections as one map.
    pub fn record<'a>(&self, fields: impl IntoIterator<Item = (&'a str, Selection)>) -> Selection {
        Selection::from(Extraction::Record {
            slot: self.slot(),
            fields: fields.into_iter().map(|(k, s)| (Rc::from(k), s)).collect(),
        })
    }

    // =========================================================================
    // Effects
    // =========================================================================

    fn effect(&self, kind: EffectKind) -> Rc<EffectDef> {
        EffectDef::new(self.alloc.allocate(), kind)
    }

    /// Text content showing the input as is.
    pub fn text(&self, input: impl Into<Selection>) -> Rc<EffectDef> {
        self.effect(EffectKind::Formatting {
            input: input.into(),
            format: None,
        })
    }

    /// Text content through a formatter.
    pub fn format(&self, input: impl Into<Selection>, format: impl Fn(&Value) -> String + 'static) -> Rc<EffectDef> {
        self.effect(EffectKind::Formatting {
            input: input.into(),
            format: Some(Rc::new(format) as Format),
        })
    }

    /// Attribute bound to the input. The name follows [`attribute_name`](super::attribute_name).
    pub fn attribute(&self, name: &str, input: impl Into<Selection>) -> Rc<EffectDef> {
        let (namespace, name) = super::attribute_name(name);
        self.effect(EffectKind::Attribute {
            input: input.into(),
            namespace,
            name,
            format: None,
        })
    }

    pub fn attribute_with(
        &self,
        name: &str,
        input: impl Into<Selection>,
        format: impl Fn(&Value) -> String + 'static,
    ) -> Rc<EffectDef> {
        let (namespace, name) = super::attribute_name(name);
        self.effect(EffectKind::Attribute {
            input: input.into(),
            namespace,
            name,
            format: Some(Rc::new(format)),
        })
    }

    /// Style property bound to the input.
    pub fn style(&self, property: &str, input: impl Into<Selection>) -> Rc<EffectDef> {
        self.effect(EffectKind::Style {
            input: input.into(),
            property: Rc::from(property),
            format: None,
        })
    }

    pub fn style_with(
        &self,
        property: &str,
        input: impl Into<Selection>,
        format: impl Fn(&Value) -> String + 'static,
    ) -> Rc<EffectDef> {
        self.effect(EffectKind::Style {
            input: input.into(),
            property: Rc::from(property),
            format: Some(Rc::new(format)),
        })
    }

    /// Conditional content.
    pub fn choose(&self, input: impl Into<Selection>, branches: Vec<Branch>) -> Rc<EffectDef> {
        self.effect(EffectKind::Conditional {
            input: input.into(),
            branches,
        })
    }

    /// One `template` instance per item of the input, with the item bound
    /// to `target`.
    pub fn map_items(
        &self,
        input: impl Into<Selection>,
        target: &Cell,
        template: impl Into<TemplateRef>,
    ) -> Rc<EffectDef> {
        self.effect(EffectKind::Mapping {
            input: input.into(),
            template: template.into(),
            target: target.clone(),
        })
    }

    /// A sub-template fed with `input`.
    pub fn include(&self, template: impl Into<TemplateRef>, input: Option<Selection>) -> Rc<EffectDef> {
        self.effect(EffectKind::Template {
            input,
            template: template.into(),
        })
    }

    /// A sub-template chosen by name from a selection.
    pub fn dynamic(&self, name: impl Into<Selection>, input: Option<Selection>) -> Rc<EffectDef> {
        self.include(TemplateRef::Selected(name.into()), input)
    }

    /// A sub-template in an isolated scope seeing only `shared`.
    pub fn isolate(&self, shared: Vec<Cell>, template: impl Into<TemplateRef>) -> Rc<EffectDef> {
        self.effect(EffectKind::Application {
            shared,
            template: template.into(),
        })
    }

    // =========================================================================
    // Templates
    // =========================================================================

    /// A template without parameters.
    pub fn compile(&self, name: &str, body: impl Into<VNode>) -> Rc<Template> {
        Rc::new(build(name, None, body.into()))
    }

    /// A named component: parameters are injected into an isolated scope.
    pub fn component(&self, name: &str, args: ArgShape, body: impl Into<VNode>) -> Rc<Template> {
        let injection = Injection::new(self.slot(), args, true);
        Rc::new(build(name, Some(injection), body.into()))
    }

    /// An inline fragment: parameters are injected into a scope that still
    /// sees the caller's cells.
    pub fn fragment(&self, name: &str, args: ArgShape, body: impl Into<VNode>) -> Rc<Template> {
        let injection = Injection::new(self.slot(), args, false);
        Rc::new(build(name, Some(injection), body.into()))
    }
}

// =============================================================================
// Tree walk
// =============================================================================

#[derive(Default)]
struct Output {
    effects: Vec<(Vec<usize>, Rc<EffectDef>)>,
    refs: Vec<(Rc<str>, Vec<usize>)>,
}

fn build(name: &str, injection: Option<Injection>, body: VNode) -> Template {
    let mut out = Output::default();
    let mut path = Vec::new();
    let (roots, stray) = split(vec![body]);
    for effect in stray {
        tracing::warn!(template = name, effect = effect.kind.name(), "effect needs an element, dropped");
    }
    let skeleton = nodes(roots, &mut path, &mut out);
    tracing::debug!(
        template = name,
        roots = skeleton.len(),
        effects = out.effects.len(),
        refs = out.refs.len(),
        "compiled template"
    );
    Template {
        name: Rc::from(name),
        injection,
        skeleton,
        effects: out.effects,
        refs: out.refs,
    }
}

/// Flatten fragments and pull out element-level effects.
fn split(children: Vec<VNode>) -> (Vec<VNode>, Vec<Rc<EffectDef>>) {
    let mut nodes = Vec::new();
    let mut decorations = Vec::new();
    for child in children {
        match child {
            VNode::Fragment(inner) => {
                let (n, d) = split(inner);
                nodes.extend(n);
                decorations.extend(d);
            }
            VNode::Effect(effect) if !effect.kind.is_content() => decorations.push(effect),
            other => nodes.push(other),
        }
    }
    (nodes, decorations)
}

fn nodes(children: Vec<VNode>, path: &mut Vec<usize>, out: &mut Output) -> Vec<SkeletonNode> {
    let mut skeleton = Vec::with_capacity(children.len());
    for (index, child) in children.into_iter().enumerate() {
        path.push(index);
        skeleton.push(node(child, path, out));
        path.pop();
    }
    skeleton
}

fn node(vnode: VNode, path: &mut Vec<usize>, out: &mut Output) -> SkeletonNode {
    match vnode {
        VNode::Element(Element {
            namespace,
            name,
            attributes,
            effects,
            children,
            reference,
        }) => {
            if let Some(reference) = reference {
                out.refs.push((reference, path.clone()));
            }
            let (children, decorations) = split(children);
            for effect in effects.into_iter().chain(decorations) {
                out.effects.push((path.clone(), effect));
            }
            SkeletonNode {
                kind: SkeletonKind::Element {
                    namespace,
                    name,
                    attributes,
                },
                children: nodes(children, path, out),
            }
        }
        VNode::Text(content) => SkeletonNode {
            kind: SkeletonKind::Text(content),
            children: Vec::new(),
        },
        VNode::Effect(effect) => {
            let label = Rc::from(effect.kind.name());
            out.effects.push((path.clone(), effect));
            SkeletonNode {
                kind: SkeletonKind::Placeholder(label),
                children: Vec::new(),
            }
        }
        // `split` never leaves fragments behind.
        VNode::Fragment(_) => SkeletonNode {
            kind: SkeletonKind::Placeholder(Rc::from("fragment")),
            children: Vec::new(),
        },
    }
}
