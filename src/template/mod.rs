//! Templates - compiled, reusable output skeletons with effect attachments.
//!
//! A declarative [`VNode`] tree is compiled once by a [`Compiler`] into a
//! [`Template`]:
//!
//! ```text
//! h("ul").child(map_items)          skeleton      ul
//!                                                 └─ <placeholder>
//!                                   effects       [0, 0] MappingEffect
//!                                   refs          -
//! ```
//!
//! Paths are child indices from a skeleton root (`[root, child, ...]`).
//! Instantiating a template materializes the skeleton through the
//! [`Effector`](crate::surface::Effector), resolves every path to a node,
//! registers refs, then creates, applies and binds each effect. Instances
//! are independent of each other.

mod compile;
mod instance;
mod registry;
mod vnode;

pub use compile::Compiler;
pub use instance::TemplateInstance;
pub use registry::TemplateRegistry;
pub use vnode::{attribute_name, element, fragment, text, Attribute, Element, VNode};

use std::rc::Rc;

use crate::derive::Injection;
use crate::effects::EffectDef;

/// What a skeleton node is.
#[derive(Debug, Clone, PartialEq)]
pub enum SkeletonKind {
    Element {
        namespace: Option<Rc<str>>,
        name: Rc<str>,
        attributes: Vec<Attribute>,
    },
    Text(Rc<str>),
    /// Marker where a content effect renders.
    Placeholder(Rc<str>),
}

/// Static part of a template.
#[derive(Debug, Clone, PartialEq)]
pub struct SkeletonNode {
    pub kind: SkeletonKind,
    pub children: Vec<SkeletonNode>,
}

/// A compiled template.
#[derive(Debug)]
pub struct Template {
    pub(crate) name: Rc<str>,
    pub(crate) injection: Option<Injection>,
    pub(crate) skeleton: Vec<SkeletonNode>,
    pub(crate) effects: Vec<(Vec<usize>, Rc<EffectDef>)>,
    pub(crate) refs: Vec<(Rc<str>, Vec<usize>)>,
}

impl Template {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn injection(&self) -> Option<&Injection> {
        self.injection.as_ref()
    }

    pub fn skeleton(&self) -> &[SkeletonNode] {
        &self.skeleton
    }

    /// `(path, effect)` pairs in attachment order.
    pub fn effects(&self) -> &[(Vec<usize>, Rc<EffectDef>)] {
        &self.effects
    }

    pub fn refs(&self) -> &[(Rc<str>, Vec<usize>)] {
        &self.refs
    }
}
