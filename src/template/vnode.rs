//! VNode - the declarative tree a template is compiled from.
//!
//! ```ignore
//! let view = element("label")
//!     .attr("_", "field")               // class="field"
//!     .attr("dataKind", "name")         // data-kind="name"
//!     .bind(compiler.attribute("title", &hint))
//!     .child(text("Name: "))
//!     .child(compiler.text(&name))
//!     .named("label");
//! ```

use std::rc::Rc;

use crate::effects::EffectDef;

/// A static attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub namespace: Option<Rc<str>>,
    pub name: Rc<str>,
    pub value: Rc<str>,
}

/// Split and normalize an attribute name.
///
/// - `ns:name` splits off a namespace
/// - a lone `_` means `class`
/// - camelCase becomes kebab-case (`ariaLabel` → `aria-label`)
pub fn attribute_name(raw: &str) -> (Option<Rc<str>>, Rc<str>) {
    let (namespace, local) = match raw.split_once(':') {
        Some((ns, local)) if !ns.is_empty() && !local.is_empty() => (Some(Rc::from(ns)), local),
        _ => (None, raw),
    };
    if local == "_" {
        return (namespace, Rc::from("class"));
    }
    let mut name = String::with_capacity(local.len() + 4);
    for (i, ch) in local.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                name.push('-');
            }
            name.push(ch.to_ascii_lowercase());
        } else {
            name.push(ch);
        }
    }
    (namespace, Rc::from(name))
}

/// An element under construction.
#[derive(Debug, Clone)]
pub struct Element {
    pub(crate) namespace: Option<Rc<str>>,
    pub(crate) name: Rc<str>,
    pub(crate) attributes: Vec<Attribute>,
    pub(crate) effects: Vec<Rc<EffectDef>>,
    pub(crate) children: Vec<VNode>,
    pub(crate) reference: Option<Rc<str>>,
}

impl Element {
    /// Add a static attribute.
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        let (namespace, name) = attribute_name(name);
        self.attributes.push(Attribute {
            namespace,
            name,
            value: Rc::from(value),
        });
        self
    }

    /// Attach an attribute or style effect to this element.
    pub fn bind(mut self, effect: Rc<EffectDef>) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn child(mut self, child: impl Into<VNode>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<VNode>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    /// Add a static text child.
    pub fn text(self, content: &str) -> Self {
        self.child(text(content))
    }

    /// Expose this element's node in the instance's refs under `name`.
    pub fn named(mut self, name: &str) -> Self {
        self.reference = Some(Rc::from(name));
        self
    }
}

/// Declarative node.
#[derive(Debug, Clone)]
pub enum VNode {
    Element(Element),
    Text(Rc<str>),
    /// A content effect, rendered at a placeholder.
    Effect(Rc<EffectDef>),
    /// Children spliced into the parent.
    Fragment(Vec<VNode>),
}

impl From<Element> for VNode {
    fn from(element: Element) -> Self {
        VNode::Element(element)
    }
}

impl From<Rc<EffectDef>> for VNode {
    fn from(effect: Rc<EffectDef>) -> Self {
        VNode::Effect(effect)
    }
}

impl From<&str> for VNode {
    fn from(content: &str) -> Self {
        text(content)
    }
}

/// Start an element. `ns:tag` sets a namespace.
pub fn element(tag: &str) -> Element {
    let (namespace, name) = match tag.split_once(':') {
        Some((ns, name)) if !ns.is_empty() && !name.is_empty() => (Some(Rc::from(ns)), Rc::from(name)),
        _ => (None, Rc::from(tag)),
    };
    Element {
        namespace,
        name,
        attributes: Vec::new(),
        effects: Vec::new(),
        children: Vec::new(),
        reference: None,
    }
}

pub fn text(content: &str) -> VNode {
    VNode::Text(Rc::from(content))
}

pub fn fragment<I>(children: I) -> VNode
where
    I: IntoIterator,
    I::Item: Into<VNode>,
{
    VNode::Fragment(children.into_iter().map(Into::into).collect())
}
