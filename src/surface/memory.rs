//! MemoryDom - in-memory output surface.
//!
//! A small DOM-like tree with a call counter per operation. Clones share the
//! same tree, so a test can hand one clone to the runtime and inspect the
//! other:
//!
//! ```ignore
//! let dom = MemoryDom::new();
//! let root = dom.create_root("main");
//! let mut rt = Runtime::new(dom.clone());
//! // ... render into `root` ...
//! assert_eq!(dom.html(root), "<main><p>n=0</p></main>");
//! assert_eq!(dom.calls().text, 1);
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use indexmap::IndexMap;

use super::Effector;
use crate::types::NodeId;

/// Number of calls made to each adapter operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calls {
    pub text: usize,
    pub attribute: usize,
    pub style: usize,
    pub node: usize,
    pub placeholder: usize,
    pub append: usize,
    pub unmount: usize,
    pub release: usize,
}

impl Calls {
    pub fn total(&self) -> usize {
        self.text
            + self.attribute
            + self.style
            + self.node
            + self.placeholder
            + self.append
            + self.unmount
            + self.release
    }
}

#[derive(Debug)]
enum Kind {
    Element {
        name: String,
        attributes: IndexMap<String, String>,
        styles: IndexMap<String, String>,
    },
    Text(String),
    Placeholder(String),
}

#[derive(Debug)]
struct Node {
    kind: Kind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    released: bool,
}

#[derive(Debug, Default)]
struct Tree {
    nodes: Vec<Node>,
    positions: HashMap<(NodeId, usize), NodeId>,
    calls: Calls,
}

impl Tree {
    fn create(&mut self, kind: Kind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
            released: false,
        });
        id
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    fn is_placeholder(&self, id: NodeId) -> bool {
        matches!(self.node(id).map(|n| &n.kind), Some(Kind::Placeholder(_)))
    }

    fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.node_mut(id).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|c| *c != id);
        }
    }

    /// Insert before a placeholder, or append to an element.
    fn attach(&mut self, parent: NodeId, child: NodeId) {
        if parent == child {
            return;
        }
        if self.is_placeholder(parent) {
            let Some(grandparent) = self.node(parent).and_then(|n| n.parent) else {
                // A detached marker has no siblings to insert between.
                self.detach(child);
                return;
            };
            self.detach(child);
            let Some(gp) = self.node_mut(grandparent) else {
                return;
            };
            let index = gp.children.iter().position(|c| *c == parent).unwrap_or(gp.children.len());
            gp.children.insert(index, child);
            if let Some(c) = self.node_mut(child) {
                c.parent = Some(grandparent);
            }
        } else {
            self.detach(child);
            if let Some(p) = self.node_mut(parent) {
                p.children.push(child);
            }
            if let Some(c) = self.node_mut(child) {
                c.parent = Some(parent);
            }
        }
    }

    /// Node registered at `(parent, position)` if it still matches `accept`.
    fn reuse(&self, parent: NodeId, position: usize, accept: impl Fn(&Kind) -> bool) -> Option<NodeId> {
        let id = *self.positions.get(&(parent, position))?;
        let node = self.node(id)?;
        (!node.released && accept(&node.kind)).then_some(id)
    }

    fn ensure(&mut self, parent: Option<NodeId>, position: usize, kind: Kind) -> NodeId {
        let id = self.create(kind);
        if let Some(parent) = parent {
            self.attach(parent, id);
            self.positions.insert((parent, position), id);
        }
        id
    }

    fn write(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.kind {
            Kind::Text(text) => out.push_str(text),
            Kind::Placeholder(_) => {}
            Kind::Element {
                name,
                attributes,
                styles,
            } => {
                let _ = write!(out, "<{name}");
                for (key, value) in attributes {
                    let _ = write!(out, " {key}=\"{value}\"");
                }
                if !styles.is_empty() {
                    out.push_str(" style=\"");
                    for (i, (key, value)) in styles.iter().enumerate() {
                        if i > 0 {
                            out.push(' ');
                        }
                        let _ = write!(out, "{key}: {value};");
                    }
                    out.push('"');
                }
                out.push('>');
                for child in &node.children {
                    self.write(*child, out);
                }
                let _ = write!(out, "</{name}>");
            }
        }
    }
}

/// In-memory [`Effector`] with call counters and an HTML-ish serializer.
#[derive(Debug, Clone, Default)]
pub struct MemoryDom {
    tree: Rc<RefCell<Tree>>,
}

impl MemoryDom {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached element to render into. Not counted as a call.
    pub fn create_root(&self, name: &str) -> NodeId {
        self.tree.borrow_mut().create(Kind::Element {
            name: name.to_string(),
            attributes: IndexMap::new(),
            styles: IndexMap::new(),
        })
    }

    pub fn calls(&self) -> Calls {
        self.tree.borrow().calls
    }

    pub fn reset_calls(&self) {
        self.tree.borrow_mut().calls = Calls::default();
    }

    /// Serialize a subtree. Placeholders are omitted.
    pub fn html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.tree.borrow().write(node, &mut out);
        out
    }

    /// Serialize the children of `node` only.
    pub fn inner_html(&self, node: NodeId) -> String {
        let tree = self.tree.borrow();
        let mut out = String::new();
        if let Some(n) = tree.node(node) {
            for child in &n.children {
                tree.write(*child, &mut out);
            }
        }
        out
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.tree.borrow().node(node)?.parent
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.tree
            .borrow()
            .node(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn is_attached(&self, node: NodeId) -> bool {
        self.parent(node).is_some()
    }

    pub fn is_released(&self, node: NodeId) -> bool {
        self.tree.borrow().node(node).is_some_and(|n| n.released)
    }

    pub fn text(&self, node: NodeId) -> Option<String> {
        match &self.tree.borrow().node(node)?.kind {
            Kind::Text(text) => Some(text.clone()),
            _ => None,
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        match &self.tree.borrow().node(node)?.kind {
            Kind::Element { attributes, .. } => attributes.get(name).cloned(),
            _ => None,
        }
    }

    pub fn style(&self, node: NodeId, property: &str) -> Option<String> {
        match &self.tree.borrow().node(node)?.kind {
            Kind::Element { styles, .. } => styles.get(property).cloned(),
            _ => None,
        }
    }

    /// Total number of nodes ever created.
    pub fn node_count(&self) -> usize {
        self.tree.borrow().nodes.len()
    }

    /// Nodes created and not yet released.
    pub fn live_count(&self) -> usize {
        self.tree.borrow().nodes.iter().filter(|n| !n.released).count()
    }
}

impl Effector for MemoryDom {
    fn ensure_text(&mut self, parent: Option<NodeId>, position: usize, text: &str) -> NodeId {
        let mut tree = self.tree.borrow_mut();
        tree.calls.text += 1;
        if let Some(id) = parent.and_then(|p| tree.reuse(p, position, |k| matches!(k, Kind::Text(_)))) {
            if let Some(Node {
                kind: Kind::Text(current),
                ..
            }) = tree.node_mut(id)
            {
                if current != text {
                    *current = text.to_string();
                }
            }
            return id;
        }
        tree.ensure(parent, position, Kind::Text(text.to_string()))
    }

    fn ensure_attribute(&mut self, node: NodeId, namespace: Option<&str>, name: &str, value: Option<&str>) {
        let mut tree = self.tree.borrow_mut();
        tree.calls.attribute += 1;
        let key = match namespace {
            Some(ns) => format!("{ns}:{name}"),
            None => name.to_string(),
        };
        if let Some(Node {
            kind: Kind::Element { attributes, .. },
            ..
        }) = tree.node_mut(node)
        {
            match value {
                Some(value) => {
                    attributes.insert(key, value.to_string());
                }
                None => {
                    attributes.shift_remove(&key);
                }
            }
        }
    }

    fn ensure_style(&mut self, node: NodeId, property: &str, value: Option<&str>) {
        let mut tree = self.tree.borrow_mut();
        tree.calls.style += 1;
        if let Some(Node {
            kind: Kind::Element { styles, .. },
            ..
        }) = tree.node_mut(node)
        {
            match value {
                Some(value) => {
                    styles.insert(property.to_string(), value.to_string());
                }
                None => {
                    styles.shift_remove(property);
                }
            }
        }
    }

    fn ensure_node(&mut self, parent: Option<NodeId>, position: usize, namespace: Option<&str>, name: &str) -> NodeId {
        let mut tree = self.tree.borrow_mut();
        tree.calls.node += 1;
        let full = match namespace {
            Some(ns) => format!("{ns}:{name}"),
            None => name.to_string(),
        };
        let matches = |k: &Kind| matches!(k, Kind::Element { name, .. } if *name == full);
        if let Some(id) = parent.and_then(|p| tree.reuse(p, position, matches)) {
            return id;
        }
        tree.ensure(
            parent,
            position,
            Kind::Element {
                name: full,
                attributes: IndexMap::new(),
                styles: IndexMap::new(),
            },
        )
    }

    fn ensure_placeholder(&mut self, parent: Option<NodeId>, position: usize, label: &str) -> NodeId {
        let mut tree = self.tree.borrow_mut();
        tree.calls.placeholder += 1;
        if let Some(id) = parent.and_then(|p| tree.reuse(p, position, |k| matches!(k, Kind::Placeholder(_)))) {
            return id;
        }
        tree.ensure(parent, position, Kind::Placeholder(label.to_string()))
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) -> NodeId {
        let mut tree = self.tree.borrow_mut();
        tree.calls.append += 1;
        tree.attach(parent, child);
        child
    }

    fn unmount(&mut self, node: NodeId) {
        let mut tree = self.tree.borrow_mut();
        tree.calls.unmount += 1;
        tree.detach(node);
    }

    fn release(&mut self, node: NodeId) {
        let mut tree = self.tree.borrow_mut();
        tree.calls.release += 1;
        tree.detach(node);
        if let Some(n) = tree.node_mut(node) {
            n.released = true;
        }
        tree.positions.retain(|_, id| *id != node);
    }
}
