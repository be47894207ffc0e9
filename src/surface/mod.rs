//! Output surface - the narrow interface effects write through.
//!
//! The engine never creates, moves or inspects output nodes itself. It asks
//! an [`Effector`] to do so and keeps the returned [`NodeId`]s. Placeholders
//! are marker nodes: appending a child to a placeholder inserts the child
//! right before the marker in the marker's parent, which is how content
//! effects keep their output at a fixed spot among siblings.
//!
//! [`MemoryDom`] is the in-memory reference implementation used by tests.

mod memory;

pub use memory::{Calls, MemoryDom};

use crate::types::NodeId;

/// Output-surface adapter.
pub trait Effector {
    /// Text node at `position` under `parent`, created if missing. The text
    /// is updated if it differs. Without a parent a detached node is made.
    fn ensure_text(&mut self, parent: Option<NodeId>, position: usize, text: &str) -> NodeId;

    /// Set (`Some`) or remove (`None`) an attribute.
    fn ensure_attribute(&mut self, node: NodeId, namespace: Option<&str>, name: &str, value: Option<&str>);

    /// Set or remove one style property.
    fn ensure_style(&mut self, node: NodeId, property: &str, value: Option<&str>) {
        self.ensure_attribute(node, Some("style"), property, value);
    }

    /// Element at `position` under `parent`, created if missing.
    fn ensure_node(&mut self, parent: Option<NodeId>, position: usize, namespace: Option<&str>, name: &str) -> NodeId;

    /// Marker node at `position` under `parent`, created if missing.
    fn ensure_placeholder(&mut self, parent: Option<NodeId>, position: usize, label: &str) -> NodeId;

    /// Attach `child`: before `parent` if it is a placeholder, else as its
    /// last child. Moves the child if it is attached elsewhere.
    fn append_child(&mut self, parent: NodeId, child: NodeId) -> NodeId;

    /// Detach a node from its parent. The node stays usable.
    fn unmount(&mut self, node: NodeId);

    /// The engine will never use `node` again.
    fn release(&mut self, _node: NodeId) {}
}
