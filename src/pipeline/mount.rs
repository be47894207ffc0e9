//! Mount API - rendering a template at an anchor node.
//!
//! # Example
//!
//! ```ignore
//! let dom = MemoryDom::new();
//! let body = dom.create_root("body");
//! let mut rt = Runtime::new(dom.clone());
//!
//! let c = Compiler::for_runtime(&rt);
//! let name = c.cell("name", "");
//! let hello = c.component("hello", ArgShape::cells([&name]), element("p").child(c.text(&name)));
//!
//! let handle = rt.render(&hello, body, Value::map([("name", "world")]))?;
//! // <body><p>world</p></body>
//!
//! handle.dispose(&mut rt)?;
//! ```

use std::rc::Rc;

use crate::cells::SlotId;
use crate::context::{Bindings, ContextId};
use crate::engine::{InstanceId, Runtime};
use crate::error::{Error, Result};
use crate::template::Template;
use crate::types::{NodeId, Value};

// =============================================================================
// Render Handle
// =============================================================================

/// Handle returned by the `render*` functions.
///
/// Owns the root context and the template instance. Dropping the handle does
/// not tear anything down (the runtime is needed for that): call
/// [`RenderHandle::dispose`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderHandle {
    context: ContextId,
    instance: InstanceId,
    anchor: NodeId,
}

impl RenderHandle {
    /// Root context. Writing to cells bound here updates the output.
    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    pub fn anchor(&self) -> NodeId {
        self.anchor
    }

    /// Context the instance's effects run in (the root context unless the
    /// template has an injection).
    pub fn scope(&self, rt: &Runtime) -> Option<ContextId> {
        rt.instance(self.instance).map(|i| i.context())
    }

    /// Re-attach after [`unmount`](Self::unmount).
    pub fn mount(&self, rt: &mut Runtime) -> Result<()> {
        rt.mount_instance(self.instance, self.anchor)
    }

    /// Detach the output, keeping the instance alive.
    pub fn unmount(&self, rt: &mut Runtime) -> Result<()> {
        rt.unmount_instance(self.instance)
    }

    /// Dispose the instance and release the root context.
    pub fn dispose(self, rt: &mut Runtime) -> Result<()> {
        rt.dispose_instance(self.instance)?;
        rt.release(self.context);
        Ok(())
    }
}

// =============================================================================
// Render
// =============================================================================

impl Runtime {
    /// Render `template` at `anchor` with `data` as the root input.
    pub fn render(&mut self, template: &Rc<Template>, anchor: NodeId, data: impl Into<Value>) -> Result<RenderHandle> {
        let bindings = Bindings::new().raw(SlotId::INPUT, data.into());
        self.render_with(template, anchor, bindings)
    }

    /// Render `template` at `anchor` in a root context built from `bindings`.
    pub fn render_with(&mut self, template: &Rc<Template>, anchor: NodeId, bindings: Bindings) -> Result<RenderHandle> {
        let context = self.root(bindings)?;
        let instance = match self.instantiate(template, context) {
            Ok(instance) => instance,
            Err(err) => {
                self.release(context);
                return Err(err);
            }
        };
        self.mount_instance(instance, anchor)?;
        tracing::debug!(template = template.name(), anchor = %anchor, "rendered");
        Ok(RenderHandle {
            context,
            instance,
            anchor,
        })
    }

    /// Render a registered template by name.
    pub fn render_named(&mut self, name: &str, anchor: NodeId, data: impl Into<Value>) -> Result<RenderHandle> {
        let template = self
            .templates()
            .get(name)
            .ok_or_else(|| Error::UnknownTemplate(name.to_string()))?;
        self.render(&template, anchor, data)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::ArgShape;
    use crate::surface::MemoryDom;
    use crate::template::{element, Compiler};

    fn setup() -> (MemoryDom, NodeId, Runtime, Compiler) {
        let dom = MemoryDom::new();
        let body = dom.create_root("body");
        let rt = Runtime::new(dom.clone());
        let c = Compiler::for_runtime(&rt);
        (dom, body, rt, c)
    }

    #[test]
    fn test_render_with_data() {
        let (dom, body, mut rt, c) = setup();
        let name = c.cell("name", "");
        let hello = c.component("hello", ArgShape::cells([&name]), element("p").child(c.text(&name)));

        let handle = rt.render(&hello, body, Value::map([("name", "world")])).unwrap();
        assert_eq!(dom.inner_html(body), "<p>world</p>");

        let scope = handle.scope(&rt).unwrap();
        name.set(&mut rt, scope, "there").unwrap();
        assert_eq!(dom.inner_html(body), "<p>there</p>");
    }

    #[test]
    fn test_render_with_bindings() {
        let (dom, body, mut rt, c) = setup();
        let count = c.cell("count", 0);
        let view = c.compile("counter", element("span").child(c.text(&count)));

        let handle = rt.render_with(&view, body, Bindings::new().cell(&count, 1)).unwrap();
        assert_eq!(dom.inner_html(body), "<span>1</span>");

        count.set(&mut rt, handle.context(), 2).unwrap();
        assert_eq!(dom.inner_html(body), "<span>2</span>");
    }

    #[test]
    fn test_unmount_and_remount() {
        let (dom, body, mut rt, c) = setup();
        let view = c.compile("rule", element("hr"));

        let handle = rt.render(&view, body, Value::Null).unwrap();
        handle.unmount(&mut rt).unwrap();
        assert_eq!(dom.inner_html(body), "");
        handle.mount(&mut rt).unwrap();
        assert_eq!(dom.inner_html(body), "<hr></hr>");
    }

    #[test]
    fn test_dispose_releases_everything() {
        let (dom, body, mut rt, c) = setup();
        let count = c.cell("count", 0);
        let view = c.compile("counter", element("span").child(c.text(&count)));

        let handle = rt.render_with(&view, body, Bindings::new().cell(&count, 1)).unwrap();
        handle.dispose(&mut rt).unwrap();

        assert_eq!(rt.effect_count(), 0);
        assert_eq!(rt.instance_count(), 0);
        assert_eq!(rt.store().context_count(), 0);
        assert_eq!(rt.store().observable_count(), 0);
        assert_eq!(dom.inner_html(body), "");
    }

    #[test]
    fn test_render_named() {
        let (dom, body, mut rt, c) = setup();
        rt.templates_mut().register(c.compile("rule", element("hr")));

        rt.render_named("rule", body, Value::Null).unwrap();
        assert_eq!(dom.inner_html(body), "<hr></hr>");

        let err = rt.render_named("missing", body, Value::Null).unwrap_err();
        assert!(matches!(err, Error::UnknownTemplate(name) if name == "missing"));
    }
}
