//! Template registry - templates addressable by name.

use std::collections::HashMap;
use std::rc::Rc;

use super::Template;

/// Named templates, used by `TemplateRef::Named`, dynamic template effects
/// and [`Runtime::render_named`](crate::engine::Runtime::render_named).
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Rc<Template>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the template's own name. Returns the template it replaced.
    pub fn register(&mut self, template: Rc<Template>) -> Option<Rc<Template>> {
        let name = template.name().to_string();
        let replaced = self.templates.insert(name, template);
        if let Some(old) = &replaced {
            tracing::debug!(template = old.name(), "template replaced");
        }
        replaced
    }

    pub fn get(&self, name: &str) -> Option<Rc<Template>> {
        self.templates.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Rc<Template>> {
        self.templates.remove(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{element, Compiler};

    #[test]
    fn test_register_and_replace() {
        let c = Compiler::default();
        let mut registry = TemplateRegistry::new();
        assert!(registry.is_empty());

        assert!(registry.register(c.compile("row", element("tr"))).is_none());
        assert!(registry.contains("row"));
        let replaced = registry.register(c.compile("row", element("li")));
        assert!(replaced.is_some());
        assert_eq!(registry.len(), 1);

        let row = registry.get("row").unwrap();
        assert!(matches!(&row.skeleton()[0].kind, crate::template::SkeletonKind::Element { name, .. } if &**name == "li"));
        assert!(registry.remove("row").is_some());
        assert!(registry.get("row").is_none());
    }
}
