//! Template instances - one materialized copy of a template.

use std::rc::Rc;

use crate::cells::SlotId;
use crate::context::{ContextId, Hook};
use crate::engine::{EffectId, InstanceId, Runtime};
use crate::error::{Error, Result};
use crate::types::{NodeId, Value, ValueMap};

use super::{SkeletonKind, SkeletonNode, Template};

/// A live copy of a template: its nodes, its context and its effects.
#[derive(Debug)]
pub struct TemplateInstance {
    template: Rc<Template>,
    parent: ContextId,
    context: ContextId,
    roots: Vec<NodeId>,
    nodes: Vec<NodeId>,
    effects: Vec<EffectId>,
    anchor: Option<NodeId>,
    mounted: bool,
}

impl TemplateInstance {
    pub fn template(&self) -> &Rc<Template> {
        &self.template
    }

    /// Context the instance was created in.
    pub fn parent(&self) -> ContextId {
        self.parent
    }

    /// Context the instance's effects run in (derived by the injection, if
    /// the template has one).
    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn effects(&self) -> &[EffectId] {
        &self.effects
    }

    pub fn anchor(&self) -> Option<NodeId> {
        self.anchor
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }
}

/// Materialized skeleton, kept only to resolve paths.
struct Built {
    node: NodeId,
    children: Vec<Built>,
}

fn resolve(roots: &[Built], path: &[usize]) -> Option<NodeId> {
    let (first, rest) = path.split_first()?;
    let mut current = roots.get(*first)?;
    for index in rest {
        current = current.children.get(*index)?;
    }
    Some(current.node)
}

impl Runtime {
    pub fn instance(&self, id: InstanceId) -> Option<&TemplateInstance> {
        self.instances.get(id)
    }

    /// Materialize `template` in `ctx`, then create, apply and bind its
    /// effects. The instance starts unmounted, its roots detached.
    pub fn instantiate(&mut self, template: &Rc<Template>, ctx: ContextId) -> Result<InstanceId> {
        let context = match &template.injection {
            Some(injection) => {
                let derived = injection.derive_scope(self, ctx)?;
                injection.inject(self, ctx, derived)?;
                derived
            }
            None => ctx,
        };

        let mut nodes = Vec::new();
        let built: Vec<Built> = template
            .skeleton
            .iter()
            .enumerate()
            .map(|(position, skeleton)| self.materialize(skeleton, None, position, &mut nodes))
            .collect();

        if !template.refs.is_empty() {
            let mut refs = ValueMap::new();
            for (name, path) in &template.refs {
                if let Some(node) = resolve(&built, path) {
                    refs.insert(Rc::clone(name), Value::Node(node));
                }
            }
            self.write_local(context, SlotId::REFS, Some(Value::Map(Rc::new(refs))))?;
        }

        let id = self.instances.insert(TemplateInstance {
            template: Rc::clone(template),
            parent: ctx,
            context,
            roots: built.iter().map(|b| b.node).collect(),
            nodes,
            effects: Vec::new(),
            anchor: None,
            mounted: false,
        });
        tracing::debug!(instance = %id, template = %template.name, context = %context, "instantiated");

        for (path, def) in &template.effects {
            let Some(node) = resolve(&built, path) else {
                self.on_error(
                    "Template",
                    format!("no node at {path:?} for {}", def.kind.name()),
                    template.name.to_string(),
                );
                continue;
            };
            let effect = self.create_effect(Rc::clone(def), context, node);
            if let Some(instance) = self.instances.get_mut(id) {
                instance.effects.push(effect);
            }
            self.apply_effect(effect)?;
            self.bind_effect(effect)?;
        }
        Ok(id)
    }

    fn materialize(
        &mut self,
        skeleton: &SkeletonNode,
        parent: Option<NodeId>,
        position: usize,
        nodes: &mut Vec<NodeId>,
    ) -> Built {
        let node = match &skeleton.kind {
            SkeletonKind::Element {
                namespace,
                name,
                attributes,
            } => {
                let node = self.effector.ensure_node(parent, position, namespace.as_deref(), name);
                for attribute in attributes {
                    self.effector.ensure_attribute(
                        node,
                        attribute.namespace.as_deref(),
                        &attribute.name,
                        Some(&attribute.value),
                    );
                }
                node
            }
            SkeletonKind::Text(content) => self.effector.ensure_text(parent, position, content),
            SkeletonKind::Placeholder(label) => self.effector.ensure_placeholder(parent, position, label),
        };
        nodes.push(node);
        let children = skeleton
            .children
            .iter()
            .enumerate()
            .map(|(i, child)| self.materialize(child, Some(node), i, nodes))
            .collect();
        Built { node, children }
    }

    /// Attach the instance's roots to `anchor` and mount its effects.
    pub fn mount_instance(&mut self, id: InstanceId, anchor: NodeId) -> Result<()> {
        let instance = self.instances.get_mut(id).ok_or(Error::StaleInstance(id))?;
        if instance.mounted {
            return Ok(());
        }
        instance.mounted = true;
        instance.anchor = Some(anchor);
        let (roots, effects, context) = (instance.roots.clone(), instance.effects.clone(), instance.context);

        for root in roots {
            self.effector.append_child(anchor, root);
        }
        for effect in effects {
            self.mount_effect(effect)?;
        }
        self.trigger_hook(context, Hook::Mount);
        Ok(())
    }

    /// Detach the instance's roots and unmount its effects.
    pub fn unmount_instance(&mut self, id: InstanceId) -> Result<()> {
        let instance = self.instances.get_mut(id).ok_or(Error::StaleInstance(id))?;
        if !instance.mounted {
            return Ok(());
        }
        instance.mounted = false;
        let (roots, effects, context) = (instance.roots.clone(), instance.effects.clone(), instance.context);

        for effect in effects.into_iter().rev() {
            self.unmount_effect(effect)?;
        }
        for root in roots {
            self.effector.unmount(root);
        }
        self.trigger_hook(context, Hook::Unmount);
        Ok(())
    }

    /// Re-run the template's injection from the parent context into the
    /// instance's own context.
    pub fn refresh_instance(&mut self, id: InstanceId) -> Result<()> {
        let instance = self.instances.get(id).ok_or(Error::StaleInstance(id))?;
        let (template, parent, context) = (Rc::clone(&instance.template), instance.parent, instance.context);
        if let Some(injection) = &template.injection {
            injection.inject(self, parent, context)?;
        }
        Ok(())
    }

    /// Unmount, dispose every effect, release the nodes and the context the
    /// injection derived.
    pub fn dispose_instance(&mut self, id: InstanceId) -> Result<()> {
        if !self.instances.contains(id) {
            return Ok(());
        }
        self.unmount_instance(id)?;
        let Some(instance) = self.instances.remove(id) else {
            return Ok(());
        };
        for effect in instance.effects.into_iter().rev() {
            self.dispose_effect(effect)?;
        }
        for node in instance.nodes {
            self.effector.release(node);
        }
        if instance.context != instance.parent {
            self.release(instance.context);
        }
        tracing::debug!(instance = %id, template = %instance.template.name, "disposed");
        Ok(())
    }
}
