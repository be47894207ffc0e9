//! Formatting, attribute and style effects.

use crate::engine::{EffectId, Runtime};
use crate::error::Result;
use crate::types::{NodeId, Value};

use super::{EffectData, Format, Lifecycle};

fn text_of(format: Option<&Format>, value: &Value) -> String {
    match format {
        Some(format) => format(value),
        None => value.to_string(),
    }
}

/// Attribute text for a value: `None` removes the attribute.
fn attribute_of(format: Option<&Format>, value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => None,
        Some(Value::Bool(true)) if format.is_none() => Some(String::new()),
        Some(value) => Some(text_of(format, value)),
    }
}

// =============================================================================
// Text
// =============================================================================

pub(super) fn render_text(rt: &mut Runtime, id: EffectId, format: Option<&Format>, value: Option<&Value>) -> Result<()> {
    let text = value.map(|v| text_of(format, v)).unwrap_or_default();
    let state = rt.effect_mut(id)?;
    let (placeholder, existing, mounted) = match state.data {
        EffectData::Text(node) => (state.node, node, state.flags.contains(Lifecycle::MOUNTED)),
        _ => return Ok(()),
    };

    let node = rt.effector.ensure_text(Some(placeholder), 0, &text);
    if existing.is_none() {
        if !mounted {
            rt.effector.unmount(node);
        }
        rt.effect_mut(id)?.data = EffectData::Text(Some(node));
    }
    Ok(())
}

fn text_node(rt: &mut Runtime, id: EffectId) -> Result<Option<NodeId>> {
    Ok(match rt.effect_mut(id)?.data {
        EffectData::Text(node) => node,
        _ => None,
    })
}

pub(super) fn mount(rt: &mut Runtime, id: EffectId, placeholder: NodeId) -> Result<()> {
    if let Some(node) = text_node(rt, id)? {
        rt.effector.append_child(placeholder, node);
    }
    Ok(())
}

pub(super) fn unmount(rt: &mut Runtime, id: EffectId) -> Result<()> {
    if let Some(node) = text_node(rt, id)? {
        rt.effector.unmount(node);
    }
    Ok(())
}

pub(super) fn dispose(rt: &mut Runtime, id: EffectId) -> Result<()> {
    if let Some(node) = text_node(rt, id)? {
        rt.effector.release(node);
        rt.effect_mut(id)?.data = EffectData::Text(None);
    }
    Ok(())
}

// =============================================================================
// Attributes and styles
// =============================================================================

pub(super) fn render_attribute(
    rt: &mut Runtime,
    id: EffectId,
    namespace: Option<&str>,
    name: &str,
    format: Option<&Format>,
    value: Option<&Value>,
) -> Result<()> {
    let node = rt.effect_mut(id)?.node;
    let text = attribute_of(format, value);
    rt.effector.ensure_attribute(node, namespace, name, text.as_deref());
    Ok(())
}

pub(super) fn render_style(
    rt: &mut Runtime,
    id: EffectId,
    property: &str,
    format: Option<&Format>,
    value: Option<&Value>,
) -> Result<()> {
    let node = rt.effect_mut(id)?.node;
    let text = attribute_of(format, value);
    rt.effector.ensure_style(node, property, text.as_deref());
    Ok(())
}
