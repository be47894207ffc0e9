//! Core types for spark-dom.
//!
//! These types define the foundation that everything builds on.
//! They flow through the cell graph and are what effects project onto the
//! output surface.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

// =============================================================================
// Node handle
// =============================================================================

/// Opaque handle to a node of the output surface.
///
/// The engine never looks inside a node. Handles are minted by the
/// [`Effector`](crate::surface::Effector) and passed back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// Value - dynamic data carried by cells
// =============================================================================

/// Ordered string-keyed map used for object-shaped values.
pub type ValueMap = IndexMap<Rc<str>, Value>;

/// A dynamic value stored in a cell.
///
/// Atoms compare by value. Lists and maps are reference counted, and
/// [`Value::same`] compares them by reference: replacing a list with a new
/// list of identical content still counts as a change, while passing the same
/// `Rc` around does not.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<Vec<Value>>),
    Map(Rc<ValueMap>),
    Node(NodeId),
}

impl Value {
    /// Build a list value.
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::List(Rc::new(items.into_iter().map(Into::into).collect()))
    }

    /// Build a map value, preserving the iteration order of `entries`.
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        Value::Map(Rc::new(
            entries
                .into_iter()
                .map(|(k, v)| (Rc::from(k.as_ref()), v.into()))
                .collect(),
        ))
    }

    /// Identity comparison, the engine's notion of "unchanged".
    ///
    /// Atoms are compared by value (`NaN` is never the same as itself),
    /// containers by pointer.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Rc::ptr_eq(a, b),
            (Value::Node(a), Value::Node(b)) => a == b,
            _ => false,
        }
    }

    /// `Option`-aware version of [`Value::same`], where `None` is "undefined".
    pub fn same_opt(a: Option<&Value>, b: Option<&Value>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => a.same(b),
            _ => false,
        }
    }

    /// True for null, empty lists and empty maps.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::List(items) => items.is_empty(),
            Value::Map(entries) => entries.is_empty(),
            _ => false,
        }
    }

    /// True for anything that is not a list or a map.
    pub fn is_atom(&self) -> bool {
        !matches!(self, Value::List(_) | Value::Map(_))
    }

    /// Truthiness, used by boolean toggles and `if`-style branches.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0 && !f.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::List(_) | Value::Map(_) | Value::Node(_) => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Value::Node(node) => Some(*node),
            _ => None,
        }
    }

    /// Child lookup by key: map entries by name, list items by index.
    pub fn get(&self, key: &Key) -> Option<&Value> {
        match (self, key) {
            (Value::Map(entries), Key::Name(name)) => entries.get(name),
            (Value::List(items), Key::Index(i)) => items.get(*i),
            (Value::Map(entries), Key::Index(i)) => entries.get(i.to_string().as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Map(_) => f.write_str("[object]"),
            Value::Node(node) => write!(f, "{node}"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(Rc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(Rc::from(value))
    }
}

impl From<NodeId> for Value {
    fn from(value: NodeId) -> Self {
        Value::Node(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::list(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

// =============================================================================
// Key - identity of a mapped item
// =============================================================================

/// Identity of a mapped item.
///
/// Atoms map to a single implicit key, lists are keyed by position and maps
/// by property name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Atom,
    Index(usize),
    Name(Rc<str>),
}

impl From<&Key> for Value {
    fn from(key: &Key) -> Self {
        match key {
            Key::Atom => Value::Null,
            Key::Index(i) => Value::Int(*i as i64),
            Key::Name(name) => Value::Str(name.clone()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Atom => f.write_str("_"),
            Key::Index(i) => write!(f, "{i}"),
            Key::Name(name) => f.write_str(name),
        }
    }
}

// =============================================================================
// Propagation outcomes
// =============================================================================

/// What a subscriber tells the publisher after handling a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    /// Keep notifying the remaining subscribers.
    #[default]
    Continue,
    /// Skip the remaining subscribers of this publish.
    Stop,
}

/// Result of a `set` on a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// The comparator saw no change and nothing was published.
    Unchanged,
    /// Every subscriber was notified.
    Propagated,
    /// A subscriber returned [`Propagation::Stop`].
    Stopped,
}

impl Flow {
    /// True when the value was published.
    pub fn changed(self) -> bool {
        !matches!(self, Flow::Unchanged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_compares_atoms_by_value() {
        assert!(Value::from(3).same(&Value::from(3)));
        assert!(Value::from("a").same(&Value::from("a")));
        assert!(!Value::from(3).same(&Value::from(4)));
        assert!(!Value::from(3).same(&Value::from(3.0)));
        assert!(!Value::Float(f64::NAN).same(&Value::Float(f64::NAN)));
    }

    #[test]
    fn test_same_compares_containers_by_reference() {
        let a = Value::list([1, 2, 3]);
        let b = Value::list([1, 2, 3]);
        assert_eq!(a, b);
        assert!(!a.same(&b));
        assert!(a.same(&a.clone()));
    }

    #[test]
    fn test_emptiness_and_atoms() {
        assert!(Value::Null.is_empty());
        assert!(Value::list(Vec::<i32>::new()).is_empty());
        assert!(Value::map(Vec::<(&str, i32)>::new()).is_empty());
        assert!(!Value::from(0).is_empty());
        assert!(Value::from("x").is_atom());
        assert!(!Value::list([1]).is_atom());
    }

    #[test]
    fn test_map_preserves_insertion_order() {
        let v = Value::map([("b", 2), ("a", 1), ("c", 3)]);
        let keys: Vec<&str> = v.as_map().unwrap().keys().map(|k| &**k).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_get_by_key() {
        let list = Value::list([10, 20]);
        assert_eq!(list.get(&Key::Index(1)), Some(&Value::from(20)));
        let map = Value::map([("a", 1)]);
        assert_eq!(map.get(&Key::Name("a".into())), Some(&Value::from(1)));
        assert_eq!(map.get(&Key::Name("b".into())), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::from(5).to_string(), "5");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::list([1, 2]).to_string(), "1,2");
    }
}
