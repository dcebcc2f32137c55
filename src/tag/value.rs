//! Node payloads
//!
//! A [`Value`] is the kind-specific payload of a node. Scalars are stored
//! inline, arrays are owned copies, and the two container kinds hold
//! further payloads:
//!
//! - [`List`]: unnamed payloads that all share one element kind
//! - [`Compound`]: named [`Node`]s, unique by name
//!
//! # Example
//!
//! ```rust
//! use voxelstore::tag::{Compound, List, Value};
//!
//! let mut heights = List::new();
//! heights.push(Value::Int(64)).unwrap();
//! heights.push(Value::Int(65)).unwrap();
//!
//! let mut level = Compound::new();
//! level.put("xPos", 3i32).unwrap();
//! level.put("Heights", heights).unwrap();
//! assert_eq!(level.get_value("xPos").and_then(Value::as_i32), Some(3));
//! ```

use super::kind::NodeKind;
use super::node::Node;
use crate::error::{Error, Result};

/// Longest name or string payload, in UTF-16 code units
pub const MAX_STRING_LEN: usize = 32767;

/// Reject strings longer than [`MAX_STRING_LEN`] UTF-16 code units, or
/// whose UTF-8 encoding overflows the 16-bit length prefix
pub(crate) fn check_str(what: &str, s: &str) -> Result<()> {
    // Every UTF-8 byte yields at most one UTF-16 unit.
    if s.len() <= MAX_STRING_LEN {
        return Ok(());
    }
    if s.len() > u16::MAX as usize {
        return Err(Error::Range(format!(
            "{} is {} UTF-8 bytes long, max {}",
            what,
            s.len(),
            u16::MAX
        )));
    }
    let units = s.encode_utf16().count();
    if units > MAX_STRING_LEN {
        return Err(Error::Range(format!(
            "{} is {} UTF-16 units long, max {}",
            what, units, MAX_STRING_LEN
        )));
    }
    Ok(())
}

/// Payload of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<u8>),
    String(String),
    List(List),
    Compound(Compound),
    IntArray(Vec<i32>),
}

impl Value {
    /// Kind tag for this payload
    pub fn kind(&self) -> NodeKind {
        match self {
            Value::Byte(_) => NodeKind::Byte,
            Value::Short(_) => NodeKind::Short,
            Value::Int(_) => NodeKind::Int,
            Value::Long(_) => NodeKind::Long,
            Value::Float(_) => NodeKind::Float,
            Value::Double(_) => NodeKind::Double,
            Value::ByteArray(_) => NodeKind::ByteArray,
            Value::String(_) => NodeKind::String,
            Value::List(_) => NodeKind::List,
            Value::Compound(_) => NodeKind::Compound,
            Value::IntArray(_) => NodeKind::IntArray,
        }
    }

    /// Shallow constraint check; containers validate their children on insert.
    pub(crate) fn check(&self) -> Result<()> {
        match self {
            Value::String(s) => check_str("String payload", s),
            _ => Ok(()),
        }
    }

    pub fn as_i8(&self) -> Option<i8> {
        match self {
            Value::Byte(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> Option<i16> {
        match self {
            Value::Short(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::ByteArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut List> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&Compound> {
        match self {
            Value::Compound(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_compound_mut(&mut self) -> Option<&mut Compound> {
        match self {
            Value::Compound(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int_array(&self) -> Option<&[i32]> {
        match self {
            Value::IntArray(v) => Some(v),
            _ => None,
        }
    }
}

// Conversions
impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Byte(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Short(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::ByteArray(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::ByteArray(v.to_vec())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<List> for Value {
    fn from(v: List) -> Self {
        Value::List(v)
    }
}

impl From<Compound> for Value {
    fn from(v: Compound) -> Self {
        Value::Compound(v)
    }
}

impl From<Vec<i32>> for Value {
    fn from(v: Vec<i32>) -> Self {
        Value::IntArray(v)
    }
}

/// Homogeneous list of unnamed payloads.
///
/// An empty list created with [`List::new`] has element kind `End` and
/// adopts the kind of the first value pushed into it.
#[derive(Debug, Clone, PartialEq)]
pub struct List {
    element_kind: NodeKind,
    items: Vec<Value>,
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl List {
    /// Create an empty list of unspecified element kind
    pub fn new() -> Self {
        Self {
            element_kind: NodeKind::End,
            items: Vec::new(),
        }
    }

    /// Create an empty list with a fixed element kind
    pub fn of_kind(element_kind: NodeKind) -> Self {
        Self {
            element_kind,
            items: Vec::new(),
        }
    }

    /// Build a list from values, which must all share one kind
    pub fn from_values<I>(values: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let mut list = Self::new();
        for value in values {
            list.push(value)?;
        }
        Ok(list)
    }

    /// Kind shared by all elements (`End` while untyped and empty)
    pub fn element_kind(&self) -> NodeKind {
        self.element_kind
    }

    /// Append a value, rejecting one of a different kind
    pub fn push(&mut self, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let kind = value.kind();
        if self.element_kind == NodeKind::End {
            self.element_kind = kind;
        } else if kind != self.element_kind {
            return Err(Error::Range(format!(
                "Cannot add {} to a list of {}",
                kind, self.element_kind
            )));
        }
        value.check()?;
        self.items.push(value);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    /// Replace the element at `index`, returning the old one.
    ///
    /// The replacement must have the list's element kind.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> Result<Value> {
        let value = value.into();
        if value.kind() != self.element_kind {
            return Err(Error::Range(format!(
                "Cannot store {} in a list of {}",
                value.kind(),
                self.element_kind
            )));
        }
        value.check()?;
        let len = self.items.len();
        let slot = self.items.get_mut(index).ok_or_else(|| {
            Error::Range(format!("Index {} out of bounds for a list of {}", index, len))
        })?;
        Ok(std::mem::replace(slot, value))
    }

    pub fn remove(&mut self, index: usize) -> Option<Value> {
        if index < self.items.len() {
            Some(self.items.remove(index))
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    /// Reader-side constructor; the caller guarantees homogeneity.
    pub(crate) fn from_parts(element_kind: NodeKind, items: Vec<Value>) -> Self {
        Self {
            element_kind,
            items,
        }
    }
}

impl<'a> IntoIterator for &'a List {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Named children, unique by name, kept in insertion order.
///
/// Equality ignores child order: two compounds are equal when they hold
/// the same names bound to equal nodes.
#[derive(Debug, Clone, Default)]
pub struct Compound {
    children: Vec<Node>,
}

impl Compound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, replacing and returning any child of the same name
    pub fn insert(&mut self, node: Node) -> Option<Node> {
        match self.position(node.name()) {
            Some(i) => Some(std::mem::replace(&mut self.children[i], node)),
            None => {
                self.children.push(node);
                None
            }
        }
    }

    /// Build a node from `name` and `value` and insert it
    pub fn put(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<Option<Node>> {
        let node = Node::new(name, value)?;
        Ok(self.insert(node))
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|n| n.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.children.iter_mut().find(|n| n.name() == name)
    }

    /// Payload of the child called `name`
    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.get(name).map(Node::value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Node> {
        self.position(name).map(|i| self.children.remove(i))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.children.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(Node::name)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.children.iter().position(|n| n.name() == name)
    }
}

impl PartialEq for Compound {
    fn eq(&self, other: &Self) -> bool {
        self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .all(|child| other.get(child.name()) == Some(child))
    }
}

impl<'a> IntoIterator for &'a Compound {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.children.iter()
    }
}

impl IntoIterator for Compound {
    type Item = Node;
    type IntoIter = std::vec::IntoIter<Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.children.into_iter()
    }
}

impl FromIterator<Node> for Compound {
    fn from_iter<I: IntoIterator<Item = Node>>(iter: I) -> Self {
        let mut compound = Compound::new();
        for node in iter {
            compound.insert(node);
        }
        compound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_adopts_first_kind() -> Result<()> {
        let mut list = List::new();
        assert_eq!(list.element_kind(), NodeKind::End);

        list.push(1i64)?;
        assert_eq!(list.element_kind(), NodeKind::Long);

        let err = list.push("not a long").unwrap_err();
        assert!(err.is_range());
        assert_eq!(list.len(), 1);
        Ok(())
    }

    #[test]
    fn test_typed_empty_list_rejects_other_kinds() {
        let mut list = List::of_kind(NodeKind::Compound);
        assert!(list.push(Value::Int(1)).is_err());
        assert!(list.push(Compound::new()).is_ok());
    }

    #[test]
    fn test_list_rejects_oversized_string() {
        let mut list = List::new();
        let long = "x".repeat(MAX_STRING_LEN + 1);
        assert!(list.push(long).unwrap_err().is_range());
        assert!(list.is_empty());
    }

    #[test]
    fn test_compound_names_are_unique() -> Result<()> {
        let mut compound = Compound::new();
        assert!(compound.put("a", 1i32)?.is_none());
        let old = compound.put("a", 2i32)?.expect("replaced child");
        assert_eq!(old.value(), &Value::Int(1));
        assert_eq!(compound.len(), 1);
        assert_eq!(compound.get_value("a"), Some(&Value::Int(2)));
        Ok(())
    }

    #[test]
    fn test_compound_equality_ignores_order() -> Result<()> {
        let mut a = Compound::new();
        a.put("x", 1i32)?;
        a.put("y", "two")?;

        let mut b = Compound::new();
        b.put("y", "two")?;
        b.put("x", 1i32)?;
        assert_eq!(a, b);

        b.put("x", 3i32)?;
        assert_ne!(a, b);
        Ok(())
    }

    #[test]
    fn test_compound_remove_and_contains() -> Result<()> {
        let mut c = Compound::new();
        c.put("k", 1.5f64)?;
        assert!(c.contains("k"));
        assert!(c.remove("k").is_some());
        assert!(!c.contains("k"));
        assert!(c.remove("k").is_none());
        Ok(())
    }

    #[test]
    fn test_check_str_counts_utf16_units() {
        // 'é' is two UTF-8 bytes but one UTF-16 unit
        let s = "é".repeat(MAX_STRING_LEN);
        assert!(check_str("name", &s).is_ok());
        let s = "é".repeat(MAX_STRING_LEN + 1);
        assert!(check_str("name", &s).is_err());
        // astral characters take two UTF-16 units
        let s = "𝄞".repeat(MAX_STRING_LEN / 2 + 1);
        assert!(check_str("name", &s).is_err());
    }

    #[test]
    fn test_check_str_limits_utf8_bytes() {
        // 30000 UTF-16 units but 90000 UTF-8 bytes
        let s = "€".repeat(30_000);
        assert!(check_str("name", &s).unwrap_err().is_range());
        assert!(Node::new("euros", s.clone()).unwrap_err().is_range());
        assert!(Node::new(s, 1i32).unwrap_err().is_range());
        // 65535 bytes is the most a length prefix can describe
        assert!(check_str("name", &"€".repeat(21_845)).is_ok());
    }

    #[test]
    fn test_list_set_keeps_element_kind() -> Result<()> {
        let mut list = List::from_values([1i32, 2])?;
        assert!(list.set(0, "oops").unwrap_err().is_range());
        assert_eq!(list.get(0), Some(&Value::Int(1)));

        assert_eq!(list.set(1, 7i32)?, Value::Int(2));
        assert_eq!(list.get(1), Some(&Value::Int(7)));
        assert!(list.set(2, 3i32).unwrap_err().is_range());
        Ok(())
    }

    #[test]
    fn test_list_set_checks_strings() -> Result<()> {
        let mut list = List::from_values(["a", "b"])?;
        let long = "x".repeat(MAX_STRING_LEN + 1);
        assert!(list.set(0, long).unwrap_err().is_range());
        assert_eq!(list.get(0).and_then(Value::as_str), Some("a"));
        Ok(())
    }
}
