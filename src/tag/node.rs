//! Named nodes

use super::kind::NodeKind;
use super::value::{check_str, Compound, List, Value};
use crate::error::{Error, Result};
use std::fmt;

/// A named payload, the unit of the tag codec.
///
/// The name is fixed at construction. Payloads of the array, string and
/// container kinds can be replaced with [`Node::set_value`]; scalar
/// payloads never change.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    name: String,
    value: Value,
}

impl Node {
    /// Create a node, checking name and string lengths
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        let name = name.into();
        let value = value.into();
        check_str("Node name", &name)?;
        value.check()?;
        Ok(Self { name, value })
    }

    pub fn compound(name: impl Into<String>, compound: Compound) -> Result<Self> {
        Self::new(name, Value::Compound(compound))
    }

    pub fn list(name: impl Into<String>, list: List) -> Result<Self> {
        Self::new(name, Value::List(list))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.value.kind()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn into_parts(self) -> (String, Value) {
        (self.name, self.value)
    }

    /// Replace the payload of an array, string, list or compound node.
    ///
    /// The replacement must have the same kind as the current payload.
    pub fn set_value(&mut self, value: impl Into<Value>) -> Result<Value> {
        let value = value.into();
        let kind = self.kind();
        match kind {
            NodeKind::ByteArray
            | NodeKind::IntArray
            | NodeKind::String
            | NodeKind::List
            | NodeKind::Compound => {}
            _ => {
                return Err(Error::Range(format!(
                    "{} payload of node '{}' is immutable",
                    kind, self.name
                )))
            }
        }
        if value.kind() != kind {
            return Err(Error::Range(format!(
                "Node '{}' holds {}, cannot store {}",
                self.name,
                kind,
                value.kind()
            )));
        }
        value.check()?;
        Ok(std::mem::replace(&mut self.value, value))
    }

    /// Children of a compound node
    pub fn as_compound(&self) -> Option<&Compound> {
        self.value.as_compound()
    }

    pub fn as_compound_mut(&mut self) -> Option<&mut Compound> {
        self.value.as_compound_mut()
    }

    /// Elements of a list node
    pub fn as_list(&self) -> Option<&List> {
        self.value.as_list()
    }

    pub fn as_list_mut(&mut self) -> Option<&mut List> {
        self.value.as_list_mut()
    }

    /// Follow a path of compound child names
    pub fn lookup(&self, path: &[&str]) -> Option<&Node> {
        let mut node = self;
        for name in path {
            node = node.as_compound()?.get(name)?;
        }
        Some(node)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?}): ", self.kind(), self.name)?;
        write_value(f, &self.value, 0)
    }
}

fn indent(f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        f.write_str("  ")?;
    }
    Ok(())
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &Value, depth: usize) -> fmt::Result {
    match value {
        Value::Byte(v) => write!(f, "{}b", v),
        Value::Short(v) => write!(f, "{}s", v),
        Value::Int(v) => write!(f, "{}", v),
        Value::Long(v) => write!(f, "{}L", v),
        Value::Float(v) => write!(f, "{}f", v),
        Value::Double(v) => write!(f, "{}d", v),
        Value::ByteArray(v) => write!(f, "[{} bytes]", v.len()),
        Value::IntArray(v) => write!(f, "[{} ints]", v.len()),
        Value::String(v) => write!(f, "{:?}", v),
        Value::List(list) => {
            writeln!(f, "{} entries of {} [", list.len(), list.element_kind())?;
            for item in list {
                indent(f, depth + 1)?;
                write_value(f, item, depth + 1)?;
                writeln!(f)?;
            }
            indent(f, depth)?;
            f.write_str("]")
        }
        Value::Compound(compound) => {
            writeln!(f, "{} entries {{", compound.len())?;
            for child in compound {
                indent(f, depth + 1)?;
                write!(f, "{}({:?}): ", child.kind(), child.name())?;
                write_value(f, child.value(), depth + 1)?;
                writeln!(f)?;
            }
            indent(f, depth)?;
            f.write_str("}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::value::MAX_STRING_LEN;

    #[test]
    fn test_name_too_long_is_range_error() {
        let name = "n".repeat(MAX_STRING_LEN + 1);
        let err = Node::new(name, 1i32).unwrap_err();
        assert!(err.is_range());

        let name = "n".repeat(MAX_STRING_LEN);
        assert!(Node::new(name, 1i32).is_ok());
    }

    #[test]
    fn test_empty_name_is_allowed() -> Result<()> {
        let node = Node::new("", 0i8)?;
        assert_eq!(node.name(), "");
        Ok(())
    }

    #[test]
    fn test_string_payload_too_long() {
        let s = "s".repeat(MAX_STRING_LEN + 1);
        assert!(Node::new("text", s).unwrap_err().is_range());
    }

    #[test]
    fn test_set_value_rules() -> Result<()> {
        let mut scalar = Node::new("x", 1i32)?;
        assert!(scalar.set_value(2i32).is_err());
        assert_eq!(scalar.value(), &Value::Int(1));

        let mut text = Node::new("t", "old")?;
        let old = text.set_value("new")?;
        assert_eq!(old, Value::String("old".into()));
        assert_eq!(text.value().as_str(), Some("new"));
        assert!(text.set_value(vec![1u8]).is_err());

        let mut bytes = Node::new("b", vec![1u8, 2, 3])?;
        bytes.set_value(Vec::<u8>::new())?;
        assert_eq!(bytes.value().as_bytes(), Some(&[][..]));
        Ok(())
    }

    #[test]
    fn test_lookup_path() -> Result<()> {
        let mut inner = Compound::new();
        inner.put("y", 7i16)?;
        let mut outer = Compound::new();
        outer.put("inner", inner)?;
        let root = Node::compound("root", outer)?;

        let found = root.lookup(&["inner", "y"]).expect("nested child");
        assert_eq!(found.value().as_i16(), Some(7));
        assert!(root.lookup(&["inner", "missing"]).is_none());
        assert!(root.lookup(&["inner", "y", "deeper"]).is_none());
        Ok(())
    }

    #[test]
    fn test_display_renders_nested() -> Result<()> {
        let mut c = Compound::new();
        c.put("count", 3i32)?;
        c.put("tags", List::from_values(vec!["a", "b"])?)?;
        let node = Node::compound("Level", c)?;
        let text = node.to_string();
        assert!(text.starts_with("Compound(\"Level\")"));
        assert!(text.contains("Int(\"count\"): 3"));
        assert!(text.contains("2 entries of String"));
        Ok(())
    }
}
