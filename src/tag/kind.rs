//! Node kinds and their wire ids

use crate::error::{Error, Result};
use std::fmt;

/// The kind of a node, fixed by the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeKind {
    /// Terminates a compound payload; never carried by a node.
    End = 0,
    Byte = 1,
    Short = 2,
    Int = 3,
    Long = 4,
    Float = 5,
    Double = 6,
    ByteArray = 7,
    String = 8,
    List = 9,
    Compound = 10,
    IntArray = 11,
}

impl NodeKind {
    /// Wire id of this kind
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Look up a kind by its wire id
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(NodeKind::End),
            1 => Ok(NodeKind::Byte),
            2 => Ok(NodeKind::Short),
            3 => Ok(NodeKind::Int),
            4 => Ok(NodeKind::Long),
            5 => Ok(NodeKind::Float),
            6 => Ok(NodeKind::Double),
            7 => Ok(NodeKind::ByteArray),
            8 => Ok(NodeKind::String),
            9 => Ok(NodeKind::List),
            10 => Ok(NodeKind::Compound),
            11 => Ok(NodeKind::IntArray),
            _ => Err(Error::Format(format!("Unknown tag id: {}", id))),
        }
    }

    /// Whether payloads of this kind contain further nodes
    pub fn is_container(self) -> bool {
        matches!(self, NodeKind::List | NodeKind::Compound)
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeKind::End => "End",
            NodeKind::Byte => "Byte",
            NodeKind::Short => "Short",
            NodeKind::Int => "Int",
            NodeKind::Long => "Long",
            NodeKind::Float => "Float",
            NodeKind::Double => "Double",
            NodeKind::ByteArray => "ByteArray",
            NodeKind::String => "String",
            NodeKind::List => "List",
            NodeKind::Compound => "Compound",
            NodeKind::IntArray => "IntArray",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_ids_match_wire_format() {
        for id in 0..=11u8 {
            let kind = NodeKind::from_id(id).unwrap();
            assert_eq!(kind.id(), id);
        }
        assert_eq!(NodeKind::Compound.id(), 10);
        assert_eq!(NodeKind::IntArray.id(), 11);
    }

    #[test]
    fn test_unknown_id_is_format_error() {
        let err = NodeKind::from_id(12).unwrap_err();
        assert!(err.is_format());
        assert!(NodeKind::from_id(0xFF).is_err());
    }

    #[test]
    fn test_containers() {
        assert!(NodeKind::List.is_container());
        assert!(NodeKind::Compound.is_container());
        assert!(!NodeKind::IntArray.is_container());
    }
}
