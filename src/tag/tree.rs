//! Standalone documents

use super::io::{NodeReader, NodeWriter};
use super::kind::NodeKind;
use super::node::Node;
use super::value::Value;
use crate::error::{Error, Result};
use byteorder::ByteOrder;
use std::io::{Read, Write};

/// One serialized document: a single root node.
///
/// On the wire the root is framed inside an unnamed compound holding
/// exactly that one child.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    root: Node,
}

impl Tree {
    pub fn new(root: Node) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Node {
        &mut self.root
    }

    pub fn into_root(self) -> Node {
        self.root
    }

    /// Write the framed document
    pub fn write<W: Write, O: ByteOrder>(&self, writer: &mut NodeWriter<W, O>) -> Result<()> {
        writer.write_header(NodeKind::Compound, "")?;
        writer.write_node(&self.root)?;
        writer.write_end()
    }

    /// Read a framed document
    pub fn read<R: Read, O: ByteOrder>(reader: &mut NodeReader<R, O>) -> Result<Self> {
        let wrapper = reader
            .read_node()?
            .ok_or_else(|| Error::Format("Document starts with an End tag".to_string()))?;
        let compound = match wrapper.into_value() {
            Value::Compound(c) => c,
            other => {
                return Err(Error::Format(format!(
                    "Document wrapper is {}, expected Compound",
                    other.kind()
                )))
            }
        };
        if compound.len() != 1 {
            return Err(Error::Format(format!(
                "Document wrapper holds {} nodes, expected 1",
                compound.len()
            )));
        }
        let root = compound
            .into_iter()
            .next()
            .ok_or_else(|| Error::Internal("Wrapper emptied while reading".to_string()))?;
        Ok(Self { root })
    }

    /// Big-endian write to any stream
    pub fn write_to<W: Write>(&self, out: W) -> Result<()> {
        self.write(&mut NodeWriter::new(out))
    }

    /// Big-endian read from any stream
    pub fn read_from<R: Read>(input: R) -> Result<Self> {
        Self::read(&mut NodeReader::new(input))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read_from(bytes)
    }
}

impl From<Node> for Tree {
    fn from(root: Node) -> Self {
        Self::new(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{Compound, List};

    fn chunk_tree() -> Result<Tree> {
        let mut level = Compound::new();
        level.put("xPos", 5i32)?;
        level.put("zPos", -3i32)?;
        level.put("LastUpdate", 123_456i64)?;
        level.put("Blocks", vec![1u8; 4096])?;
        level.put("HeightMap", vec![64i32; 256])?;
        level.put("Entities", List::of_kind(NodeKind::Compound))?;
        Ok(Tree::new(Node::compound("Level", level)?))
    }

    #[test]
    fn test_tree_framing() -> Result<()> {
        let tree = Tree::new(Node::new("a", 1i8)?);
        let bytes = tree.to_bytes()?;
        // wrapper header, root node, wrapper end
        assert_eq!(bytes, vec![10, 0, 0, 1, 0, 1, b'a', 1, 0]);
        Ok(())
    }

    #[test]
    fn test_tree_roundtrip() -> Result<()> {
        let tree = chunk_tree()?;
        let decoded = Tree::from_bytes(&tree.to_bytes()?)?;
        assert_eq!(decoded, tree);
        assert_eq!(
            decoded.root().lookup(&["zPos"]).map(Node::value),
            Some(&Value::Int(-3))
        );
        Ok(())
    }

    #[test]
    fn test_wrapper_must_hold_one_node() -> Result<()> {
        // empty wrapper
        assert!(Tree::from_bytes(&[10, 0, 0, 0]).unwrap_err().is_format());

        // two children
        let mut two = Compound::new();
        two.put("a", 1i8)?;
        two.put("b", 2i8)?;
        let mut writer = NodeWriter::new(Vec::new());
        writer.write_node(&Node::compound("", two)?)?;
        let bytes = writer.into_inner();
        assert!(Tree::from_bytes(&bytes).unwrap_err().is_format());

        // not a compound at all
        assert!(Tree::from_bytes(&[1, 0, 0, 5]).unwrap_err().is_format());
        Ok(())
    }

    #[test]
    fn test_empty_stream() {
        assert!(Tree::from_bytes(&[]).unwrap_err().is_format());
        assert!(Tree::from_bytes(&[0]).unwrap_err().is_format());
    }
}
