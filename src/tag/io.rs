//! Reading and writing nodes over a byte stream
//!
//! Every node is encoded as a kind tag, a 16-bit name length, the UTF-8
//! name and then the kind-specific payload:
//!
//! ```text
//! Node:      [tag: u8][name_len: u16][name: utf8][payload]
//! Compound:  [child node]* [End tag]
//! List:      [element tag: u8][count: i32][payload]*count
//! ByteArray: [count: i32][bytes]
//! IntArray:  [count: i32][i32]*count
//! String:    [len: u16][utf8]
//! ```
//!
//! Multi-byte values use the byte order chosen by the `O` parameter;
//! [`NodeWriter::new`] and [`NodeReader::new`] default to big-endian.

use super::kind::NodeKind;
use super::node::Node;
use super::value::{Compound, List, Value};
use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use std::marker::PhantomData;

/// Deepest container nesting the reader accepts
pub const MAX_DEPTH: usize = 512;

/// Upper bound on speculative allocation from untrusted length prefixes
const PREALLOC_LIMIT: usize = 64 * 1024;

/// Map stream errors, treating a truncated stream as malformed input
fn read_err(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::Format("Truncated stream".to_string())
    } else {
        Error::Io(e)
    }
}

/// Writes nodes to a byte stream.
pub struct NodeWriter<W, O = BigEndian> {
    inner: W,
    _order: PhantomData<O>,
}

impl<W: Write> NodeWriter<W, BigEndian> {
    /// Create a big-endian writer
    pub fn new(inner: W) -> Self {
        Self::with_byte_order(inner)
    }
}

impl<W: Write, O: ByteOrder> NodeWriter<W, O> {
    /// Create a writer using byte order `O`
    pub fn with_byte_order(inner: W) -> Self {
        Self {
            inner,
            _order: PhantomData,
        }
    }

    /// Write a complete node: tag, name and payload
    pub fn write_node(&mut self, node: &Node) -> Result<()> {
        self.write_header(node.kind(), node.name())?;
        self.write_payload(node.value())
    }

    /// Write a tag and name; the payload must follow
    pub fn write_header(&mut self, kind: NodeKind, name: &str) -> Result<()> {
        self.inner.write_u8(kind.id())?;
        self.write_str(name)
    }

    /// Write the end-of-compound marker
    pub fn write_end(&mut self) -> Result<()> {
        self.inner.write_u8(NodeKind::End.id())?;
        Ok(())
    }

    /// Write a payload without tag or name
    pub fn write_payload(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Byte(v) => self.inner.write_i8(*v)?,
            Value::Short(v) => self.inner.write_i16::<O>(*v)?,
            Value::Int(v) => self.inner.write_i32::<O>(*v)?,
            Value::Long(v) => self.inner.write_i64::<O>(*v)?,
            Value::Float(v) => self.inner.write_f32::<O>(*v)?,
            Value::Double(v) => self.inner.write_f64::<O>(*v)?,
            Value::ByteArray(bytes) => {
                self.write_count(bytes.len())?;
                self.inner.write_all(bytes)?;
            }
            Value::String(s) => self.write_str(s)?,
            Value::List(list) => self.write_list(list)?,
            Value::Compound(compound) => self.write_compound(compound)?,
            Value::IntArray(ints) => {
                self.write_count(ints.len())?;
                for v in ints {
                    self.inner.write_i32::<O>(*v)?;
                }
            }
        }
        Ok(())
    }

    fn write_list(&mut self, list: &List) -> Result<()> {
        self.inner.write_u8(list.element_kind().id())?;
        self.write_count(list.len())?;
        for item in list {
            if item.kind() != list.element_kind() {
                return Err(Error::Range(format!(
                    "List of {} holds a {} element",
                    list.element_kind(),
                    item.kind()
                )));
            }
            self.write_payload(item)?;
        }
        Ok(())
    }

    fn write_compound(&mut self, compound: &Compound) -> Result<()> {
        for child in compound {
            self.write_node(child)?;
        }
        self.write_end()
    }

    fn write_str(&mut self, s: &str) -> Result<()> {
        let len = u16::try_from(s.len()).map_err(|_| {
            Error::Range(format!(
                "String of {} UTF-8 bytes does not fit a 16-bit length",
                s.len()
            ))
        })?;
        self.inner.write_u16::<O>(len)?;
        self.inner.write_all(s.as_bytes())?;
        Ok(())
    }

    fn write_count(&mut self, len: usize) -> Result<()> {
        let count = i32::try_from(len)
            .map_err(|_| Error::Range(format!("{} elements exceed a 32-bit count", len)))?;
        self.inner.write_i32::<O>(count)?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads nodes from a byte stream.
pub struct NodeReader<R, O = BigEndian> {
    inner: R,
    depth: usize,
    _order: PhantomData<O>,
}

impl<R: Read> NodeReader<R, BigEndian> {
    /// Create a big-endian reader
    pub fn new(inner: R) -> Self {
        Self::with_byte_order(inner)
    }
}

impl<R: Read, O: ByteOrder> NodeReader<R, O> {
    /// Create a reader using byte order `O`
    pub fn with_byte_order(inner: R) -> Self {
        Self {
            inner,
            depth: 0,
            _order: PhantomData,
        }
    }

    /// Read one node; `None` means an end marker was read
    pub fn read_node(&mut self) -> Result<Option<Node>> {
        let kind = NodeKind::from_id(self.inner.read_u8().map_err(read_err)?)?;
        if kind == NodeKind::End {
            return Ok(None);
        }
        let name = self.read_str()?;
        let value = self.read_payload(kind)?;
        Node::new(name, value)
            .map(Some)
            .map_err(|e| Error::Format(e.to_string()))
    }

    /// Read a payload of the given kind without tag or name
    pub fn read_payload(&mut self, kind: NodeKind) -> Result<Value> {
        let value = match kind {
            NodeKind::End => {
                return Err(Error::Format("End tag has no payload".to_string()));
            }
            NodeKind::Byte => Value::Byte(self.inner.read_i8().map_err(read_err)?),
            NodeKind::Short => Value::Short(self.inner.read_i16::<O>().map_err(read_err)?),
            NodeKind::Int => Value::Int(self.inner.read_i32::<O>().map_err(read_err)?),
            NodeKind::Long => Value::Long(self.inner.read_i64::<O>().map_err(read_err)?),
            NodeKind::Float => Value::Float(self.inner.read_f32::<O>().map_err(read_err)?),
            NodeKind::Double => Value::Double(self.inner.read_f64::<O>().map_err(read_err)?),
            NodeKind::ByteArray => {
                let len = self.read_count()?;
                let mut bytes = Vec::with_capacity(len.min(PREALLOC_LIMIT));
                (&mut self.inner)
                    .take(len as u64)
                    .read_to_end(&mut bytes)
                    .map_err(read_err)?;
                if bytes.len() != len {
                    return Err(Error::Format(format!(
                        "Byte array truncated: expected {} bytes, got {}",
                        len,
                        bytes.len()
                    )));
                }
                Value::ByteArray(bytes)
            }
            NodeKind::String => Value::String(self.read_str()?),
            NodeKind::List => {
                self.enter()?;
                let list = self.read_list();
                self.depth -= 1;
                Value::List(list?)
            }
            NodeKind::Compound => {
                self.enter()?;
                let compound = self.read_compound();
                self.depth -= 1;
                Value::Compound(compound?)
            }
            NodeKind::IntArray => {
                let len = self.read_count()?;
                let mut ints = Vec::with_capacity(len.min(PREALLOC_LIMIT / 4));
                for _ in 0..len {
                    ints.push(self.inner.read_i32::<O>().map_err(read_err)?);
                }
                Value::IntArray(ints)
            }
        };
        Ok(value)
    }

    fn read_list(&mut self) -> Result<List> {
        let element_kind = NodeKind::from_id(self.inner.read_u8().map_err(read_err)?)?;
        let len = self.read_count()?;
        if element_kind == NodeKind::End && len > 0 {
            return Err(Error::Format(format!(
                "List of {} elements declares End element kind",
                len
            )));
        }
        let mut items = Vec::with_capacity(len.min(PREALLOC_LIMIT / 8));
        for _ in 0..len {
            let item = self.read_payload(element_kind)?;
            item.check().map_err(|e| Error::Format(e.to_string()))?;
            items.push(item);
        }
        Ok(List::from_parts(element_kind, items))
    }

    fn read_compound(&mut self) -> Result<Compound> {
        let mut compound = Compound::new();
        while let Some(child) = self.read_node()? {
            compound.insert(child);
        }
        Ok(compound)
    }

    fn read_str(&mut self) -> Result<String> {
        let len = self.inner.read_u16::<O>().map_err(read_err)? as usize;
        let mut bytes = vec![0u8; len];
        self.inner.read_exact(&mut bytes).map_err(read_err)?;
        String::from_utf8(bytes).map_err(|e| Error::Format(format!("Invalid UTF-8 string: {}", e)))
    }

    fn read_count(&mut self) -> Result<usize> {
        let count = self.inner.read_i32::<O>().map_err(read_err)?;
        usize::try_from(count).map_err(|_| Error::Format(format!("Negative element count: {}", count)))
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth >= MAX_DEPTH {
            return Err(Error::Format(format!(
                "Nesting deeper than {} levels",
                MAX_DEPTH
            )));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::LittleEndian;

    fn encode(node: &Node) -> Vec<u8> {
        let mut writer = NodeWriter::new(Vec::new());
        writer.write_node(node).unwrap();
        writer.into_inner()
    }

    fn decode(bytes: &[u8]) -> Result<Option<Node>> {
        NodeReader::new(bytes).read_node()
    }

    #[test]
    fn test_int_wire_layout() -> Result<()> {
        let node = Node::new("hp", 258i32)?;
        assert_eq!(
            encode(&node),
            vec![3, 0, 2, b'h', b'p', 0x00, 0x00, 0x01, 0x02]
        );
        Ok(())
    }

    #[test]
    fn test_mixed_list_is_not_written() -> Result<()> {
        let list = List::from_parts(NodeKind::Int, vec![Value::String("oops".into()), Value::Int(2)]);
        let node = Node::list("mixed", list)?;
        let mut writer = NodeWriter::new(Vec::new());
        assert!(writer.write_node(&node).unwrap_err().is_range());
        Ok(())
    }

    #[test]
    fn test_string_and_list_layout() -> Result<()> {
        let node = Node::new("s", "ab")?;
        assert_eq!(encode(&node), vec![8, 0, 1, b's', 0, 2, b'a', b'b']);

        let list = List::from_values(vec![1i16, -1i16])?;
        let node = Node::list("l", list)?;
        assert_eq!(
            encode(&node),
            vec![9, 0, 1, b'l', 2, 0, 0, 0, 2, 0x00, 0x01, 0xFF, 0xFF]
        );
        Ok(())
    }

    #[test]
    fn test_empty_compound_layout() -> Result<()> {
        let node = Node::compound("", Compound::new())?;
        assert_eq!(encode(&node), vec![10, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn test_roundtrip_every_kind() -> Result<()> {
        let mut compound = Compound::new();
        compound.put("byte", -5i8)?;
        compound.put("short", i16::MIN)?;
        compound.put("int", i32::MAX)?;
        compound.put("long", -1i64)?;
        compound.put("float", 1.25f32)?;
        compound.put("double", -0.5f64)?;
        compound.put("bytes", vec![0u8, 255, 7])?;
        compound.put("empty_bytes", Vec::<u8>::new())?;
        compound.put("string", "héllo wörld")?;
        compound.put("empty_string", "")?;
        compound.put("ints", vec![1i32, -2, 3])?;
        compound.put("empty_ints", Vec::<i32>::new())?;
        compound.put("empty_list", List::new())?;
        compound.put("typed_empty_list", List::of_kind(NodeKind::Double))?;
        compound.put("empty_compound", Compound::new())?;

        let mut nested_list = List::new();
        for i in 0..3 {
            let mut element = Compound::new();
            element.put("i", i)?;
            element.put("deeper", List::from_values(vec![vec![i as u8]])?)?;
            nested_list.push(element)?;
        }
        compound.put("sections", nested_list)?;

        let node = Node::compound("Level", compound)?;
        let decoded = decode(&encode(&node))?.expect("node");
        assert_eq!(decoded, node);
        Ok(())
    }

    #[test]
    fn test_roundtrip_little_endian() -> Result<()> {
        let node = Node::new("v", vec![1i32, 0x01020304])?;
        let mut writer = NodeWriter::<_, LittleEndian>::with_byte_order(Vec::new());
        writer.write_node(&node)?;
        let bytes = writer.into_inner();
        assert_eq!(&bytes[1..3], &[1, 0]);

        let mut reader = NodeReader::<_, LittleEndian>::with_byte_order(&bytes[..]);
        assert_eq!(reader.read_node()?, Some(node));
        Ok(())
    }

    #[test]
    fn test_deeply_nested_roundtrip() -> Result<()> {
        let mut node = Node::compound("leaf", Compound::new())?;
        for depth in 0..100 {
            let mut parent = Compound::new();
            parent.insert(node);
            node = Node::compound(format!("level{}", depth), parent)?;
        }
        let decoded = decode(&encode(&node))?.expect("node");
        assert_eq!(decoded, node);
        Ok(())
    }

    #[test]
    fn test_end_tag_reads_as_none() -> Result<()> {
        assert!(decode(&[0])?.is_none());
        Ok(())
    }

    #[test]
    fn test_unknown_tag_is_format_error() {
        let err = decode(&[42, 0, 0]).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_truncated_stream_is_format_error() -> Result<()> {
        let bytes = encode(&Node::new("long", 7i64)?);
        for cut in 1..bytes.len() {
            let err = decode(&bytes[..cut]).unwrap_err();
            assert!(err.is_format(), "cut at {}: {}", cut, err);
        }
        assert!(decode(&[]).unwrap_err().is_format());
        Ok(())
    }

    #[test]
    fn test_truncated_byte_array() {
        // declares 10 bytes, provides 2
        let bytes = [7, 0, 0, 0, 0, 0, 10, 1, 2];
        assert!(decode(&bytes).unwrap_err().is_format());
    }

    #[test]
    fn test_negative_count_is_format_error() {
        let bytes = [11, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF];
        assert!(decode(&bytes).unwrap_err().is_format());
    }

    #[test]
    fn test_list_with_end_kind_and_elements_rejected() {
        let bytes = [9, 0, 0, 0, 0, 0, 0, 1];
        assert!(decode(&bytes).unwrap_err().is_format());
    }

    #[test]
    fn test_nesting_limit() {
        // a chain of unnamed lists of lists, deeper than the reader allows
        let mut bytes = vec![9, 0, 0];
        for _ in 0..MAX_DEPTH + 1 {
            bytes.extend_from_slice(&[9, 0, 0, 0, 1]);
        }
        let err = decode(&bytes).unwrap_err();
        assert!(err.is_format());
        assert!(err.to_string().contains("Nesting"));
    }

    #[test]
    fn test_invalid_utf8_name() {
        let bytes = [1, 0, 1, 0xFF, 5];
        assert!(decode(&bytes).unwrap_err().is_format());
    }

    #[test]
    fn test_oversized_utf8_string_fails_on_write() -> Result<()> {
        // within the UTF-16 limit but beyond a 16-bit byte length
        let s = "€".repeat(30000);
        let node = Node::new("s", s)?;
        let mut writer = NodeWriter::new(Vec::new());
        assert!(writer.write_node(&node).unwrap_err().is_range());
        Ok(())
    }
}
