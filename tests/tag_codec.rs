//! Wire-format tests for the tagged tree codec

use voxelstore::error::Result;
use voxelstore::tag::{NodeReader, NodeWriter};
use voxelstore::{Compound, List, Node, NodeKind, Tree, Value};

/// `hello world` document: a named compound with one string child
const HELLO_WORLD: &[u8] = &[
    0x0A, 0x00, 0x0B, b'h', b'e', b'l', b'l', b'o', b' ', b'w', b'o', b'r', b'l', b'd', // compound
    0x08, 0x00, 0x04, b'n', b'a', b'm', b'e', // string "name"
    0x00, 0x09, b'B', b'a', b'n', b'a', b'n', b'r', b'a', b'm', b'a', // "Bananrama"
    0x00, // end of compound
];

#[test]
fn test_decode_known_document() -> Result<()> {
    let mut reader = NodeReader::new(HELLO_WORLD);
    let node = reader.read_node()?.expect("document root");

    assert_eq!(node.name(), "hello world");
    assert_eq!(node.kind(), NodeKind::Compound);
    let name = node.as_compound().and_then(|c| c.get_value("name"));
    assert_eq!(name.and_then(Value::as_str), Some("Bananrama"));

    let mut out = Vec::new();
    NodeWriter::new(&mut out).write_node(&node)?;
    assert_eq!(out, HELLO_WORLD);
    Ok(())
}

#[test]
fn test_tree_framing_wraps_document() -> Result<()> {
    let mut framed = vec![0x0A, 0x00, 0x00];
    framed.extend_from_slice(HELLO_WORLD);
    framed.push(0x00);

    let tree = Tree::from_bytes(&framed)?;
    assert_eq!(tree.root().name(), "hello world");
    assert_eq!(tree.to_bytes()?, framed);
    Ok(())
}

#[test]
fn test_nested_document_round_trip() -> Result<()> {
    let mut matrix = List::of_kind(NodeKind::List);
    for row in 0..3 {
        matrix.push(List::from_values((0..3).map(|col| Value::from(row * 3 + col)))?)?;
    }

    let mut inventory = List::new();
    for slot in 0..2i8 {
        let mut item = Compound::new();
        item.put("Slot", slot)?;
        item.put("id", "minecraft:stone")?;
        item.put("Count", 64i8)?;
        inventory.push(item)?;
    }

    let mut player = Compound::new();
    player.put("Health", 20.0f32)?;
    player.put("Pos", List::from_values([1.5f64, 64.0, -3.25].map(Value::from))?)?;
    player.put("Inventory", inventory)?;
    player.put("Matrix", matrix)?;
    player.put("Empty", List::new())?;
    player.put("Nothing", Compound::new())?;
    player.put("Unicode", "caf\u{e9} \u{1F600}")?;

    let tree = Tree::new(Node::compound("Player", player)?);
    let bytes = tree.to_bytes()?;
    let decoded = Tree::from_bytes(&bytes)?;
    assert_eq!(decoded, tree);

    let health = decoded.root().lookup(&["Health"]).map(Node::value);
    assert_eq!(health.and_then(Value::as_f32), Some(20.0));
    let slots = decoded
        .root()
        .lookup(&["Inventory"])
        .and_then(Node::as_list)
        .map(List::len);
    assert_eq!(slots, Some(2));
    Ok(())
}

#[test]
fn test_malformed_streams_are_format_errors() {
    // unknown tag
    assert!(NodeReader::new(&[0x0Cu8, 0x00, 0x00][..])
        .read_node()
        .unwrap_err()
        .is_format());

    // truncated in the middle of the name
    assert!(NodeReader::new(&HELLO_WORLD[..6])
        .read_node()
        .unwrap_err()
        .is_format());

    // missing end of compound
    assert!(NodeReader::new(&HELLO_WORLD[..HELLO_WORLD.len() - 1])
        .read_node()
        .unwrap_err()
        .is_format());
}

#[test]
fn test_overlong_names_are_range_errors() {
    let name = "n".repeat(32_768);
    assert!(Node::new(name, 1i32).unwrap_err().is_range());

    let text = "\u{1F600}".repeat(16_384); // 32768 UTF-16 units
    assert!(Node::new("s", text).unwrap_err().is_range());
}
