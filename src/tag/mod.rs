//! Tagged binary tree codec
//!
//! A self-describing format of named, typed nodes. Each chunk stored in a
//! region file is one [`Tree`] in this format.
//!
//! # Architecture
//!
//! ```text
//! Tree
//!   └─→ Node("Level", Compound)
//!        ├─→ Node("xPos", Int)
//!        ├─→ Node("Blocks", ByteArray)
//!        └─→ Node("Entities", List<Compound>)
//!              └─→ Compound { Node("id", String), ... }
//! ```
//!
//! Node kinds form a closed set fixed by the wire format, so a node's
//! payload is the [`Value`] enum rather than a trait object. Parents own
//! their children outright.

pub mod io;
pub mod kind;
pub mod node;
pub mod tree;
pub mod value;

pub use io::{NodeReader, NodeWriter, MAX_DEPTH};
pub use kind::NodeKind;
pub use node::Node;
pub use tree::Tree;
pub use value::{Compound, List, Value, MAX_STRING_LEN};
