//! Core graph data structures

mod dedup;
mod edge;
mod fusion;
mod node;
mod structure;


pub use dedup::{deduplicate, DedupReport};
pub use edge::{Edge, EdgeKind, UnorderedPair, EXPLICIT_WEIGHT, SIMILARITY_RELATIONSHIP};
pub use fusion::{fuse, DanglingEdge, FusionReport};
pub use node::{ConceptNode, NodeKey};
pub use structure::Graph;
