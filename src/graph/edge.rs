//! Undirected weighted edges between concepts

use super::node::NodeKey;
use serde::{Deserialize, Serialize};

/// Relationship label carried by every similarity edge.
pub const SIMILARITY_RELATIONSHIP: &str = "semantically similar";

/// Weight of every explicit edge.
pub const EXPLICIT_WEIGHT: f64 = 1.0;

/// Where an edge came from.
///
/// Serialized with the legacy labels of the node-link format:
/// `llm` for explicit edges, `embedding` for similarity edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Asserted by the extraction collaborator
    #[serde(rename = "llm")]
    Explicit,
    /// Inferred from embedding cosine similarity
    #[serde(rename = "embedding")]
    Similarity,
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeKind::Explicit => write!(f, "explicit"),
            EdgeKind::Similarity => write!(f, "similarity"),
        }
    }
}

/// An unordered pair of node keys, stored with the smaller key first.
///
/// Two pairs are equal regardless of the order the keys were given in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnorderedPair(NodeKey, NodeKey);

impl UnorderedPair {
    pub fn new(a: NodeKey, b: NodeKey) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn is_loop(&self) -> bool {
        self.0 == self.1
    }

    pub fn keys(&self) -> (&NodeKey, &NodeKey) {
        (&self.0, &self.1)
    }
}

/// An edge of the fused graph.
///
/// `source`/`target` keep the orientation they were created with for
/// presentation only; equality of position in the graph is by
/// [`UnorderedPair`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeKey,
    pub target: NodeKey,
    /// Descriptive only, never used for equality
    pub relationship: String,
    /// 1.0 for explicit edges, cosine similarity for similarity edges
    pub weight: f64,
    #[serde(rename = "edge_type")]
    pub kind: EdgeKind,
}

impl Edge {
    /// Create an explicit edge with the fixed weight.
    pub fn explicit(source: NodeKey, target: NodeKey, relationship: impl Into<String>) -> Self {
        Self {
            source,
            target,
            relationship: relationship.into(),
            weight: EXPLICIT_WEIGHT,
            kind: EdgeKind::Explicit,
        }
    }

    /// Create a similarity edge weighted by the similarity value.
    pub fn similarity(source: NodeKey, target: NodeKey, similarity: f64) -> Self {
        Self {
            source,
            target,
            relationship: SIMILARITY_RELATIONSHIP.to_string(),
            weight: similarity,
            kind: EdgeKind::Similarity,
        }
    }

    /// The unordered endpoint pair this edge occupies.
    pub fn pair(&self) -> UnorderedPair {
        UnorderedPair::new(self.source.clone(), self.target.clone())
    }
}
