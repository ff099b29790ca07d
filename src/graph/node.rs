//! Concept node representation

use serde::{Deserialize, Serialize};

/// Canonical identity of a concept: the case-folded, trimmed raw name.
///
/// Serializes as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeKey(String);

impl NodeKey {
    /// Canonicalize a raw concept name into a key.
    ///
    /// Returns `None` when nothing is left after trimming.
    pub fn canonicalize(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_lowercase()))
    }

    /// Wrap an already-canonical string without re-folding it.
    pub fn from_canonical(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A deduplicated concept in the graph.
///
/// Identity is `key`. Embeddings are attached after deduplication and
/// never change the key. `degree` is derived from the final edge set by
/// [`Graph`](super::Graph) and is zero until fusion runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptNode {
    /// Canonical key (unique across the node set)
    pub key: NodeKey,
    /// Display name, original casing of the first-seen record
    pub label: String,
    /// Free-text description of the first-seen record
    pub description: String,
    /// Embedding vector, if one was attached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Incident edge count, recomputed after fusion
    #[serde(default)]
    pub degree: usize,
}

impl ConceptNode {
    /// Create a node from a raw name. Returns `None` for blank names.
    pub fn new(raw_name: &str, description: impl Into<String>) -> Option<Self> {
        let key = NodeKey::canonicalize(raw_name)?;
        Some(Self {
            key,
            label: raw_name.trim().to_string(),
            description: description.into(),
            embedding: None,
            degree: 0,
        })
    }

    /// Attach an embedding vector
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Text handed to the embedding model: `"{label}: {description}"`.
    pub fn embedding_text(&self) -> String {
        format!("{}: {}", self.label, self.description)
    }
}
