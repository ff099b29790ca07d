//! JSON artifacts exchanged with external collaborators
//!
//! Each artifact has a fixed wire shape and a `validate()` step run on
//! every load. A cached artifact that fails to parse or validate is
//! reported as `Malformed` and recomputed by the owning stage.

use crate::graph::Edge;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Relationship used when an extracted edge record omits one.
pub const DEFAULT_RELATIONSHIP: &str = "related to";

/// Errors raised while decoding or validating an artifact
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("malformed artifact: {0}")]
    Malformed(String),

    #[error("artifact JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for artifact operations
pub type ArtifactResult<T> = Result<T, ArtifactError>;

/// A persisted pipeline artifact.
pub trait Artifact: Serialize + DeserializeOwned {
    /// Check invariants serde cannot express.
    fn validate(&self) -> ArtifactResult<()>;

    /// Decode and validate in one step.
    fn decode(payload: &str) -> ArtifactResult<Self> {
        let value: Self = serde_json::from_str(payload)?;
        value.validate()?;
        Ok(value)
    }

    /// Encode as pretty JSON.
    fn encode(&self) -> ArtifactResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ---------------------------------------------------------------------------
// Raw concepts (extraction output)
// ---------------------------------------------------------------------------

/// A raw concept record as produced by the extraction collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawConceptRecord {
    pub id: String,
    #[serde(default)]
    pub description: String,
}

impl RawConceptRecord {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

fn default_relationship() -> String {
    DEFAULT_RELATIONSHIP.to_string()
}

/// A raw, unvalidated relation between two concept names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEdgeRecord {
    pub source: String,
    pub target: String,
    #[serde(default = "default_relationship")]
    pub relationship: String,
}

impl RawEdgeRecord {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relationship: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relationship: relationship.into(),
        }
    }
}

/// `{"nodes": [...], "edges": [...]}`; both arrays are required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawConcepts {
    pub nodes: Vec<RawConceptRecord>,
    pub edges: Vec<RawEdgeRecord>,
}

impl RawConcepts {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Append another batch, preserving order.
    pub fn extend(&mut self, other: RawConcepts) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
    }
}

impl Artifact for RawConcepts {
    fn validate(&self) -> ArtifactResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Nodes with embeddings
// ---------------------------------------------------------------------------

/// `{"id", "description", "embedding": [..]}`; the vector may be absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedNodeRecord {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// The list form of the embeddings artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddedNodes(pub Vec<EmbeddedNodeRecord>);

impl Artifact for EmbeddedNodes {
    fn validate(&self) -> ArtifactResult<()> {
        for record in &self.0 {
            if let Some(v) = &record.embedding {
                if v.iter().any(|x| !x.is_finite()) {
                    return Err(ArtifactError::Malformed(format!(
                        "non-finite embedding component for '{}'",
                        record.id
                    )));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fused graph (node-link form)
// ---------------------------------------------------------------------------

/// A node in the node-link form. `size` is the degree at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNodeRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub size: usize,
}

/// `{"nodes": [...], "edges": [...]}` as written for renderers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphArtifact {
    pub nodes: Vec<GraphNodeRecord>,
    pub edges: Vec<Edge>,
}

impl Artifact for GraphArtifact {
    fn validate(&self) -> ArtifactResult<()> {
        crate::graph::Graph::from_artifact(self).map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Node key -> `[x, y]` or `[x, y, z]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayoutArtifact(pub BTreeMap<String, Vec<f64>>);

impl Artifact for LayoutArtifact {
    fn validate(&self) -> ArtifactResult<()> {
        let mut dims: Option<usize> = None;
        for (key, point) in &self.0 {
            if point.len() != 2 && point.len() != 3 {
                return Err(ArtifactError::Malformed(format!(
                    "coordinate for '{}' has {} components",
                    key,
                    point.len()
                )));
            }
            if point.iter().any(|x| !x.is_finite()) {
                return Err(ArtifactError::Malformed(format!(
                    "non-finite coordinate for '{}'",
                    key
                )));
            }
            match dims {
                None => dims = Some(point.len()),
                Some(d) if d != point.len() => {
                    return Err(ArtifactError::Malformed(
                        "layout mixes 2D and 3D coordinates".to_string(),
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
