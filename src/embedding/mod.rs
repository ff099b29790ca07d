//! Embedding vectors for concept nodes
//!
//! The embedding model is an injected collaborator (`Embedder`) so the
//! pipeline can run against fastembed in production and deterministic
//! fixtures in tests. Vectors can also be attached from a precomputed
//! "nodes with embeddings" artifact.

mod similarity;

pub use similarity::{
    cosine_similarity, MissingEmbedding, MissingReason, SimilarityEngine, SimilarityError,
    SimilarityReport, SimilarityResult,
};

use crate::artifact::{EmbeddedNodeRecord, EmbeddedNodes};
use crate::graph::{ConceptNode, NodeKey};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding model produced no vectors")]
    EmptyResult,

    #[error("embedding model produced {got} vectors for {expected} texts")]
    CountMismatch { expected: usize, got: usize },

    #[error("embedding model failed: {0}")]
    ModelError(String),
}

/// Text-to-vector model used for node embeddings.
///
/// One call per batch; vectors come back in input order.
pub trait Embedder: Send + Sync {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Embed every node in one batch and attach the vectors in place.
///
/// Identity is untouched; only `embedding` is set.
pub fn attach_embeddings(
    nodes: &mut [ConceptNode],
    embedder: &dyn Embedder,
) -> Result<(), EmbeddingError> {
    if nodes.is_empty() {
        return Ok(());
    }
    let texts: Vec<String> = nodes.iter().map(ConceptNode::embedding_text).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let vectors = embedder.embed_batch(&refs)?;
    if vectors.len() != nodes.len() {
        return Err(EmbeddingError::CountMismatch {
            expected: nodes.len(),
            got: vectors.len(),
        });
    }
    for (node, vector) in nodes.iter_mut().zip(vectors) {
        node.embedding = Some(vector);
    }
    info!(nodes = nodes.len(), "attached embeddings");
    Ok(())
}

/// Attach vectors from a precomputed artifact, matched by canonical key.
///
/// The first record for a key wins. Returns how many nodes received a
/// vector; the rest keep whatever they had (usually nothing).
pub fn attach_precomputed(nodes: &mut [ConceptNode], records: &EmbeddedNodes) -> usize {
    let mut lookup: HashMap<NodeKey, &Vec<f32>> = HashMap::new();
    for record in &records.0 {
        let (Some(key), Some(vector)) = (NodeKey::canonicalize(&record.id), &record.embedding)
        else {
            continue;
        };
        lookup.entry(key).or_insert(vector);
    }

    let mut attached = 0;
    for node in nodes.iter_mut() {
        if let Some(vector) = lookup.get(&node.key) {
            node.embedding = Some((*vector).clone());
            attached += 1;
        }
    }
    debug!(attached, total = nodes.len(), "attached precomputed embeddings");
    attached
}

/// Snapshot nodes as the "nodes with embeddings" artifact.
pub fn to_embedded_nodes(nodes: &[ConceptNode]) -> EmbeddedNodes {
    EmbeddedNodes(
        nodes
            .iter()
            .map(|n| EmbeddedNodeRecord {
                id: n.key.as_str().to_string(),
                description: n.description.clone(),
                embedding: n.embedding.clone(),
            })
            .collect(),
    )
}

#[cfg(feature = "embeddings")]
mod fastembed_impl {
    use super::{Embedder, EmbeddingError};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    fn model_error(e: impl std::fmt::Display) -> EmbeddingError {
        EmbeddingError::ModelError(e.to_string())
    }

    /// Sentence embedder running a fastembed ONNX model.
    ///
    /// `TextEmbedding::embed` takes `&mut self`, hence the lock.
    pub struct FastEmbedEmbedder {
        inner: Mutex<TextEmbedding>,
        model_name: String,
    }

    impl FastEmbedEmbedder {
        /// Load one of the supported models by its configured name.
        pub fn from_model_name(name: &str) -> Result<Self, EmbeddingError> {
            let model = match name {
                "all-MiniLM-L6-v2" => EmbeddingModel::AllMiniLML6V2,
                "all-MiniLM-L12-v2" => EmbeddingModel::AllMiniLML12V2,
                "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
                "nomic-embed-text-v1.5" => EmbeddingModel::NomicEmbedTextV15,
                other => {
                    return Err(EmbeddingError::ModelError(format!(
                        "unsupported embedding model '{}'",
                        other
                    )))
                }
            };
            let inner = TextEmbedding::try_new(
                InitOptions::new(model).with_show_download_progress(false),
            )
            .map_err(model_error)?;
            Ok(Self {
                inner: Mutex::new(inner),
                model_name: name.to_string(),
            })
        }

        pub fn model_name(&self) -> &str {
            &self.model_name
        }
    }

    impl Embedder for FastEmbedEmbedder {
        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let mut inner = self
                .inner
                .lock()
                .map_err(|_| model_error("model lock poisoned"))?;
            let vectors = inner.embed(texts.to_vec(), None).map_err(model_error)?;
            if vectors.is_empty() {
                Err(EmbeddingError::EmptyResult)
            } else {
                Ok(vectors)
            }
        }
    }
}

#[cfg(feature = "embeddings")]
pub use fastembed_impl::FastEmbedEmbedder;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Vectors keyed by the full embedding text
    struct FixtureEmbedder {
        table: HashMap<String, Vec<f32>>,
        calls: Arc<AtomicUsize>,
    }

    impl Embedder for FixtureEmbedder {
        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(texts
                .iter()
                .map(|t| self.table.get(*t).cloned().unwrap_or_else(|| vec![0.0; 2]))
                .collect())
        }
    }

    struct ShortEmbedder;

    impl Embedder for ShortEmbedder {
        fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(vec![vec![1.0, 0.0]])
        }
    }

    fn node(id: &str, desc: &str) -> ConceptNode {
        ConceptNode::new(id, desc).unwrap()
    }

    #[test]
    fn attaches_vectors_in_one_batch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut vectors = HashMap::new();
        vectors.insert("Travel: moving around".to_string(), vec![0.9, 0.1]);
        vectors.insert("Voyage: a long trip".to_string(), vec![0.8, 0.2]);
        let embedder = FixtureEmbedder {
            table: vectors,
            calls: calls.clone(),
        };

        let mut nodes = vec![node("Travel", "moving around"), node("Voyage", "a long trip")];
        attach_embeddings(&mut nodes, &embedder).unwrap();

        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(nodes[0].embedding.as_deref(), Some(&[0.9f32, 0.1][..]));
        assert_eq!(nodes[1].key.as_str(), "voyage");
    }

    #[test]
    fn count_mismatch_is_an_error() {
        let mut nodes = vec![node("a", ""), node("b", "")];
        let err = attach_embeddings(&mut nodes, &ShortEmbedder).unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::CountMismatch { expected: 2, got: 1 }
        ));
        assert!(nodes.iter().all(|n| n.embedding.is_none()));
    }

    #[test]
    fn empty_node_list_skips_the_model() {
        let calls = Arc::new(AtomicUsize::new(0));
        let embedder = FixtureEmbedder {
            table: HashMap::new(),
            calls: calls.clone(),
        };
        attach_embeddings(&mut [], &embedder).unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn precomputed_vectors_match_by_canonical_key() {
        let records = EmbeddedNodes(vec![
            EmbeddedNodeRecord {
                id: " Gradient Descent".to_string(),
                description: String::new(),
                embedding: Some(vec![1.0, 0.0]),
            },
            EmbeddedNodeRecord {
                id: "gradient descent".to_string(),
                description: String::new(),
                embedding: Some(vec![0.0, 1.0]),
            },
            EmbeddedNodeRecord {
                id: "orphan".to_string(),
                description: String::new(),
                embedding: Some(vec![0.5, 0.5]),
            },
        ]);
        let mut nodes = vec![node("Gradient Descent", ""), node("Backpropagation", "")];

        let attached = attach_precomputed(&mut nodes, &records);

        assert_eq!(attached, 1);
        assert_eq!(nodes[0].embedding.as_deref(), Some(&[1.0f32, 0.0][..]));
        assert!(nodes[1].embedding.is_none());
    }

    #[test]
    fn snapshot_keeps_missing_vectors_missing() {
        let nodes = vec![node("a", "x").with_embedding(vec![1.0]), node("b", "y")];
        let snapshot = to_embedded_nodes(&nodes);
        assert_eq!(snapshot.0[0].embedding, Some(vec![1.0]));
        assert!(snapshot.0[1].embedding.is_none());
    }

    #[cfg(feature = "embeddings")]
    #[test]
    #[ignore] // downloads the model
    fn minilm_embeds_node_text() {
        let embedder = FastEmbedEmbedder::from_model_name("all-MiniLM-L6-v2").unwrap();
        let mut nodes = vec![node("Entropy", "uncertainty"), node("Information", "bits")];
        attach_embeddings(&mut nodes, &embedder).unwrap();
        assert!(nodes.iter().all(|n| n.embedding.as_ref().map_or(false, |v| v.len() == 384)));
    }

    #[cfg(feature = "embeddings")]
    #[test]
    fn unknown_model_name_is_rejected() {
        assert!(matches!(
            FastEmbedEmbedder::from_model_name("word2vec"),
            Err(EmbeddingError::ModelError(_))
        ));
    }
}
