//! Pairwise cosine similarity over node embeddings
//!
//! Vectors are L2-normalized once, then every unordered pair is compared
//! by dot product. Rows of the comparison matrix are computed in parallel
//! and collected in row order, so the edge list does not depend on the
//! number of worker threads.

use crate::graph::{ConceptNode, Edge, NodeKey};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fatal similarity errors.
#[derive(Debug, Error, PartialEq)]
pub enum SimilarityError {
    #[error("embedding dimension mismatch for '{node}': expected {expected}, found {found}")]
    DimensionMismatch {
        expected: usize,
        found: usize,
        node: String,
    },

    #[error("similarity threshold must lie in (0, 1), got {0}")]
    InvalidThreshold(f64),
}

/// Result type for similarity operations
pub type SimilarityResult<T> = Result<T, SimilarityError>;

/// Why a node took no part in the comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum MissingReason {
    /// No vector attached
    Absent,
    /// Vector length differs from the configured dimension
    WrongDimension { expected: usize, found: usize },
    /// All components are zero
    ZeroNorm,
    /// A component is NaN or infinite
    NonFinite,
}

/// A node excluded from similarity computation.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingEmbedding {
    pub key: NodeKey,
    pub reason: MissingReason,
}

/// Outcome of a similarity run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimilarityReport {
    /// Dimensionality the vectors were compared at (None if nothing was comparable)
    pub dimension: Option<usize>,
    /// Nodes that took part
    pub compared: usize,
    /// Pairs evaluated
    pub pairs_evaluated: usize,
    /// Edges emitted
    pub edges_emitted: usize,
    /// Nodes excluded, in input order
    pub missing: Vec<MissingEmbedding>,
}

/// Cosine similarity between two vectors, computed in double precision.
///
/// Returns 0.0 when either vector has zero norm or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Emits similarity edges for node pairs whose cosine similarity is
/// strictly above a threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityEngine {
    threshold: f64,
    dimension: Option<usize>,
}

impl SimilarityEngine {
    /// Create an engine.
    ///
    /// - `threshold`: must lie strictly inside (0, 1)
    /// - `dimension`: expected vector length. When set, nodes with a
    ///   different length are excluded individually. When unset, the first
    ///   vector fixes the dimension and any disagreement is fatal.
    pub fn new(threshold: f64, dimension: Option<usize>) -> SimilarityResult<Self> {
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(SimilarityError::InvalidThreshold(threshold));
        }
        Ok(Self {
            threshold,
            dimension,
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Compute candidate similarity edges over `nodes`.
    ///
    /// Edges are ordered by `(i, j)` with `i < j` in input order, oriented
    /// from the earlier node to the later one.
    pub fn compute(&self, nodes: &[ConceptNode]) -> SimilarityResult<(Vec<Edge>, SimilarityReport)> {
        let mut report = SimilarityReport::default();
        let mut dimension = self.dimension;
        let mut usable: Vec<(&NodeKey, Vec<f64>)> = Vec::with_capacity(nodes.len());

        for node in nodes {
            let Some(vector) = node.embedding.as_deref().filter(|v| !v.is_empty()) else {
                report.missing.push(MissingEmbedding {
                    key: node.key.clone(),
                    reason: MissingReason::Absent,
                });
                continue;
            };

            match dimension {
                None => dimension = Some(vector.len()),
                Some(expected) if expected != vector.len() => {
                    if self.dimension.is_none() {
                        return Err(SimilarityError::DimensionMismatch {
                            expected,
                            found: vector.len(),
                            node: node.key.to_string(),
                        });
                    }
                    report.missing.push(MissingEmbedding {
                        key: node.key.clone(),
                        reason: MissingReason::WrongDimension {
                            expected,
                            found: vector.len(),
                        },
                    });
                    continue;
                }
                Some(_) => {}
            }

            match normalize(vector) {
                Ok(unit) => usable.push((&node.key, unit)),
                Err(reason) => report.missing.push(MissingEmbedding {
                    key: node.key.clone(),
                    reason,
                }),
            }
        }

        if !report.missing.is_empty() {
            warn!(
                missing = report.missing.len(),
                "nodes excluded from similarity computation"
            );
        }

        let n = usable.len();
        let threshold = self.threshold;
        let rows: Vec<Vec<Edge>> = (0..n)
            .into_par_iter()
            .map(|i| {
                let (key_i, vec_i) = &usable[i];
                let mut row = Vec::new();
                for (key_j, vec_j) in usable.iter().skip(i + 1) {
                    let sim: f64 = vec_i.iter().zip(vec_j.iter()).map(|(a, b)| a * b).sum();
                    if sim > threshold {
                        row.push(Edge::similarity((*key_i).clone(), (*key_j).clone(), sim.min(1.0)));
                    }
                }
                row
            })
            .collect();
        let edges: Vec<Edge> = rows.into_iter().flatten().collect();

        report.dimension = if n > 0 { dimension } else { None };
        report.compared = n;
        report.pairs_evaluated = n * n.saturating_sub(1) / 2;
        report.edges_emitted = edges.len();

        debug!(pairs = report.pairs_evaluated, "compared embedding pairs");
        info!(
            compared = n,
            edges = edges.len(),
            threshold,
            "computed similarity edges"
        );
        Ok((edges, report))
    }
}

/// L2-normalize in double precision.
fn normalize(vector: &[f32]) -> Result<Vec<f64>, MissingReason> {
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(MissingReason::NonFinite);
    }
    let norm = vector.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm == 0.0 {
        return Err(MissingReason::ZeroNorm);
    }
    Ok(vector.iter().map(|x| *x as f64 / norm).collect())
}
