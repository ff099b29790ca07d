//! Layout: one coordinate per graph node
//!
//! Nodes with embedding vectors are placed by a nonlinear projection of
//! those vectors. Nodes without one are placed by a force-directed layout
//! of the whole graph, rescaled into the projection's extent. If the
//! projection cannot run at all, every node is placed by the force layout.

mod force;
mod projection;

pub use force::{spring_layout, ForceParams};
pub use projection::{project, ProjectionParams};

use crate::artifact::{ArtifactError, ArtifactResult, LayoutArtifact};
use crate::graph::{ConceptNode, Graph, NodeKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from layout computation
#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error("layout failure: {0}")]
    Failure(String),
}

pub type LayoutResult<T> = Result<T, LayoutError>;

/// Layout settings. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// 2 or 3
    pub dimensions: usize,
    pub seed: u64,
    pub n_neighbors: usize,
    pub min_dist: f64,
    pub spread: f64,
    pub projection_epochs: usize,
    pub negative_samples: usize,
    pub force_iterations: usize,
    /// Optimal spring length for the force layout; `sqrt(1/n)` when unset
    pub spring_k: Option<f64>,
    /// Below this many embedded nodes the projection is skipped
    pub min_projection_points: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            dimensions: 3,
            seed: 42,
            n_neighbors: 15,
            min_dist: 0.3,
            spread: 1.0,
            projection_epochs: 200,
            negative_samples: 5,
            force_iterations: 100,
            spring_k: None,
            min_projection_points: 4,
        }
    }
}

impl LayoutConfig {
    /// Check ranges; the message names the offending field.
    pub fn validate(&self) -> Result<(), String> {
        if self.dimensions != 2 && self.dimensions != 3 {
            return Err(format!("layout.dimensions must be 2 or 3, got {}", self.dimensions));
        }
        if self.n_neighbors < 2 {
            return Err("layout.n_neighbors must be at least 2".to_string());
        }
        if !(self.spread.is_finite() && self.spread > 0.0) {
            return Err("layout.spread must be positive".to_string());
        }
        if !(self.min_dist.is_finite() && self.min_dist >= 0.0 && self.min_dist <= self.spread) {
            return Err("layout.min_dist must lie in [0, spread]".to_string());
        }
        if self.projection_epochs == 0 || self.force_iterations == 0 {
            return Err("layout iteration budgets must be positive".to_string());
        }
        if let Some(k) = self.spring_k {
            if !(k.is_finite() && k > 0.0) {
                return Err("layout.spring_k must be positive".to_string());
            }
        }
        Ok(())
    }

    fn projection_params(&self) -> ProjectionParams {
        ProjectionParams {
            dimensions: self.dimensions,
            n_neighbors: self.n_neighbors,
            min_dist: self.min_dist,
            spread: self.spread,
            epochs: self.projection_epochs,
            negative_samples: self.negative_samples,
            seed: self.seed,
        }
    }

    fn force_params(&self) -> ForceParams {
        ForceParams {
            dimensions: self.dimensions,
            k: self.spring_k,
            iterations: self.force_iterations,
            seed: self.seed,
        }
    }
}

/// Coordinates keyed by node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    pub dimensions: usize,
    pub coordinates: BTreeMap<NodeKey, Vec<f64>>,
}

impl Layout {
    pub fn get(&self, key: &NodeKey) -> Option<&[f64]> {
        self.coordinates.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// True when the key set equals the graph's node set exactly.
    pub fn covers(&self, graph: &Graph) -> bool {
        self.coordinates.len() == graph.node_count()
            && graph.nodes().iter().all(|n| self.coordinates.contains_key(&n.key))
    }

    pub fn to_artifact(&self) -> LayoutArtifact {
        LayoutArtifact(
            self.coordinates
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), v.clone()))
                .collect(),
        )
    }

    /// Load a layout for `graph`, checking dimensionality and key coverage.
    pub fn from_artifact(
        artifact: &LayoutArtifact,
        graph: &Graph,
        dimensions: usize,
    ) -> ArtifactResult<Self> {
        let mut coordinates = BTreeMap::new();
        for (id, point) in &artifact.0 {
            if point.len() != dimensions {
                return Err(ArtifactError::Malformed(format!(
                    "coordinate for '{}' has {} components, expected {}",
                    id,
                    point.len(),
                    dimensions
                )));
            }
            if point.iter().any(|x| !x.is_finite()) {
                return Err(ArtifactError::Malformed(format!(
                    "non-finite coordinate for '{}'",
                    id
                )));
            }
            let key = NodeKey::canonicalize(id)
                .ok_or_else(|| ArtifactError::Malformed("layout entry with blank key".to_string()))?;
            coordinates.insert(key, point.clone());
        }
        let layout = Self {
            dimensions,
            coordinates,
        };
        if !layout.covers(graph) {
            return Err(ArtifactError::Malformed(format!(
                "layout has {} entries but graph has {} nodes",
                layout.len(),
                graph.node_count()
            )));
        }
        Ok(layout)
    }
}

/// Which strategy placed the nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMethod {
    /// No nodes to place
    Empty,
    /// Every node placed by projection
    Projection,
    /// Projection for embedded nodes, force layout for the rest
    Mixed,
    /// Every node placed by force layout
    Force,
}

/// What a layout run did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutReport {
    pub method: LayoutMethod,
    pub projected: usize,
    pub fallback: usize,
    /// Why the projection was abandoned, if it was
    pub projection_failure: Option<String>,
}

/// Collect usable vectors from nodes, keyed by node.
pub fn vectors_of(nodes: &[ConceptNode]) -> HashMap<NodeKey, Vec<f32>> {
    nodes
        .iter()
        .filter_map(|n| n.embedding.as_ref().map(|v| (n.key.clone(), v.clone())))
        .collect()
}

/// Computes layouts with a fixed configuration.
#[derive(Debug, Clone)]
pub struct LayoutEngine {
    config: LayoutConfig,
    expected_dimension: Option<usize>,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> LayoutResult<Self> {
        config.validate().map_err(LayoutError::Failure)?;
        Ok(Self {
            config,
            expected_dimension: None,
        })
    }

    /// Only project vectors of this length; others are placed by topology.
    pub fn with_expected_dimension(mut self, dimension: Option<usize>) -> Self {
        self.expected_dimension = dimension;
        self
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Place every node of `graph`.
    ///
    /// `vectors` may cover any subset of the nodes; entries for unknown
    /// keys are ignored. Vectors with non-finite components, or whose
    /// length differs from the expected dimension (the first usable
    /// vector's length when none is set), are treated as absent.
    pub fn compute(
        &self,
        graph: &Graph,
        vectors: &HashMap<NodeKey, Vec<f32>>,
    ) -> LayoutResult<(Layout, LayoutReport)> {
        let dims = self.config.dimensions;
        if graph.is_empty() {
            return Ok((
                Layout {
                    dimensions: dims,
                    coordinates: BTreeMap::new(),
                },
                LayoutReport {
                    method: LayoutMethod::Empty,
                    projected: 0,
                    fallback: 0,
                    projection_failure: None,
                },
            ));
        }

        let (embedded, inputs) = self.usable_vectors(graph, vectors);
        let projection = self.try_project(&inputs);

        let mut coordinates = BTreeMap::new();
        let report = match projection {
            Ok(points) => {
                for (&i, point) in embedded.iter().zip(points.iter()) {
                    coordinates.insert(graph.nodes()[i].key.clone(), point.clone());
                }
                let missing: Vec<usize> = (0..graph.node_count())
                    .filter(|i| embedded.binary_search(i).is_err())
                    .collect();
                if !missing.is_empty() {
                    let topology = spring_layout(graph, self.config.force_params())?;
                    let placed: Vec<Vec<f64>> = missing.iter().map(|&i| topology[i].clone()).collect();
                    for (&i, point) in missing.iter().zip(fit_into_extent(&placed, &points)) {
                        coordinates.insert(graph.nodes()[i].key.clone(), point);
                    }
                    info!(
                        projected = embedded.len(),
                        fallback = missing.len(),
                        "placed nodes without embeddings by force layout"
                    );
                }
                LayoutReport {
                    method: if missing.is_empty() {
                        LayoutMethod::Projection
                    } else {
                        LayoutMethod::Mixed
                    },
                    projected: embedded.len(),
                    fallback: missing.len(),
                    projection_failure: None,
                }
            }
            Err(LayoutError::Failure(reason)) => {
                if inputs.is_empty() {
                    debug!("no embeddings available, using force layout");
                } else {
                    warn!(reason = %reason, "projection failed, falling back to force layout");
                }
                let topology = spring_layout(graph, self.config.force_params())?;
                for (node, point) in graph.nodes().iter().zip(topology) {
                    coordinates.insert(node.key.clone(), point);
                }
                LayoutReport {
                    method: LayoutMethod::Force,
                    projected: 0,
                    fallback: graph.node_count(),
                    projection_failure: Some(reason),
                }
            }
        };

        let layout = Layout {
            dimensions: dims,
            coordinates,
        };
        if !layout.covers(graph) {
            return Err(LayoutError::Failure(format!(
                "layout covers {} of {} nodes",
                layout.len(),
                graph.node_count()
            )));
        }
        Ok((layout, report))
    }

    /// Node indices (ascending) with a usable vector, and those vectors as f64.
    fn usable_vectors(
        &self,
        graph: &Graph,
        vectors: &HashMap<NodeKey, Vec<f32>>,
    ) -> (Vec<usize>, Vec<Vec<f64>>) {
        let mut expected = self.expected_dimension;
        let mut indices = Vec::new();
        let mut inputs = Vec::new();
        for (i, node) in graph.nodes().iter().enumerate() {
            let Some(v) = vectors.get(&node.key) else {
                continue;
            };
            if v.is_empty() || v.iter().any(|x| !x.is_finite()) {
                continue;
            }
            match expected {
                None => expected = Some(v.len()),
                Some(d) if d != v.len() => {
                    debug!(node = %node.key, "embedding length differs, placing by topology");
                    continue;
                }
                Some(_) => {}
            }
            indices.push(i);
            inputs.push(v.iter().map(|&x| f64::from(x)).collect());
        }
        (indices, inputs)
    }

    fn try_project(&self, inputs: &[Vec<f64>]) -> LayoutResult<Vec<Vec<f64>>> {
        let needed = self.config.min_projection_points.max(2);
        if inputs.len() < needed {
            return Err(LayoutError::Failure(format!(
                "{} embedded nodes, projection needs at least {}",
                inputs.len(),
                needed
            )));
        }
        project(inputs, &self.config.projection_params())
    }
}

/// Map `points` (centered in `[-1, 1]`) into the per-axis bounding box of `reference`.
fn fit_into_extent(points: &[Vec<f64>], reference: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let dims = reference.first().map_or(0, Vec::len);
    let bounds: Vec<(f64, f64)> = (0..dims)
        .map(|d| {
            let (lo, hi) = reference
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                    (lo.min(p[d]), hi.max(p[d]))
                });
            let half = (hi - lo) / 2.0;
            ((lo + hi) / 2.0, if half > 0.0 { half } else { 1.0 })
        })
        .collect();
    points
        .iter()
        .map(|p| {
            p.iter()
                .zip(&bounds)
                .map(|(x, (center, half))| center + x * half)
                .collect()
        })
        .collect()
}
