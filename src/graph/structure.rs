//! Graph: an arena of concept nodes plus an index-based edge list

use super::edge::{Edge, UnorderedPair};
use super::node::{ConceptNode, NodeKey};
use crate::artifact::{ArtifactError, ArtifactResult, GraphArtifact, GraphNodeRecord};
use std::collections::HashMap;

/// A simple, undirected, weighted concept graph.
///
/// Invariants held by every constructor:
/// - node keys are unique
/// - no self-loops, at most one edge per unordered pair
/// - both endpoints of every edge are in the node set
/// - each node's `degree` equals its incident edge count
///
/// Graphs are built by [`fuse`](super::fuse) or reloaded with
/// [`Graph::from_artifact`] and are not mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    nodes: Vec<ConceptNode>,
    index: HashMap<NodeKey, usize>,
    edges: Vec<Edge>,
    /// `(source_idx, target_idx)` for each entry in `edges`
    endpoints: Vec<(usize, usize)>,
    pairs: HashMap<UnorderedPair, usize>,
}

impl Graph {
    /// Create a graph with the given nodes and no edges.
    ///
    /// Later nodes with a key already present are ignored.
    pub(crate) fn with_nodes(nodes: Vec<ConceptNode>) -> Self {
        let mut graph = Self::default();
        for node in nodes {
            graph.insert_node(node);
        }
        graph
    }

    /// Insert a node; returns false if the key was already present.
    fn insert_node(&mut self, mut node: ConceptNode) -> bool {
        if self.index.contains_key(&node.key) {
            return false;
        }
        node.degree = 0;
        self.index.insert(node.key.clone(), self.nodes.len());
        self.nodes.push(node);
        true
    }

    /// Insert an edge if both endpoints exist and the pair is free.
    pub(crate) fn try_insert_edge(&mut self, edge: Edge) -> Result<(), EdgeRejection> {
        let (Some(&s), Some(&t)) = (self.index.get(&edge.source), self.index.get(&edge.target))
        else {
            return Err(EdgeRejection::Dangling);
        };
        let pair = edge.pair();
        if pair.is_loop() {
            return Err(EdgeRejection::SelfLoop);
        }
        if self.pairs.contains_key(&pair) {
            return Err(EdgeRejection::Occupied);
        }
        self.pairs.insert(pair, self.edges.len());
        self.edges.push(edge);
        self.endpoints.push((s, t));
        Ok(())
    }

    /// Recompute every node's degree from the edge set.
    pub(crate) fn recompute_degrees(&mut self) {
        for node in &mut self.nodes {
            node.degree = 0;
        }
        for &(s, t) in &self.endpoints {
            self.nodes[s].degree += 1;
            self.nodes[t].degree += 1;
        }
    }

    /// All nodes, in insertion order
    pub fn nodes(&self) -> &[ConceptNode] {
        &self.nodes
    }

    /// All edges, in insertion order
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edges as `(source_idx, target_idx, edge)` node-index triples.
    pub fn indexed_edges(&self) -> impl Iterator<Item = (usize, usize, &Edge)> {
        self.endpoints
            .iter()
            .zip(self.edges.iter())
            .map(|(&(s, t), e)| (s, t, e))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.index.contains_key(key)
    }

    /// Arena index of a node
    pub fn index_of(&self, key: &NodeKey) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn get_node(&self, key: &NodeKey) -> Option<&ConceptNode> {
        self.index_of(key).map(|i| &self.nodes[i])
    }

    /// The edge between two nodes, in either orientation.
    pub fn edge_between(&self, a: &NodeKey, b: &NodeKey) -> Option<&Edge> {
        let pair = UnorderedPair::new(a.clone(), b.clone());
        self.pairs.get(&pair).map(|&i| &self.edges[i])
    }

    pub fn has_edge(&self, a: &NodeKey, b: &NodeKey) -> bool {
        self.edge_between(a, b).is_some()
    }

    /// Incident edge count of a node
    pub fn degree(&self, key: &NodeKey) -> Option<usize> {
        self.get_node(key).map(|n| n.degree)
    }

    /// Convert to the node-link artifact. `size` carries the degree.
    pub fn to_artifact(&self) -> GraphArtifact {
        GraphArtifact {
            nodes: self
                .nodes
                .iter()
                .map(|n| GraphNodeRecord {
                    id: n.key.as_str().to_string(),
                    label: Some(n.label.clone()),
                    description: n.description.clone(),
                    size: n.degree,
                })
                .collect(),
            edges: self.edges.clone(),
        }
    }

    /// Rebuild a graph from its node-link artifact.
    ///
    /// Every graph invariant is re-checked; any violation is `Malformed`.
    /// Persisted `size` values are ignored and degree is recomputed.
    pub fn from_artifact(artifact: &GraphArtifact) -> ArtifactResult<Self> {
        let mut graph = Self::default();
        for record in &artifact.nodes {
            let key = NodeKey::canonicalize(&record.id).ok_or_else(|| {
                ArtifactError::Malformed("graph node with blank id".to_string())
            })?;
            let node = ConceptNode {
                key,
                label: record.label.clone().unwrap_or_else(|| record.id.clone()),
                description: record.description.clone(),
                embedding: None,
                degree: 0,
            };
            if !graph.insert_node(node) {
                return Err(ArtifactError::Malformed(format!(
                    "duplicate graph node '{}'",
                    record.id
                )));
            }
        }

        for edge in &artifact.edges {
            if !edge.weight.is_finite() || !(0.0..=1.0).contains(&edge.weight) {
                return Err(ArtifactError::Malformed(format!(
                    "edge {} - {} has weight {} outside [0, 1]",
                    edge.source, edge.target, edge.weight
                )));
            }
            let canonical = Edge {
                source: canonical_endpoint(&edge.source)?,
                target: canonical_endpoint(&edge.target)?,
                ..edge.clone()
            };
            graph.try_insert_edge(canonical).map_err(|reason| {
                ArtifactError::Malformed(format!(
                    "edge {} - {} rejected: {}",
                    edge.source, edge.target, reason
                ))
            })?;
        }

        graph.recompute_degrees();
        Ok(graph)
    }
}

fn canonical_endpoint(key: &NodeKey) -> ArtifactResult<NodeKey> {
    NodeKey::canonicalize(key.as_str())
        .ok_or_else(|| ArtifactError::Malformed("edge with blank endpoint".to_string()))
}

/// Why an edge was not inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EdgeRejection {
    Dangling,
    SelfLoop,
    Occupied,
}

impl std::fmt::Display for EdgeRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeRejection::Dangling => write!(f, "endpoint not in node set"),
            EdgeRejection::SelfLoop => write!(f, "self-loop"),
            EdgeRejection::Occupied => write!(f, "pair already has an edge"),
        }
    }
}
