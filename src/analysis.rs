//! Graph statistics and community detection over a fused graph

use crate::graph::{EdgeKind, Graph, NodeKey};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// A node and its degree, for ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedNode {
    pub key: NodeKey,
    pub label: String,
    pub degree: usize,
}

/// Summary counts for a graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub explicit_edges: usize,
    pub similarity_edges: usize,
    /// `2m / (n (n - 1))`; 0 for graphs with fewer than two nodes
    pub density: f64,
    /// Most connected nodes, degree descending, ties in node order
    pub most_connected: Vec<RankedNode>,
}

pub fn graph_stats(graph: &Graph, top: usize) -> GraphStats {
    let n = graph.node_count();
    let m = graph.edge_count();
    let explicit_edges = graph
        .edges()
        .iter()
        .filter(|e| e.kind == EdgeKind::Explicit)
        .count();

    let mut ranked: Vec<RankedNode> = graph
        .nodes()
        .iter()
        .map(|node| RankedNode {
            key: node.key.clone(),
            label: node.label.clone(),
            degree: node.degree,
        })
        .collect();
    // stable sort keeps node order among equal degrees
    ranked.sort_by(|a, b| b.degree.cmp(&a.degree));
    ranked.truncate(top);

    GraphStats {
        node_count: n,
        edge_count: m,
        explicit_edges,
        similarity_edges: m - explicit_edges,
        density: if n > 1 {
            2.0 * m as f64 / (n as f64 * (n as f64 - 1.0))
        } else {
            0.0
        },
        most_connected: ranked,
    }
}

/// Partition nodes into communities by greedy modularity agglomeration.
///
/// Starts from singletons and repeatedly merges the connected pair of
/// communities with the largest modularity gain (lowest indices win ties)
/// until no merge gains. Edges count as unweighted. Communities come back
/// largest first, members in node order; every node is in exactly one.
pub fn detect_communities(graph: &Graph) -> Vec<Vec<NodeKey>> {
    let n = graph.node_count();
    let m = graph.edge_count();
    let mut members: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();

    if m > 0 {
        let two_m = 2.0 * m as f64;
        let mut share: Vec<f64> = graph.nodes().iter().map(|n| n.degree as f64 / two_m).collect();
        // (i, j) with i < j -> fraction of edge ends running between them
        let mut between: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for (s, t, _) in graph.indexed_edges() {
            *between.entry((s.min(t), s.max(t))).or_default() += 1.0 / two_m;
        }

        loop {
            let mut best: Option<((usize, usize), f64)> = None;
            for (&(i, j), &e) in &between {
                let gain = 2.0 * (e - share[i] * share[j]);
                if gain > best.map_or(0.0, |(_, g)| g) {
                    best = Some(((i, j), gain));
                }
            }
            let Some(((keep, absorb), gain)) = best else {
                break;
            };
            debug!(keep, absorb, gain, "merging communities");

            let moved = std::mem::take(&mut members[absorb]);
            members[keep].extend(moved);
            share[keep] += share[absorb];
            share[absorb] = 0.0;

            let mut rewired = BTreeMap::new();
            for ((i, j), e) in std::mem::take(&mut between) {
                let i = if i == absorb { keep } else { i };
                let j = if j == absorb { keep } else { j };
                if i != j {
                    *rewired.entry((i.min(j), i.max(j))).or_default() += e;
                }
            }
            between = rewired;
        }
    }

    let mut communities: Vec<Vec<usize>> = members.into_iter().filter(|c| !c.is_empty()).collect();
    for community in &mut communities {
        community.sort_unstable();
    }
    communities.sort_by(|a, b| b.len().cmp(&a.len()).then(a[0].cmp(&b[0])));
    communities
        .into_iter()
        .map(|c| c.into_iter().map(|i| graph.nodes()[i].key.clone()).collect())
        .collect()
}

/// Newman modularity of a partition (unweighted).
pub fn modularity(graph: &Graph, communities: &[Vec<NodeKey>]) -> f64 {
    let m = graph.edge_count();
    if m == 0 {
        return 0.0;
    }
    let mut label = vec![usize::MAX; graph.node_count()];
    for (c, community) in communities.iter().enumerate() {
        for key in community {
            if let Some(i) = graph.index_of(key) {
                label[i] = c;
            }
        }
    }
    let two_m = 2.0 * m as f64;
    let mut internal = vec![0.0; communities.len()];
    let mut degree_sum = vec![0.0; communities.len()];
    for (i, node) in graph.nodes().iter().enumerate() {
        if let Some(d) = degree_sum.get_mut(label[i]) {
            *d += node.degree as f64;
        }
    }
    for (s, t, _) in graph.indexed_edges() {
        if label[s] == label[t] {
            if let Some(x) = internal.get_mut(label[s]) {
                *x += 1.0;
            }
        }
    }
    internal
        .iter()
        .zip(&degree_sum)
        .map(|(l, d)| l / m as f64 - (d / two_m).powi(2))
        .sum()
}
