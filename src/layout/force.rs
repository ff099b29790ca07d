//! Force-directed layout over graph topology
//!
//! Fruchterman-Reingold: every pair of nodes repels with `k²/d`, every
//! edge attracts with `w·d²/k`. Displacements are capped by a temperature
//! that cools linearly over a fixed iteration budget, then the result is
//! centered and scaled into `[-1, 1]`.

use super::{LayoutError, LayoutResult};
use crate::graph::Graph;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Minimum distance used in force terms, avoids division by zero.
const MIN_DISTANCE: f64 = 0.01;

/// Stop early once the mean per-node move drops below this.
const CONVERGENCE_THRESHOLD: f64 = 1e-4;

/// Parameters for one force-directed run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceParams {
    pub dimensions: usize,
    /// Optimal distance between nodes; `sqrt(1/n)` when unset
    pub k: Option<f64>,
    pub iterations: usize,
    pub seed: u64,
}

/// Lay out every node of `graph`. Positions are index-aligned with `graph.nodes()`.
///
/// Errors only if the simulation produced non-finite coordinates.
pub fn spring_layout(graph: &Graph, params: ForceParams) -> LayoutResult<Vec<Vec<f64>>> {
    let n = graph.node_count();
    let dims = params.dimensions;
    if n == 0 {
        return Ok(Vec::new());
    }
    if n == 1 {
        return Ok(vec![vec![0.0; dims]]);
    }

    let mut adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
    for (s, t, edge) in graph.indexed_edges() {
        adjacency[s].push((t, edge.weight));
        adjacency[t].push((s, edge.weight));
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut pos: Vec<Vec<f64>> = (0..n)
        .map(|_| (0..dims).map(|_| rng.gen::<f64>()).collect())
        .collect();

    let k = params.k.unwrap_or_else(|| (1.0 / n as f64).sqrt());
    let mut temperature = 0.1 * span(&pos);
    let cooling = temperature / (params.iterations as f64 + 1.0);

    for _ in 0..params.iterations {
        let snapshot = &pos;
        let moves: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| {
                let mut weights = vec![0.0; n];
                for &(j, w) in &adjacency[i] {
                    weights[j] += w;
                }
                let mut displacement = vec![0.0; dims];
                for j in 0..n {
                    if i == j {
                        continue;
                    }
                    let delta: Vec<f64> = (0..dims).map(|d| snapshot[i][d] - snapshot[j][d]).collect();
                    let distance = norm(&delta).max(MIN_DISTANCE);
                    let force = k * k / (distance * distance) - weights[j] * distance / k;
                    for d in 0..dims {
                        displacement[d] += delta[d] * force;
                    }
                }
                let length = norm(&displacement).max(MIN_DISTANCE);
                displacement.iter().map(|x| x * temperature / length).collect()
            })
            .collect();

        let mut total_move = 0.0;
        for (p, m) in pos.iter_mut().zip(moves.iter()) {
            for d in 0..dims {
                p[d] += m[d];
            }
            total_move += norm(m);
        }
        temperature -= cooling;
        if total_move / (n as f64) < CONVERGENCE_THRESHOLD {
            break;
        }
    }

    rescale(&mut pos, dims);

    if pos.iter().flatten().any(|x| !x.is_finite()) {
        return Err(LayoutError::Failure(
            "force-directed layout produced non-finite coordinates".to_string(),
        ));
    }
    Ok(pos)
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Largest per-axis extent of a point set.
fn span(pos: &[Vec<f64>]) -> f64 {
    let dims = pos.first().map_or(0, Vec::len);
    (0..dims)
        .map(|d| {
            let (lo, hi) = pos.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p[d]), hi.max(p[d]))
            });
            hi - lo
        })
        .fold(0.0, f64::max)
}

/// Center on the mean and scale so the largest absolute coordinate is 1.
fn rescale(pos: &mut [Vec<f64>], dims: usize) {
    let n = pos.len() as f64;
    for d in 0..dims {
        let mean = pos.iter().map(|p| p[d]).sum::<f64>() / n;
        for p in pos.iter_mut() {
            p[d] -= mean;
        }
    }
    let limit = pos
        .iter()
        .flatten()
        .map(|x| x.abs())
        .fold(0.0, f64::max);
    if limit > 0.0 {
        for x in pos.iter_mut().flatten() {
            *x /= limit;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::RawEdgeRecord;
    use crate::graph::{fuse, ConceptNode};

    fn graph(ids: &[&str], edges: &[(&str, &str)]) -> Graph {
        let nodes = ids.iter().map(|id| ConceptNode::new(id, "").unwrap()).collect();
        let raw: Vec<RawEdgeRecord> = edges
            .iter()
            .map(|(s, t)| RawEdgeRecord::new(*s, *t, "r"))
            .collect();
        fuse(nodes, &raw, &[]).0
    }

    fn params(dimensions: usize) -> ForceParams {
        ForceParams {
            dimensions,
            k: None,
            iterations: 100,
            seed: 42,
        }
    }

    fn dist(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
    }

    #[test]
    fn every_node_gets_a_point_in_unit_box() {
        let g = graph(&["a", "b", "c", "d"], &[("a", "b"), ("b", "c")]);
        let pos = spring_layout(&g, params(3)).unwrap();
        assert_eq!(pos.len(), 4);
        for p in &pos {
            assert_eq!(p.len(), 3);
            assert!(p.iter().all(|x| x.is_finite() && x.abs() <= 1.0 + 1e-9));
        }
    }

    #[test]
    fn same_seed_same_layout() {
        let g = graph(&["a", "b", "c", "d", "e"], &[("a", "b"), ("c", "d"), ("d", "e")]);
        assert_eq!(
            spring_layout(&g, params(2)).unwrap(),
            spring_layout(&g, params(2)).unwrap()
        );
    }

    #[test]
    fn path_endpoints_end_up_farther_apart_than_neighbors() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let pos = spring_layout(&g, params(2)).unwrap();
        assert!(dist(&pos[0], &pos[2]) > dist(&pos[0], &pos[1]));
    }

    #[test]
    fn trivial_graphs() {
        assert!(spring_layout(&graph(&[], &[]), params(2)).unwrap().is_empty());
        assert_eq!(
            spring_layout(&graph(&["solo"], &[]), params(3)).unwrap(),
            vec![vec![0.0, 0.0, 0.0]]
        );
    }

    #[test]
    fn graph_without_edges_still_spreads_out() {
        let g = graph(&["a", "b", "c"], &[]);
        let pos = spring_layout(&g, params(2)).unwrap();
        assert!(dist(&pos[0], &pos[1]) > 1e-3);
        assert!(dist(&pos[1], &pos[2]) > 1e-3);
    }
}
