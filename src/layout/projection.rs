//! Nonlinear projection of embedding vectors (UMAP-style neighbor embedding)
//!
//! 1. Build a k-nearest-neighbor graph in the input space.
//! 2. Turn neighbor distances into fuzzy memberships, calibrated per point
//!    so each point has an effective neighborhood of `log2(k)`.
//! 3. Symmetrize memberships with the probabilistic union `a + b - ab`.
//! 4. Optimize low-dimensional positions by seeded stochastic gradient
//!    descent: members attract, random negative samples repel.
//!
//! All randomness comes from one `StdRng` seeded from the config, so the
//! same input and seed give the same coordinates.

use super::{LayoutError, LayoutResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Binary-search iterations when calibrating per-point bandwidth.
const BANDWIDTH_ITERATIONS: usize = 64;
const BANDWIDTH_TOLERANCE: f64 = 1e-5;
/// Lower bound on bandwidth as a fraction of the mean neighbor distance.
const MIN_BANDWIDTH_SCALE: f64 = 1e-3;
/// Per-coordinate gradient clip.
const GRADIENT_CLIP: f64 = 4.0;
/// Half-width of the random initialization box.
const INIT_RANGE: f64 = 10.0;

/// Parameters for one projection run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionParams {
    pub dimensions: usize,
    pub n_neighbors: usize,
    pub min_dist: f64,
    pub spread: f64,
    pub epochs: usize,
    pub negative_samples: usize,
    pub seed: u64,
}

/// Project `vectors` (all the same length) into `params.dimensions` coordinates.
///
/// Output is index-aligned with the input. Fails on fewer than two points,
/// inconsistent input lengths, or non-finite output.
pub fn project(vectors: &[Vec<f64>], params: &ProjectionParams) -> LayoutResult<Vec<Vec<f64>>> {
    let n = vectors.len();
    if n < 2 {
        return Err(LayoutError::Failure(format!(
            "projection needs at least 2 points, got {}",
            n
        )));
    }
    let input_dim = vectors[0].len();
    if input_dim == 0 || vectors.iter().any(|v| v.len() != input_dim) {
        return Err(LayoutError::Failure(
            "projection input vectors differ in length".to_string(),
        ));
    }

    let k = params.n_neighbors.clamp(1, n - 1);
    let neighbors = nearest_neighbors(vectors, k);
    let memberships = fuzzy_memberships(&neighbors, k);
    let (a, b) = fit_curve(params.spread, params.min_dist);

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut embedding: Vec<Vec<f64>> = (0..n)
        .map(|_| {
            (0..params.dimensions)
                .map(|_| rng.gen_range(-INIT_RANGE..INIT_RANGE))
                .collect()
        })
        .collect();

    optimize(&mut embedding, &memberships, a, b, params, &mut rng);

    if embedding.iter().flatten().any(|x| !x.is_finite()) {
        return Err(LayoutError::Failure(
            "projection produced non-finite coordinates".to_string(),
        ));
    }
    Ok(embedding)
}

/// For each point, its `k` nearest other points as `(index, distance)`,
/// ascending by distance, ties by index.
fn nearest_neighbors(vectors: &[Vec<f64>], k: usize) -> Vec<Vec<(usize, f64)>> {
    (0..vectors.len())
        .into_par_iter()
        .map(|i| {
            let mut row: Vec<(usize, f64)> = vectors
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(j, v)| (j, euclidean(&vectors[i], v)))
                .collect();
            row.sort_by(|x, y| x.1.total_cmp(&y.1).then(x.0.cmp(&y.0)));
            row.truncate(k);
            row
        })
        .collect()
}

/// Symmetric fuzzy membership weights keyed by `(i, j)` with `i < j`.
fn fuzzy_memberships(neighbors: &[Vec<(usize, f64)>], k: usize) -> BTreeMap<(usize, usize), f64> {
    let target = (k as f64).log2().max(1e-3);
    let mut directed: BTreeMap<(usize, usize), f64> = BTreeMap::new();

    for (i, row) in neighbors.iter().enumerate() {
        let rho = row
            .iter()
            .map(|(_, d)| *d)
            .find(|d| *d > 0.0)
            .unwrap_or(0.0);
        let sigma = calibrate_bandwidth(row, rho, target);
        for &(j, d) in row {
            let w = (-((d - rho).max(0.0)) / sigma).exp();
            directed.insert((i, j), w);
        }
    }

    let mut symmetric = BTreeMap::new();
    for (&(i, j), &w) in &directed {
        let back = directed.get(&(j, i)).copied().unwrap_or(0.0);
        let key = (i.min(j), i.max(j));
        symmetric.insert(key, w + back - w * back);
    }
    symmetric.retain(|_, w| *w > 0.0);
    symmetric
}

/// Find sigma with `sum_j exp(-(d_j - rho)/sigma) ≈ target` by bisection.
fn calibrate_bandwidth(row: &[(usize, f64)], rho: f64, target: f64) -> f64 {
    let (mut lo, mut hi, mut mid) = (0.0_f64, f64::INFINITY, 1.0_f64);
    for _ in 0..BANDWIDTH_ITERATIONS {
        let total: f64 = row
            .iter()
            .map(|(_, d)| (-((d - rho).max(0.0)) / mid).exp())
            .sum();
        if (total - target).abs() < BANDWIDTH_TOLERANCE {
            break;
        }
        if total > target {
            hi = mid;
            mid = (lo + hi) / 2.0;
        } else {
            lo = mid;
            mid = if hi.is_infinite() { mid * 2.0 } else { (lo + hi) / 2.0 };
        }
    }
    let mean = row.iter().map(|(_, d)| *d).sum::<f64>() / row.len().max(1) as f64;
    mid.max(MIN_BANDWIDTH_SCALE * mean).max(f64::MIN_POSITIVE)
}

/// Fit `1 / (1 + a·x^(2b))` to the target low-dimensional membership curve
/// (1 below `min_dist`, exponential decay with scale `spread` above it).
///
/// Pattern search from `(1, 1)`; deterministic.
pub(crate) fn fit_curve(spread: f64, min_dist: f64) -> (f64, f64) {
    let samples: Vec<(f64, f64)> = (0..300)
        .map(|i| {
            let x = 3.0 * spread * i as f64 / 299.0;
            let y = if x < min_dist {
                1.0
            } else {
                (-(x - min_dist) / spread).exp()
            };
            (x, y)
        })
        .collect();
    let loss = |a: f64, b: f64| -> f64 {
        samples
            .iter()
            .map(|(x, y)| (1.0 / (1.0 + a * x.powf(2.0 * b)) - y).powi(2))
            .sum()
    };

    let (mut a, mut b) = (1.0_f64, 1.0_f64);
    let mut step = 0.5_f64;
    let mut best = loss(a, b);
    while step > 1e-7 {
        let mut improved = false;
        for (da, db) in [(step, 0.0), (-step, 0.0), (0.0, step), (0.0, -step)] {
            let (ca, cb) = (a + da, b + db);
            if ca <= 0.0 || cb <= 0.0 {
                continue;
            }
            let l = loss(ca, cb);
            if l < best {
                best = l;
                a = ca;
                b = cb;
                improved = true;
                break;
            }
        }
        if !improved {
            step /= 2.0;
        }
    }
    (a, b)
}

fn optimize(
    embedding: &mut [Vec<f64>],
    memberships: &BTreeMap<(usize, usize), f64>,
    a: f64,
    b: f64,
    params: &ProjectionParams,
    rng: &mut StdRng,
) {
    let n = embedding.len();
    let dims = params.dimensions;
    let max_weight = memberships.values().copied().fold(0.0, f64::max);
    if max_weight <= 0.0 {
        return;
    }
    let epochs = params.epochs.max(1);

    for epoch in 0..epochs {
        let alpha = 1.0 - epoch as f64 / epochs as f64;
        for (&(i, j), &w) in memberships {
            if rng.gen::<f64>() > w / max_weight {
                continue;
            }

            let d2 = squared_distance(&embedding[i], &embedding[j]);
            let coeff = if d2 > 0.0 {
                -2.0 * a * b * d2.powf(b - 1.0) / (a * d2.powf(b) + 1.0)
            } else {
                0.0
            };
            for d in 0..dims {
                let grad = clip(coeff * (embedding[i][d] - embedding[j][d]));
                embedding[i][d] += grad * alpha;
                embedding[j][d] -= grad * alpha;
            }

            for _ in 0..params.negative_samples {
                let other = rng.gen_range(0..n);
                if other == i {
                    continue;
                }
                let d2 = squared_distance(&embedding[i], &embedding[other]);
                let coeff = if d2 > 0.0 {
                    2.0 * b / ((0.001 + d2) * (a * d2.powf(b) + 1.0))
                } else {
                    0.0
                };
                for d in 0..dims {
                    let grad = if coeff > 0.0 {
                        clip(coeff * (embedding[i][d] - embedding[other][d]))
                    } else {
                        GRADIENT_CLIP
                    };
                    embedding[i][d] += grad * alpha;
                }
            }
        }
    }
}

fn clip(x: f64) -> f64 {
    x.clamp(-GRADIENT_CLIP, GRADIENT_CLIP)
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    squared_distance(a, b).sqrt()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ProjectionParams {
        ProjectionParams {
            dimensions: 2,
            n_neighbors: 4,
            min_dist: 0.1,
            spread: 1.0,
            epochs: 200,
            negative_samples: 5,
            seed: 42,
        }
    }

    /// Two tight clusters far apart in 4-D.
    fn two_clusters() -> Vec<Vec<f64>> {
        let mut v = Vec::new();
        for i in 0..5 {
            let e = i as f64 * 0.01;
            v.push(vec![1.0 + e, 0.0, 0.0, e]);
        }
        for i in 0..5 {
            let e = i as f64 * 0.01;
            v.push(vec![0.0, 0.0, 10.0 + e, 10.0 - e]);
        }
        v
    }

    fn dist(a: &[f64], b: &[f64]) -> f64 {
        euclidean(a, b)
    }

    #[test]
    fn clusters_stay_apart() {
        let out = project(&two_clusters(), &params()).unwrap();
        assert_eq!(out.len(), 10);

        let mut intra = 0.0;
        let mut inter = 0.0;
        let (mut n_intra, mut n_inter) = (0, 0);
        for i in 0..10 {
            for j in (i + 1)..10 {
                if (i < 5) == (j < 5) {
                    intra += dist(&out[i], &out[j]);
                    n_intra += 1;
                } else {
                    inter += dist(&out[i], &out[j]);
                    n_inter += 1;
                }
            }
        }
        assert!(intra / (n_intra as f64) < inter / (n_inter as f64));
    }

    #[test]
    fn seeded_projection_is_reproducible() {
        let first = project(&two_clusters(), &params()).unwrap();
        let second = project(&two_clusters(), &params()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn output_has_target_dimensionality() {
        let p = ProjectionParams {
            dimensions: 3,
            ..params()
        };
        let out = project(&two_clusters(), &p).unwrap();
        assert!(out.iter().all(|v| v.len() == 3 && v.iter().all(|x| x.is_finite())));
    }

    #[test]
    fn single_point_is_a_failure() {
        assert!(matches!(
            project(&[vec![1.0, 2.0]], &params()),
            Err(LayoutError::Failure(_))
        ));
    }

    #[test]
    fn ragged_input_is_a_failure() {
        let ragged = vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]];
        assert!(project(&ragged, &params()).is_err());
    }

    #[test]
    fn identical_points_do_not_blow_up() {
        let same = vec![vec![1.0, 1.0]; 6];
        let out = project(&same, &params()).unwrap();
        assert!(out.iter().flatten().all(|x| x.is_finite()));
    }

    #[test]
    fn fitted_curve_tracks_target() {
        let (a, b) = fit_curve(1.0, 0.1);
        assert!(a > 0.0 && b > 0.0);
        let curve = |x: f64| 1.0 / (1.0 + a * x.powf(2.0 * b));
        assert!(curve(0.05) > 0.9);
        assert!(curve(2.0) < 0.3);
    }
}
