//! Clustering provider trait and a seeded k-means implementation

use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Cluster count must be greater than 0")]
    InvalidClusterCount,

    #[error("Cannot form {k} clusters from {samples} samples")]
    TooFewSamples { samples: usize, k: usize },

    #[error("Input contains non-finite values")]
    NonFinite,
}

/// Unsupervised grouping of embedding vectors
pub trait ClusteringProvider: Send + Sync {
    /// One label in `0..k` per input row. Deterministic for a fixed `seed`.
    fn fit_predict(
        &self,
        vectors: ArrayView2<'_, f32>,
        k: usize,
        seed: u64,
    ) -> Result<Vec<u32>, ClusterError>;
}

/// Lloyd's k-means with k-means++ seeding and several restarts
///
/// The restart with the lowest inertia wins.
#[derive(Debug, Clone)]
pub struct KMeans {
    pub n_init: usize,
    pub max_iter: usize,
    pub tolerance: f32,
}

impl Default for KMeans {
    fn default() -> Self {
        Self {
            n_init: 10,
            max_iter: 300,
            tolerance: 1e-4,
        }
    }
}

struct Run {
    labels: Vec<u32>,
    inertia: f64,
}

impl KMeans {
    pub fn new(n_init: usize, max_iter: usize) -> Self {
        Self {
            n_init: n_init.max(1),
            max_iter: max_iter.max(1),
            ..Default::default()
        }
    }

    fn run_once(&self, vectors: ArrayView2<'_, f32>, k: usize, rng: &mut StdRng) -> Run {
        let mut centroids = plus_plus_init(vectors, k, rng);
        let mut labels = vec![0u32; vectors.nrows()];

        for iteration in 0..self.max_iter {
            assign(vectors, centroids.view(), &mut labels);
            let updated = recompute_centroids(vectors, &labels, k, centroids.view());

            let shift: f32 = updated
                .rows()
                .into_iter()
                .zip(centroids.rows())
                .map(|(a, b)| squared_distance(a, b))
                .sum();
            centroids = updated;

            if shift <= self.tolerance {
                tracing::debug!("k-means converged after {} iterations", iteration + 1);
                break;
            }
        }

        let inertia = assign(vectors, centroids.view(), &mut labels);
        Run { labels, inertia }
    }
}

impl ClusteringProvider for KMeans {
    fn fit_predict(
        &self,
        vectors: ArrayView2<'_, f32>,
        k: usize,
        seed: u64,
    ) -> Result<Vec<u32>, ClusterError> {
        if k == 0 {
            return Err(ClusterError::InvalidClusterCount);
        }

        let samples = vectors.nrows();
        if samples == 0 {
            return Ok(Vec::new());
        }
        if samples < k {
            return Err(ClusterError::TooFewSamples { samples, k });
        }
        if vectors.iter().any(|v| !v.is_finite()) {
            return Err(ClusterError::NonFinite);
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut best: Option<Run> = None;
        for _ in 0..self.n_init {
            let run = self.run_once(vectors, k, &mut rng);
            let better = match &best {
                Some(current) => run.inertia < current.inertia,
                None => true,
            };
            if better {
                best = Some(run);
            }
        }

        Ok(best.map(|run| run.labels).unwrap_or_default())
    }
}

fn squared_distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// k-means++: first centroid uniform, the rest sampled proportionally to
/// squared distance from the nearest chosen centroid.
fn plus_plus_init(vectors: ArrayView2<'_, f32>, k: usize, rng: &mut StdRng) -> Array2<f32> {
    let n = vectors.nrows();
    let mut centroids = Array2::<f32>::zeros((k, vectors.ncols()));
    let first = rng.random_range(0..n);
    centroids.row_mut(0).assign(&vectors.row(first));

    let mut nearest: Vec<f64> = vectors
        .rows()
        .into_iter()
        .map(|row| squared_distance(row, vectors.row(first)) as f64)
        .collect();

    for c in 1..k {
        let total: f64 = nearest.iter().sum();
        let chosen = if total <= 0.0 {
            rng.random_range(0..n)
        } else {
            let target = rng.random::<f64>() * total;
            let mut cumulative = 0.0;
            nearest
                .iter()
                .position(|d| {
                    cumulative += d;
                    cumulative > target
                })
                .unwrap_or(n - 1)
        };

        centroids.row_mut(c).assign(&vectors.row(chosen));
        for (i, row) in vectors.rows().into_iter().enumerate() {
            let d = squared_distance(row, vectors.row(chosen)) as f64;
            if d < nearest[i] {
                nearest[i] = d;
            }
        }
    }

    centroids
}

/// Assign each row to its nearest centroid; returns the inertia
fn assign(vectors: ArrayView2<'_, f32>, centroids: ArrayView2<'_, f32>, labels: &mut [u32]) -> f64 {
    let mut inertia = 0.0;
    for (i, row) in vectors.rows().into_iter().enumerate() {
        let (label, distance) = centroids
            .rows()
            .into_iter()
            .enumerate()
            .map(|(c, centroid)| (c, squared_distance(row, centroid)))
            .fold((0, f32::INFINITY), |best, candidate| {
                if candidate.1 < best.1 {
                    candidate
                } else {
                    best
                }
            });
        labels[i] = label as u32;
        inertia += distance as f64;
    }
    inertia
}

/// Mean of each cluster's members. An empty cluster is re-seeded with the
/// row farthest from its current centroid.
fn recompute_centroids(
    vectors: ArrayView2<'_, f32>,
    labels: &[u32],
    k: usize,
    previous: ArrayView2<'_, f32>,
) -> Array2<f32> {
    let mut sums = Array2::<f32>::zeros((k, vectors.ncols()));
    let mut counts = vec![0usize; k];

    for (row, &label) in vectors.rows().into_iter().zip(labels) {
        let label = label as usize;
        let mut target = sums.row_mut(label);
        target += &row;
        counts[label] += 1;
    }

    for (c, count) in counts.iter().enumerate() {
        if *count > 0 {
            sums.row_mut(c).mapv_inplace(|v| v / *count as f32);
            continue;
        }

        let farthest = vectors
            .rows()
            .into_iter()
            .zip(labels)
            .map(|(row, &label)| squared_distance(row, previous.row(label as usize)))
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, d)| if d > best.1 { (i, d) } else { best })
            .0;
        sums.row_mut(c).assign(&vectors.row(farthest));
    }

    sums
}
