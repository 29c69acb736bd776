//! Query Clustering
//!
//! Groups TF-IDF rows so that similar historical queries share a label.
//! Labels are only meaningful within one clustering pass.

use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::corpus::UNCLUSTERED;

/// Assigns a cluster label to every point
pub trait Clusterer {
    /// Label each point with a cluster in `0..k`, or all [`UNCLUSTERED`]
    /// when there are fewer than `k` points
    fn fit(&mut self, points: &[Vec<f32>], k: usize) -> Vec<i32>;
}

/// Lloyd's k-means with randomly sampled seed points
#[derive(Debug, Clone)]
pub struct KMeans {
    max_iterations: usize,
    rng: ChaCha8Rng,
    last_iterations: usize,
}

impl KMeans {
    /// Create a deterministic k-means
    pub fn new(seed: u64, max_iterations: usize) -> Self {
        Self::from_rng(ChaCha8Rng::seed_from_u64(seed), max_iterations)
    }

    pub fn from_rng(rng: ChaCha8Rng, max_iterations: usize) -> Self {
        KMeans {
            max_iterations: max_iterations.max(1),
            rng,
            last_iterations: 0,
        }
    }

    /// Iterations used by the most recent fit
    pub fn last_iterations(&self) -> usize {
        self.last_iterations
    }
}

impl Clusterer for KMeans {
    fn fit(&mut self, points: &[Vec<f32>], k: usize) -> Vec<i32> {
        self.last_iterations = 0;
        if k == 0 || points.len() < k {
            return vec![UNCLUSTERED; points.len()];
        }

        let dims = points[0].len();
        let mut centroids: Vec<Vec<f32>> = sample(&mut self.rng, points.len(), k)
            .into_iter()
            .map(|i| points[i].clone())
            .collect();
        let mut labels = vec![UNCLUSTERED; points.len()];

        for iteration in 0..self.max_iterations {
            self.last_iterations = iteration + 1;

            let mut changed = false;
            for (point, label) in points.iter().zip(labels.iter_mut()) {
                let nearest = nearest_centroid(point, &centroids) as i32;
                if *label != nearest {
                    *label = nearest;
                    changed = true;
                }
            }
            if !changed {
                break;
            }

            let mut sums = vec![vec![0.0f32; dims]; k];
            let mut counts = vec![0usize; k];
            for (point, &label) in points.iter().zip(&labels) {
                let c = label as usize;
                counts[c] += 1;
                for (s, v) in sums[c].iter_mut().zip(point) {
                    *s += v;
                }
            }
            for (c, sum) in sums.into_iter().enumerate() {
                // Empty clusters keep their previous centroid
                if counts[c] > 0 {
                    let n = counts[c] as f32;
                    centroids[c] = sum.into_iter().map(|s| s / n).collect();
                }
            }
        }

        labels
    }
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest_centroid(point: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_distance(point, c);
        if d < best_dist {
            best = i;
            best_dist = d;
        }
    }
    best
}
