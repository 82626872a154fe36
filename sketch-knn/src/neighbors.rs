//! Distance metrics, search strategies and the exact brute-force scan.
//!
//! The tree strategies are served by `linfa-nn` indexes owned by
//! [`crate::knn::KnnClassifier`]; this module holds the pieces that are shared
//! by every strategy so that all of them agree on how a distance is computed.

use linfa_nn::distance::{Distance, L1Dist, L2Dist};
use ndarray::{Array2, ArrayBase, ArrayView1, Axis, Data, Ix2};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Distance metric used to rank training points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// L2
    Euclidean,
    /// L1
    Manhattan,
}

impl DistanceMetric {
    pub const ALL: [DistanceMetric; 2] = [DistanceMetric::Euclidean, DistanceMetric::Manhattan];

    pub fn distance(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        match self {
            DistanceMetric::Euclidean => L2Dist.distance(a, b),
            DistanceMetric::Manhattan => L1Dist.distance(a, b),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::Euclidean => write!(f, "euclidean"),
            DistanceMetric::Manhattan => write!(f, "manhattan"),
        }
    }
}

/// How the k nearest training points are located
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStrategy {
    /// Linear scan over every training point
    BruteForce,
    /// Ball tree, valid for any supported metric
    BallTree,
    /// Axis-aligned KD tree, Euclidean only
    KdTree,
}

impl IndexStrategy {
    pub const ALL: [IndexStrategy; 3] = [
        IndexStrategy::BruteForce,
        IndexStrategy::BallTree,
        IndexStrategy::KdTree,
    ];

    /// Whether this strategy can answer queries under `metric`
    pub fn supports(&self, metric: DistanceMetric) -> bool {
        match self {
            IndexStrategy::KdTree => metric == DistanceMetric::Euclidean,
            IndexStrategy::BruteForce | IndexStrategy::BallTree => true,
        }
    }
}

impl fmt::Display for IndexStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexStrategy::BruteForce => write!(f, "brute_force"),
            IndexStrategy::BallTree => write!(f, "ball_tree"),
            IndexStrategy::KdTree => write!(f, "kd_tree"),
        }
    }
}

/// A training point selected as one of the k nearest
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Row of the training matrix
    pub index: usize,
    pub distance: f64,
}

/// Canonical ordering: ascending distance, then ascending training row
pub fn sort_neighbors(neighbors: &mut [Neighbor]) {
    neighbors.sort_by(compare_neighbors);
}

fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then(a.index.cmp(&b.index))
}

/// Full pairwise distance matrix between `queries` (rows) and `training` (columns)
pub fn pairwise_distances<S1, S2>(
    queries: &ArrayBase<S1, Ix2>,
    training: &ArrayBase<S2, Ix2>,
    metric: DistanceMetric,
) -> Array2<f64>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    let mut dists = Array2::zeros((queries.nrows(), training.nrows()));
    for (query, mut row) in queries.axis_iter(Axis(0)).zip(dists.axis_iter_mut(Axis(0))) {
        for (train, d) in training.axis_iter(Axis(0)).zip(row.iter_mut()) {
            *d = metric.distance(query, train);
        }
    }
    dists
}

/// Picks the `k` smallest entries of one distance row.
///
/// Uses a partial selection, so the returned neighbours are not sorted.
pub fn select_k_smallest(dists: ArrayView1<'_, f64>, k: usize) -> Vec<Neighbor> {
    let candidates = dists
        .iter()
        .enumerate()
        .map(|(index, &distance)| Neighbor { index, distance })
        .collect();
    select_nearest(candidates, k)
}

/// Keeps the `k` candidates that come first in canonical order.
///
/// Ties at the k-th distance go to the lowest training rows, whatever order
/// the candidates were found in.
pub fn select_nearest(mut candidates: Vec<Neighbor>, k: usize) -> Vec<Neighbor> {
    if k == 0 {
        return Vec::new();
    }
    if k < candidates.len() {
        candidates.select_nth_unstable_by(k - 1, compare_neighbors);
        candidates.truncate(k);
    }
    candidates
}

/// Exact linear scan for a single query
pub fn brute_force_k_nearest<S: Data<Elem = f64>>(
    training: &ArrayBase<S, Ix2>,
    query: ArrayView1<'_, f64>,
    k: usize,
    metric: DistanceMetric,
) -> Vec<Neighbor> {
    let dists: ndarray::Array1<f64> = training
        .axis_iter(Axis(0))
        .map(|train| metric.distance(query, train))
        .collect();
    select_k_smallest(dists.view(), k)
}
