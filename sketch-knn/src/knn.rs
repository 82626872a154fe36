//! Weighted KNN classifier
//!
//! Inference-only: the training matrix and labels are produced elsewhere and
//! handed to [`KnnClassifier::fit`], which builds every spatial index up front.
//!
//! The classifier borrows the training data for its whole fitted lifetime, so
//! the data cannot change underneath the indexes, and re-fitting requires
//! exclusive access while no query is in flight.
//!
//! Each neighbour votes with weight `1 / (distance + eps)`; the label with the
//! greatest total weight wins.

use crate::core::config::ExecutionBackend;
use crate::core::unified_error::{errors, KnnResult};
use crate::neighbors::{
    brute_force_k_nearest, pairwise_distances, select_k_smallest, select_nearest, DistanceMetric,
    IndexStrategy, Neighbor,
};
use crate::vote::weighted_vote;
use linfa_nn::distance::{L1Dist, L2Dist};
use linfa_nn::{BallTree, KdTree, NearestNeighbour, NearestNeighbourIndex};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

type SpatialIndex<'a> = Box<dyn NearestNeighbourIndex<f64> + 'a>;

/// Relative slack on the k-th distance when collecting tied rows from a tree
const TIE_TOLERANCE: f64 = 1e-9;

/// Training data and the indexes built over it
struct FittedState<'a> {
    features: &'a Array2<f64>,
    labels: &'a [String],
    default_k: usize,
    default_metric: DistanceMetric,
    /// One ball tree per supported metric
    ball_trees: HashMap<DistanceMetric, SpatialIndex<'a>>,
    /// Euclidean only
    kd_tree: SpatialIndex<'a>,
}

impl<'a> FittedState<'a> {
    fn build(
        features: &'a Array2<f64>,
        labels: &'a [String],
        default_k: usize,
        default_metric: DistanceMetric,
    ) -> KnnResult<Self> {
        let mut ball_trees: HashMap<DistanceMetric, SpatialIndex<'a>> = HashMap::new();
        ball_trees.insert(
            DistanceMetric::Euclidean,
            BallTree::new().from_batch(features, L2Dist)?,
        );
        ball_trees.insert(
            DistanceMetric::Manhattan,
            BallTree::new().from_batch(features, L1Dist)?,
        );
        let kd_tree = KdTree::new().from_batch(features, L2Dist)?;

        Ok(Self {
            features,
            labels,
            default_k,
            default_metric,
            ball_trees,
            kd_tree,
        })
    }

    fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    fn n_features(&self) -> usize {
        self.features.ncols()
    }

    /// Exact k nearest neighbours of one query, in no particular order.
    ///
    /// Rows tied at the k-th distance are resolved by training row for every
    /// strategy, so trees select the same set as the linear scan.
    fn k_nearest(
        &self,
        query: ArrayView1<'_, f64>,
        k: usize,
        metric: DistanceMetric,
        strategy: IndexStrategy,
    ) -> KnnResult<Vec<Neighbor>> {
        let index = match strategy {
            IndexStrategy::BruteForce => {
                return Ok(brute_force_k_nearest(self.features, query, k, metric));
            }
            IndexStrategy::BallTree => self
                .ball_trees
                .get(&metric)
                .ok_or_else(|| errors::config_error("metric", format!("no ball tree for {}", metric)))?,
            IndexStrategy::KdTree => &self.kd_tree,
        };

        // tree indexes need a contiguous query
        let query = query.as_standard_layout();
        let kth_distance = index
            .k_nearest(query.view(), k)?
            .into_iter()
            .map(|(point, _)| metric.distance(query.view(), point))
            .fold(0.0, f64::max);

        // every row at or inside the k-th distance, ties included
        let range = kth_distance + TIE_TOLERANCE * (1.0 + kth_distance);
        let candidates = index
            .within_range(query.view(), range)?
            .into_iter()
            .map(|(_, row)| Neighbor {
                index: row,
                distance: metric.distance(query.view(), self.features.row(row)),
            })
            .collect();
        Ok(select_nearest(candidates, k))
    }

    fn vote(&self, mut neighbors: Vec<Neighbor>) -> KnnResult<String> {
        weighted_vote(&mut neighbors, self.labels)
            .map(str::to_string)
            .ok_or_else(|| errors::config_error("k", "no neighbours were selected"))
    }
}

/// Weighted KNN classifier over a borrowed training set
#[derive(Default)]
pub struct KnnClassifier<'a> {
    backend: ExecutionBackend,
    fitted: Option<FittedState<'a>>,
}

impl<'a> KnnClassifier<'a> {
    /// Create an unfitted classifier
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the execution backend for batch prediction.
    ///
    /// `Parallel` without the `parallel` feature falls back to serial.
    pub fn with_backend(mut self, backend: ExecutionBackend) -> Self {
        if backend == ExecutionBackend::Parallel && !cfg!(feature = "parallel") {
            warn!("parallel backend requested but the `parallel` feature is disabled, falling back to serial");
        }
        self.backend = backend;
        self
    }

    /// Store the training set and build all spatial indexes.
    ///
    /// All-or-nothing: on error the previous state, fitted or not, is kept.
    pub fn fit(
        &mut self,
        features: &'a Array2<f64>,
        labels: &'a [String],
        default_k: usize,
        default_metric: DistanceMetric,
    ) -> KnnResult<()> {
        let (n_samples, n_features) = features.dim();
        if n_samples == 0 || n_features == 0 {
            return Err(errors::shape_mismatch(
                "training features",
                "a non-empty N x D matrix with N >= 1 and D >= 1",
                format!("{} x {}", n_samples, n_features),
            ));
        }
        if labels.len() != n_samples {
            return Err(errors::shape_mismatch(
                "training labels",
                format!("{} labels (one per feature row)", n_samples),
                labels.len(),
            ));
        }
        check_k(default_k, n_samples)?;

        let state = FittedState::build(features, labels, default_k, default_metric)?;
        self.fitted = Some(state);
        info!(
            samples = n_samples,
            dims = n_features,
            k = default_k,
            metric = %default_metric,
            "fitted weighted KNN with ball trees (L2, L1) and KD tree"
        );
        Ok(())
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// k used when a query does not choose one, `None` before fit
    pub fn default_k(&self) -> Option<usize> {
        self.fitted.as_ref().map(|state| state.default_k)
    }

    pub fn default_metric(&self) -> Option<DistanceMetric> {
        self.fitted.as_ref().map(|state| state.default_metric)
    }

    pub fn backend(&self) -> ExecutionBackend {
        self.backend
    }

    /// Training set size, `None` before fit
    pub fn n_samples(&self) -> Option<usize> {
        self.fitted.as_ref().map(FittedState::n_samples)
    }

    /// Feature dimension D, `None` before fit
    pub fn n_features(&self) -> Option<usize> {
        self.fitted.as_ref().map(FittedState::n_features)
    }

    /// Predict the label of a single feature vector.
    ///
    /// `k` falls back to the fit-time default when `None`.
    pub fn predict(
        &self,
        query: ArrayView1<'_, f64>,
        k: Option<usize>,
        metric: DistanceMetric,
        strategy: IndexStrategy,
    ) -> KnnResult<String> {
        let state = self.state("predict")?;
        let k = self.check_query_options(state, k, metric, strategy)?;
        if query.len() != state.n_features() {
            return Err(errors::shape_mismatch(
                "query vector",
                state.n_features(),
                query.len(),
            ));
        }

        let neighbors = state.k_nearest(query, k, metric, strategy)?;
        let label = state.vote(neighbors)?;
        debug!(%strategy, %metric, k, label = %label, "predicted");
        Ok(label)
    }

    /// Predict one label per row of `queries`, in row order.
    ///
    /// Rows are processed in contiguous chunks of `batch_size`; the chunking
    /// only bounds memory use and never changes the result.
    pub fn predict_batch(
        &self,
        queries: ArrayView2<'_, f64>,
        k: Option<usize>,
        metric: DistanceMetric,
        strategy: IndexStrategy,
        batch_size: usize,
    ) -> KnnResult<Vec<String>> {
        let state = self.state("predict_batch")?;
        let k = self.check_query_options(state, k, metric, strategy)?;
        if batch_size == 0 {
            return Err(errors::config_error("batch_size", "must be at least 1"));
        }
        if queries.ncols() != state.n_features() {
            return Err(errors::shape_mismatch(
                "query matrix columns",
                state.n_features(),
                queries.ncols(),
            ));
        }

        let mut predictions = Vec::with_capacity(queries.nrows());
        for (chunk_ix, chunk) in queries.axis_chunks_iter(Axis(0), batch_size).enumerate() {
            debug!(chunk = chunk_ix, rows = chunk.nrows(), %strategy, "predicting chunk");
            let labels = match strategy {
                IndexStrategy::BruteForce => {
                    // whole chunk against the whole training set at once
                    let dists = pairwise_distances(&chunk, state.features, metric);
                    self.map_rows(dists.nrows(), |row| {
                        state.vote(select_k_smallest(dists.row(row), k))
                    })?
                }
                IndexStrategy::BallTree | IndexStrategy::KdTree => {
                    self.map_rows(chunk.nrows(), |row| {
                        let neighbors = state.k_nearest(chunk.row(row), k, metric, strategy)?;
                        state.vote(neighbors)
                    })?
                }
            };
            predictions.extend(labels);
        }
        Ok(predictions)
    }

    fn state(&self, operation: &str) -> KnnResult<&FittedState<'a>> {
        self.fitted.as_ref().ok_or_else(|| errors::not_ready(operation))
    }

    fn check_query_options(
        &self,
        state: &FittedState<'a>,
        k: Option<usize>,
        metric: DistanceMetric,
        strategy: IndexStrategy,
    ) -> KnnResult<usize> {
        if !strategy.supports(metric) {
            return Err(errors::config_error(
                "strategy",
                format!("{} only supports the euclidean metric, got {}", strategy, metric),
            ));
        }
        let k = k.unwrap_or(state.default_k);
        check_k(k, state.n_samples())?;
        Ok(k)
    }

    fn map_rows<T, F>(&self, rows: usize, f: F) -> KnnResult<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> KnnResult<T> + Send + Sync,
    {
        #[cfg(feature = "parallel")]
        {
            if self.backend == ExecutionBackend::Parallel {
                use rayon::prelude::*;
                return (0..rows).into_par_iter().map(f).collect();
            }
        }
        (0..rows).map(f).collect()
    }
}

fn check_k(k: usize, n_samples: usize) -> KnnResult<()> {
    if k == 0 || k > n_samples {
        return Err(errors::config_error(
            "k",
            format!("must satisfy 1 <= k <= {}, got {}", n_samples, k),
        ));
    }
    Ok(())
}

impl fmt::Debug for KnnClassifier<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnnClassifier")
            .field("default_k", &self.default_k())
            .field("default_metric", &self.default_metric())
            .field("backend", &self.backend)
            .field("n_samples", &self.n_samples())
            .field("n_features", &self.n_features())
            .finish()
    }
}
