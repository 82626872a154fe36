//! Cross-strategy tests for the weighted KNN classifier
//!
//! Every strategy and batching choice must agree with single-query brute force.

use super::knn::*;
use crate::core::config::ExecutionBackend;
use crate::core::unified_error::KnnError;
use crate::neighbors::{DistanceMetric, IndexStrategy};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rstest::*;

const N_TRAIN: usize = 60;
const N_QUERY: usize = 25;
const DIM: usize = 6;
const CATEGORIES: [&str; 4] = ["apple", "cloud", "house", "tree"];

/// Seeded training set and query matrix
struct Dataset {
    features: Array2<f64>,
    labels: Vec<String>,
    queries: Array2<f64>,
}

#[fixture]
fn dataset() -> Dataset {
    let mut rng = StdRng::seed_from_u64(42);
    let features = Array2::from_shape_fn((N_TRAIN, DIM), |_| rng.gen_range(-1.0..1.0));
    let labels = (0..N_TRAIN)
        .map(|_| CATEGORIES[rng.gen_range(0..CATEGORIES.len())].to_string())
        .collect();
    let queries = Array2::from_shape_fn((N_QUERY, DIM), |_| rng.gen_range(-1.0..1.0));
    Dataset {
        features,
        labels,
        queries,
    }
}

fn fitted<'a>(data: &'a Dataset, k: usize, metric: DistanceMetric) -> KnnClassifier<'a> {
    let mut knn = KnnClassifier::new();
    knn.fit(&data.features, &data.labels, k, metric).unwrap();
    knn
}

/// Single-query brute force, one prediction per row
fn reference(knn: &KnnClassifier<'_>, data: &Dataset, k: usize, metric: DistanceMetric) -> Vec<String> {
    data.queries
        .axis_iter(Axis(0))
        .map(|q| knn.predict(q, Some(k), metric, IndexStrategy::BruteForce).unwrap())
        .collect()
}

#[rstest]
fn test_strategies_agree_with_brute_force(
    dataset: Dataset,
    #[values(1, 3, 5, 9)] k: usize,
    #[values(DistanceMetric::Euclidean, DistanceMetric::Manhattan)] metric: DistanceMetric,
    #[values(IndexStrategy::BruteForce, IndexStrategy::BallTree, IndexStrategy::KdTree)]
    strategy: IndexStrategy,
) {
    if !strategy.supports(metric) {
        return;
    }
    let knn = fitted(&dataset, k, metric);
    let expected = reference(&knn, &dataset, k, metric);

    for (row, query) in dataset.queries.axis_iter(Axis(0)).enumerate() {
        let label = knn.predict(query, Some(k), metric, strategy).unwrap();
        assert_eq!(label, expected[row], "row {} with {} / {}", row, strategy, metric);
    }
}

#[rstest]
#[case(1)]
#[case(7)]
#[case(N_QUERY)]
#[case(N_QUERY + 100)]
fn test_batch_size_does_not_change_predictions(
    dataset: Dataset,
    #[case] batch_size: usize,
    #[values(IndexStrategy::BruteForce, IndexStrategy::BallTree, IndexStrategy::KdTree)]
    strategy: IndexStrategy,
) {
    let knn = fitted(&dataset, 5, DistanceMetric::Euclidean);
    let expected = reference(&knn, &dataset, 5, DistanceMetric::Euclidean);

    let batch = knn
        .predict_batch(
            dataset.queries.view(),
            None,
            DistanceMetric::Euclidean,
            strategy,
            batch_size,
        )
        .unwrap();
    assert_eq!(batch, expected);
}

#[rstest]
fn test_manhattan_batch_matches_single(
    dataset: Dataset,
    #[values(IndexStrategy::BruteForce, IndexStrategy::BallTree)] strategy: IndexStrategy,
) {
    let knn = fitted(&dataset, 3, DistanceMetric::Manhattan);
    let expected = reference(&knn, &dataset, 3, DistanceMetric::Manhattan);
    let batch = knn
        .predict_batch(dataset.queries.view(), Some(3), DistanceMetric::Manhattan, strategy, 4)
        .unwrap();
    assert_eq!(batch, expected);
}

/// Identical rows with alternating labels: the k-th distance is shared by
/// every row, so only the row-order tie rule decides the vote.
#[rstest]
fn test_tied_rows_match_brute_force(
    #[values(1, 2, 3, 4)] k: usize,
    #[values(DistanceMetric::Euclidean, DistanceMetric::Manhattan)] metric: DistanceMetric,
    #[values(IndexStrategy::BallTree, IndexStrategy::KdTree)] strategy: IndexStrategy,
) {
    if !strategy.supports(metric) {
        return;
    }
    let features = Array2::from_elem((200, 4), 1.0);
    let labels: Vec<String> = (0..200)
        .map(|row| if row % 2 == 0 { "even" } else { "odd" }.to_string())
        .collect();
    let mut knn = KnnClassifier::new();
    knn.fit(&features, &labels, k, metric).unwrap();

    for query in [Array1::from_elem(4, 1.0), Array1::from_elem(4, 1.5)] {
        let brute = knn
            .predict(query.view(), None, metric, IndexStrategy::BruteForce)
            .unwrap();
        let tree = knn.predict(query.view(), None, metric, strategy).unwrap();
        assert_eq!(tree, brute, "k={} {} / {}", k, strategy, metric);
    }

    let queries = Array2::from_elem((5, 4), 1.0);
    let batch = knn.predict_batch(queries.view(), None, metric, strategy, 2).unwrap();
    // the lowest rows are selected; an even/odd split ties and "even" sorts first
    assert!(batch.iter().all(|label| label == "even"));
}

#[rstest]
fn test_k1_on_training_point_returns_its_label(
    dataset: Dataset,
    #[values(IndexStrategy::BruteForce, IndexStrategy::BallTree, IndexStrategy::KdTree)]
    strategy: IndexStrategy,
) {
    let knn = fitted(&dataset, 1, DistanceMetric::Euclidean);
    for (row, point) in dataset.features.axis_iter(Axis(0)).enumerate() {
        let label = knn
            .predict(point, Some(1), DistanceMetric::Euclidean, strategy)
            .unwrap();
        assert_eq!(label, dataset.labels[row]);
    }
}

#[rstest]
fn test_k_equal_to_training_size(dataset: Dataset) {
    let knn = fitted(&dataset, N_TRAIN, DistanceMetric::Euclidean);
    let query = dataset.queries.row(0);
    let brute = knn
        .predict(query, None, DistanceMetric::Euclidean, IndexStrategy::BruteForce)
        .unwrap();
    let tree = knn
        .predict(query, None, DistanceMetric::Euclidean, IndexStrategy::BallTree)
        .unwrap();
    assert_eq!(brute, tree);

    assert!(matches!(
        knn.predict(query, Some(N_TRAIN + 1), DistanceMetric::Euclidean, IndexStrategy::BruteForce),
        Err(KnnError::Configuration { .. })
    ));
}

#[rstest]
fn test_parallel_backend_matches_serial(
    dataset: Dataset,
    #[values(IndexStrategy::BruteForce, IndexStrategy::KdTree)] strategy: IndexStrategy,
) {
    let serial = fitted(&dataset, 5, DistanceMetric::Euclidean);
    let mut parallel = KnnClassifier::new().with_backend(ExecutionBackend::Parallel);
    parallel
        .fit(&dataset.features, &dataset.labels, 5, DistanceMetric::Euclidean)
        .unwrap();

    let a = serial
        .predict_batch(dataset.queries.view(), None, DistanceMetric::Euclidean, strategy, 10)
        .unwrap();
    let b = parallel
        .predict_batch(dataset.queries.view(), None, DistanceMetric::Euclidean, strategy, 10)
        .unwrap();
    assert_eq!(a, b);
}

#[rstest]
fn test_refit_replaces_training_set(dataset: Dataset) {
    let mut features = Array2::zeros((2, DIM));
    features.row_mut(1).fill(1.0);
    let labels = vec!["square".to_string(), "circle".to_string()];

    let mut knn = fitted(&dataset, 1, DistanceMetric::Euclidean);
    assert_eq!(knn.n_samples(), Some(N_TRAIN));

    knn.fit(&features, &labels, 1, DistanceMetric::Manhattan).unwrap();
    assert_eq!(knn.n_samples(), Some(2));
    assert_eq!(knn.default_metric(), Some(DistanceMetric::Manhattan));

    let query = Array1::from_elem(DIM, 0.9);
    let label = knn
        .predict(query.view(), None, DistanceMetric::Manhattan, IndexStrategy::BallTree)
        .unwrap();
    assert_eq!(label, "circle");
}
