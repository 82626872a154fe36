//! Benchmark: brute force vs ball tree vs KD tree across metrics and batch sizes
//!
//! Usage: benchmark_strategies [model_dir]
//! Example: benchmark_strategies ./quickdraw-knn
//!
//! With a model directory the stored training set is used; otherwise a
//! seeded synthetic set is generated. Every strategy is checked against
//! brute force before its timing is reported.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sketch_knn::{DistanceMetric, IndexStrategy, KnnClassifier, TrainingSet};
use std::env;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const SYNTHETIC_SAMPLES: usize = 2_000;
const SYNTHETIC_DIMS: usize = 30;
const SYNTHETIC_CATEGORIES: usize = 10;
const QUERIES: usize = 500;
const BENCH_RUNS: u32 = 3;

fn synthetic_training(rng: &mut StdRng) -> Result<TrainingSet, Box<dyn std::error::Error>> {
    // one gaussian-ish blob per category
    let centers = ndarray::Array2::from_shape_fn((SYNTHETIC_CATEGORIES, SYNTHETIC_DIMS), |_| {
        rng.gen_range(-5.0..5.0)
    });
    let mut labels = Vec::with_capacity(SYNTHETIC_SAMPLES);
    let mut features = ndarray::Array2::zeros((SYNTHETIC_SAMPLES, SYNTHETIC_DIMS));
    for mut row in features.rows_mut() {
        let category = rng.gen_range(0..SYNTHETIC_CATEGORIES);
        for (value, center) in row.iter_mut().zip(centers.row(category)) {
            *value = center + rng.gen_range(-1.5..1.5);
        }
        labels.push(format!("category_{}", category));
    }
    Ok(TrainingSet::new(features, labels, 5, DistanceMetric::Euclidean)?)
}

fn time_batch(
    knn: &KnnClassifier<'_>,
    queries: ndarray::ArrayView2<'_, f64>,
    metric: DistanceMetric,
    strategy: IndexStrategy,
    batch_size: usize,
) -> Result<(Duration, Vec<String>), Box<dyn std::error::Error>> {
    // Warmup
    let labels = knn.predict_batch(queries, None, metric, strategy, batch_size)?;

    let mut total = Duration::ZERO;
    for _ in 0..BENCH_RUNS {
        let start = Instant::now();
        knn.predict_batch(queries, None, metric, strategy, batch_size)?;
        total += start.elapsed();
    }
    Ok((total / BENCH_RUNS, labels))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut rng = StdRng::seed_from_u64(7);
    let training = match env::args().nth(1) {
        Some(dir) => TrainingSet::from_file(std::path::Path::new(&dir).join("knn_model.json"))?,
        None => synthetic_training(&mut rng)?,
    };
    let knn = training.classifier()?;
    let dims = training.features().ncols();

    // queries are jittered training rows so they land near real clusters
    let queries = ndarray::Array2::from_shape_fn((QUERIES, dims), |(row, col)| {
        training.features()[[row % training.len(), col]] + rng.gen_range(-0.5..0.5)
    });

    println!("================================================================================");
    println!(
        "KNN strategy benchmark: {} samples x {} dims, {} categories, {} queries",
        training.len(),
        dims,
        training.categories().len(),
        QUERIES
    );
    println!("================================================================================");
    println!(
        "{:<10} {:<12} {:>6} {:>12} {:>10}",
        "metric", "strategy", "batch", "latency_ms", "agrees"
    );

    for metric in DistanceMetric::ALL {
        let (_, reference) =
            time_batch(&knn, queries.view(), metric, IndexStrategy::BruteForce, QUERIES)?;
        for strategy in IndexStrategy::ALL {
            if !strategy.supports(metric) {
                continue;
            }
            for batch_size in [1, 32, QUERIES] {
                let (latency, labels) = time_batch(&knn, queries.view(), metric, strategy, batch_size)?;
                println!(
                    "{:<10} {:<12} {:>6} {:>12.2} {:>10}",
                    metric.to_string(),
                    strategy.to_string(),
                    batch_size,
                    latency.as_secs_f64() * 1000.0,
                    labels == reference
                );
            }
        }
    }
    Ok(())
}
