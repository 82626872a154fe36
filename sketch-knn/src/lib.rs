//! Sketch recognition via weighted k-nearest neighbours
//!
//! Inference-only library: turns freehand drawings into labels.
//!
//! ## Pipeline
//! - **Rasterize**: strokes are fitted into a padded square frame and drawn
//!   with anti-aliased lines onto a grayscale grid
//! - **Project**: the flattened image is optionally standardized and reduced
//!   by a pre-fitted linear projection
//! - **Classify**: distance-weighted KNN vote over a labeled training set
//!
//! ## Search strategies
//! - Brute force: exact pairwise distances, any metric
//! - Ball tree: Euclidean or Manhattan, via linfa-nn
//! - KD tree: Euclidean only, via linfa-nn
//!
//! All strategies return the same neighbour set and therefore the same label.
//! Training data and projection parameters are loaded from JSON files produced
//! by an offline training step.

pub mod core;
pub mod knn;
pub mod model;
pub mod neighbors;
pub mod projector;
pub mod raster;
pub mod vote;

#[cfg(test)]
mod knn_test;

// Re-exports for convenience
pub use crate::core::config::{ExecutionBackend, KnnConfig, SketchConfig};
pub use crate::core::unified_error::{KnnError, KnnResult};
pub use knn::KnnClassifier;
pub use model::{SketchModel, SketchRecognizer, TrainingSet};
pub use neighbors::{DistanceMetric, IndexStrategy};
pub use projector::{IdentityProjector, LinearProjector, Projector};
pub use raster::{rasterize, rasterize_with, Point, RasterConfig, RasterImage, Stroke};
