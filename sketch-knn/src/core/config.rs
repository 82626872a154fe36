//! Runtime configuration
//!
//! Loaded once from a `config.json` next to the persisted model; every field
//! falls back to its default when absent.

use crate::core::unified_error::{errors, KnnResult};
use crate::neighbors::{DistanceMetric, IndexStrategy};
use crate::raster::RasterConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Neighbour search settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnConfig {
    /// Default number of neighbours
    pub k: usize,
    pub metric: DistanceMetric,
    pub strategy: IndexStrategy,
    /// Rows per chunk in batch prediction
    pub batch_size: usize,
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self {
            k: 5,
            metric: DistanceMetric::Euclidean,
            strategy: IndexStrategy::KdTree,
            batch_size: 100,
        }
    }
}

impl KnnConfig {
    pub fn validate(&self) -> KnnResult<()> {
        if self.k == 0 {
            return Err(errors::config_error("knn.k", "must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(errors::config_error("knn.batch_size", "must be at least 1"));
        }
        if !self.strategy.supports(self.metric) {
            return Err(errors::config_error(
                "knn.strategy",
                format!("{} does not support the {} metric", self.strategy, self.metric),
            ));
        }
        Ok(())
    }
}

/// Execution backend preference for batch prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionBackend {
    /// One row after another on the calling thread
    #[default]
    Serial,
    /// Rows of each chunk spread over the rayon pool (`parallel` feature)
    Parallel,
}

/// Full configuration of a sketch classifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SketchConfig {
    pub raster: RasterConfig,
    pub knn: KnnConfig,
    pub backend: ExecutionBackend,
}

impl SketchConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> KnnResult<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        if !path.exists() {
            return Err(errors::file_not_found(&path_str));
        }

        let config_str = std::fs::read_to_string(path)?;
        let config: SketchConfig =
            serde_json::from_str(&config_str).map_err(|e| errors::invalid_json(&path_str, e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> KnnResult<()> {
        self.raster.validate()?;
        self.knn.validate()
    }
}
