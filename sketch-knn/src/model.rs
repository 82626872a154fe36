//! Persisted model and the end-to-end sketch recognizer
//!
//! A model directory holds:
//! - `knn_model.json`: training features and labels (required)
//! - `projector.json`: fitted projection parameters (optional, identity when absent)
//! - `config.json`: raster and search settings (optional, defaults when absent)
//!
//! [`SketchModel`] is loaded once at start-up and owns all of it; a
//! [`SketchRecognizer`] borrows the model and holds the fitted indexes.

use crate::core::config::SketchConfig;
use crate::core::unified_error::{errors, KnnResult};
use crate::knn::KnnClassifier;
use crate::neighbors::DistanceMetric;
use crate::projector::{IdentityProjector, LinearProjector, Projector};
use crate::raster::{rasterize_with, Stroke};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

pub const MODEL_FILE: &str = "knn_model.json";
pub const PROJECTOR_FILE: &str = "projector.json";
pub const CONFIG_FILE: &str = "config.json";

/// Model data for JSON serialization
#[derive(Debug, Serialize, Deserialize)]
pub struct KnnModelData {
    pub algorithm: String,
    pub k: usize,
    #[serde(default = "default_metric")]
    pub metric: DistanceMetric,
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<String>,
}

fn default_metric() -> DistanceMetric {
    DistanceMetric::Euclidean
}

/// Labeled training vectors, all of the same length
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    features: Array2<f64>,
    labels: Vec<String>,
    k: usize,
    metric: DistanceMetric,
}

impl TrainingSet {
    pub fn new(
        features: Array2<f64>,
        labels: Vec<String>,
        k: usize,
        metric: DistanceMetric,
    ) -> KnnResult<Self> {
        if labels.len() != features.nrows() {
            return Err(errors::shape_mismatch(
                "training labels",
                features.nrows(),
                labels.len(),
            ));
        }
        Ok(Self {
            features,
            labels,
            k,
            metric,
        })
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Sorted distinct labels
    pub fn categories(&self) -> Vec<String> {
        self.labels
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Fit a classifier over this training set
    pub fn classifier(&self) -> KnnResult<KnnClassifier<'_>> {
        let mut knn = KnnClassifier::new();
        knn.fit(&self.features, &self.labels, self.k, self.metric)?;
        Ok(knn)
    }

    /// Save model to JSON
    pub fn to_json(&self) -> KnnResult<String> {
        let data = KnnModelData {
            algorithm: "weighted_knn".to_string(),
            k: self.k,
            metric: self.metric,
            features: self.features.rows().into_iter().map(|r| r.to_vec()).collect(),
            labels: self.labels.clone(),
        };
        serde_json::to_string_pretty(&data).map_err(|e| errors::invalid_json("<model>", e))
    }

    /// Load model from JSON
    pub fn from_json(json: &str) -> KnnResult<Self> {
        Self::parse(json, "<model>")
    }

    fn parse(json: &str, source: &str) -> KnnResult<Self> {
        let data: KnnModelData =
            serde_json::from_str(json).map_err(|e| errors::invalid_json(source, e))?;

        let n = data.features.len();
        let dim = data.features.first().map_or(0, Vec::len);
        if let Some(row) = data.features.iter().find(|row| row.len() != dim) {
            return Err(errors::shape_mismatch("training feature row", dim, row.len()));
        }
        let flat: Vec<f64> = data.features.into_iter().flatten().collect();
        let features = Array2::from_shape_vec((n, dim), flat)
            .map_err(|e| errors::shape_mismatch("training features", format!("{} x {}", n, dim), e))?;

        Self::new(features, data.labels, data.k, data.metric)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> KnnResult<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();
        if !path.exists() {
            return Err(errors::file_not_found(&path_str));
        }
        let json = std::fs::read_to_string(path)?;
        Self::parse(&json, &path_str)
    }
}

/// Application-lifetime state: configuration, training data and projector
pub struct SketchModel {
    config: SketchConfig,
    training: TrainingSet,
    projector: Box<dyn Projector>,
}

impl SketchModel {
    pub fn new(
        config: SketchConfig,
        training: TrainingSet,
        projector: Box<dyn Projector>,
    ) -> KnnResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            training,
            projector,
        })
    }

    /// Load every model file from a directory
    pub fn load<P: AsRef<Path>>(model_dir: P) -> KnnResult<Self> {
        let dir = model_dir.as_ref();

        let config_path = dir.join(CONFIG_FILE);
        let config = if config_path.exists() {
            SketchConfig::from_file(&config_path)?
        } else {
            SketchConfig::default()
        };

        let training = TrainingSet::from_file(dir.join(MODEL_FILE))?;

        let projector_path = dir.join(PROJECTOR_FILE);
        let projector: Box<dyn Projector> = if projector_path.exists() {
            Box::new(LinearProjector::from_file(&projector_path)?)
        } else {
            Box::new(IdentityProjector)
        };

        info!(
            dir = %dir.display(),
            samples = training.len(),
            categories = training.categories().len(),
            "loaded sketch model"
        );
        Self::new(config, training, projector)
    }

    pub fn config(&self) -> &SketchConfig {
        &self.config
    }

    pub fn training(&self) -> &TrainingSet {
        &self.training
    }

    pub fn categories(&self) -> Vec<String> {
        self.training.categories()
    }

    /// Build the indexes and check that every stage agrees on vector lengths
    pub fn recognizer(&self) -> KnnResult<SketchRecognizer<'_>> {
        let raw_len = self.config.raster.feature_len();
        if let Some(expected) = self.projector.input_dim() {
            if expected != raw_len {
                return Err(errors::shape_mismatch(
                    "projector input (raster size squared)",
                    expected,
                    raw_len,
                ));
            }
        }
        let projected_len = self.projector.output_dim(raw_len);
        let trained_len = self.training.features().ncols();
        if projected_len != trained_len {
            return Err(errors::shape_mismatch(
                "projector output vs training features",
                trained_len,
                projected_len,
            ));
        }

        let classifier = self.training.classifier()?.with_backend(self.config.backend);
        Ok(SketchRecognizer {
            model: self,
            classifier,
        })
    }
}

/// Strokes in, label out
#[derive(Debug)]
pub struct SketchRecognizer<'m> {
    model: &'m SketchModel,
    classifier: KnnClassifier<'m>,
}

impl<'m> SketchRecognizer<'m> {
    pub fn classifier(&self) -> &KnnClassifier<'m> {
        &self.classifier
    }

    /// Rasterized, flattened and projected feature vector of one drawing
    pub fn features(&self, strokes: &[Stroke]) -> KnnResult<ndarray::Array1<f64>> {
        let image = rasterize_with(strokes, &self.model.config.raster);
        let raw = image.to_feature_vector();
        self.model.projector.project(raw.view())
    }

    pub fn recognize(&self, strokes: &[Stroke]) -> KnnResult<String> {
        let features = self.features(strokes)?;
        self.predict(features.view())
    }

    /// Classify an already projected feature vector with the configured options
    pub fn predict(&self, features: ArrayView1<'_, f64>) -> KnnResult<String> {
        let knn = &self.model.config.knn;
        self.classifier
            .predict(features, Some(knn.k), knn.metric, knn.strategy)
    }

    pub fn recognize_batch(&self, drawings: &[Vec<Stroke>]) -> KnnResult<Vec<String>> {
        let raster = &self.model.config.raster;
        let mut raw = Array2::zeros((drawings.len(), raster.feature_len()));
        for (strokes, mut row) in drawings.iter().zip(raw.rows_mut()) {
            row.assign(&rasterize_with(strokes, raster).to_feature_vector());
        }
        let queries = self.model.projector.project_batch(raw.view())?;
        let knn = &self.model.config.knn;
        self.classifier.predict_batch(
            queries.view(),
            Some(knn.k),
            knn.metric,
            knn.strategy,
            knn.batch_size,
        )
    }
}

impl std::fmt::Debug for SketchModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SketchModel")
            .field("config", &self.config)
            .field("samples", &self.training.len())
            .field("projector_input_dim", &self.projector.input_dim())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::KnnConfig;
    use crate::core::unified_error::KnnError;
    use crate::neighbors::IndexStrategy;
    use crate::raster::{rasterize_with, Point, RasterConfig};

    fn line(points: &[(f64, f64)]) -> Stroke {
        Stroke::new(points.iter().map(|&(x, y)| Point::new(x, y)).collect())
    }

    fn horizontal() -> Vec<Stroke> {
        vec![line(&[(0.0, 50.0), (100.0, 50.0)])]
    }

    fn vertical() -> Vec<Stroke> {
        vec![line(&[(50.0, 0.0), (50.0, 100.0)])]
    }

    fn cross() -> Vec<Stroke> {
        vec![line(&[(0.0, 0.0), (100.0, 100.0)]), line(&[(100.0, 0.0), (0.0, 100.0)])]
    }

    /// Training set of raw 16x16 rasters, one image per shape
    fn raster_training(raster: &RasterConfig) -> TrainingSet {
        let shapes = [("horizontal", horizontal()), ("vertical", vertical()), ("cross", cross())];
        let dim = raster.feature_len();
        let mut features = Array2::zeros((shapes.len(), dim));
        let mut labels = Vec::new();
        for ((label, strokes), mut row) in shapes.iter().zip(features.rows_mut()) {
            row.assign(&rasterize_with(strokes, raster).to_feature_vector());
            labels.push(label.to_string());
        }
        TrainingSet::new(features, labels, 1, DistanceMetric::Euclidean).unwrap()
    }

    fn test_config() -> SketchConfig {
        SketchConfig {
            raster: RasterConfig {
                size: 16,
                ..RasterConfig::default()
            },
            knn: KnnConfig {
                k: 1,
                metric: DistanceMetric::Euclidean,
                strategy: IndexStrategy::KdTree,
                batch_size: 2,
            },
            ..SketchConfig::default()
        }
    }

    #[test]
    fn test_training_set_json_roundtrip() {
        let training = TrainingSet::new(
            ndarray::array![[1.0, 2.0], [3.0, 4.0]],
            vec!["sun".to_string(), "tree".to_string()],
            1,
            DistanceMetric::Manhattan,
        )
        .unwrap();
        let restored = TrainingSet::from_json(&training.to_json().unwrap()).unwrap();
        assert_eq!(restored, training);
    }

    #[test]
    fn test_training_set_rejects_ragged_rows() {
        let json = r#"{"algorithm": "weighted_knn", "k": 1, "features": [[1.0, 2.0], [3.0]], "labels": ["a", "b"]}"#;
        assert!(matches!(
            TrainingSet::from_json(json),
            Err(KnnError::ShapeMismatch { .. })
        ));
        let json = r#"{"algorithm": "weighted_knn", "k": 1, "features": [[1.0]], "labels": ["a", "b"]}"#;
        assert!(matches!(
            TrainingSet::from_json(json),
            Err(KnnError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_categories_sorted_unique() {
        let training = TrainingSet::new(
            Array2::zeros((4, 1)),
            ["tree", "apple", "tree", "sun"].iter().map(|s| s.to_string()).collect(),
            1,
            DistanceMetric::Euclidean,
        )
        .unwrap();
        assert_eq!(training.categories(), vec!["apple", "sun", "tree"]);
    }

    #[test]
    fn test_recognize_drawings() {
        let config = test_config();
        let training = raster_training(&config.raster);
        let model = SketchModel::new(config, training, Box::new(IdentityProjector)).unwrap();
        let recognizer = model.recognizer().unwrap();

        // same shapes drawn at another position and scale
        let shifted_h = vec![line(&[(300.0, 20.0), (340.0, 21.0)])];
        let shifted_v = vec![line(&[(10.0, 500.0), (11.0, 700.0)])];
        assert_eq!(recognizer.recognize(&shifted_h).unwrap(), "horizontal");
        assert_eq!(recognizer.recognize(&shifted_v).unwrap(), "vertical");

        let batch = vec![shifted_v.clone(), cross(), shifted_h.clone()];
        assert_eq!(
            recognizer.recognize_batch(&batch).unwrap(),
            vec!["vertical", "cross", "horizontal"]
        );
    }

    #[test]
    fn test_recognizer_checks_dimensions() {
        let config = test_config();
        let training = TrainingSet::new(
            Array2::zeros((2, 10)),
            vec!["a".to_string(), "b".to_string()],
            1,
            DistanceMetric::Euclidean,
        )
        .unwrap();
        let model = SketchModel::new(config, training, Box::new(IdentityProjector)).unwrap();
        assert!(matches!(
            model.recognizer(),
            Err(KnnError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_load_model_directory() {
        let config = test_config();
        let training = raster_training(&config.raster);

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MODEL_FILE), training.to_json().unwrap()).unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            serde_json::to_string(&config).unwrap(),
        )
        .unwrap();

        let model = SketchModel::load(dir.path()).unwrap();
        assert_eq!(model.config().raster.size, 16);
        assert_eq!(model.categories(), vec!["cross", "horizontal", "vertical"]);
        let recognizer = model.recognizer().unwrap();
        assert_eq!(recognizer.recognize(&cross()).unwrap(), "cross");
    }

    #[test]
    fn test_load_requires_model_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SketchModel::load(dir.path()),
            Err(KnnError::FileNotFound { .. })
        ));
    }
}
