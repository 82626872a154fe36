//! Feature projection applied between rasterization and neighbour search.
//!
//! Projectors are fitted offline; this crate only applies persisted
//! parameters.

use crate::core::unified_error::{errors, KnnResult};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maps a raw pixel vector to the feature space the classifier was fitted in
pub trait Projector: Send + Sync {
    /// Expected raw vector length, `None` when any length is accepted
    fn input_dim(&self) -> Option<usize>;

    /// Output length for an input of `input_len`
    fn output_dim(&self, input_len: usize) -> usize;

    fn project(&self, raw: ArrayView1<'_, f64>) -> KnnResult<Array1<f64>>;

    /// Projects every row of `raw`
    fn project_batch(&self, raw: ArrayView2<'_, f64>) -> KnnResult<Array2<f64>> {
        let out_dim = self.output_dim(raw.ncols());
        let mut out = Array2::zeros((raw.nrows(), out_dim));
        for (row, mut target) in raw.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
            target.assign(&self.project(row)?);
        }
        Ok(out)
    }
}

/// Passes vectors through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityProjector;

impl Projector for IdentityProjector {
    fn input_dim(&self) -> Option<usize> {
        None
    }

    fn output_dim(&self, input_len: usize) -> usize {
        input_len
    }

    fn project(&self, raw: ArrayView1<'_, f64>) -> KnnResult<Array1<f64>> {
        Ok(raw.to_owned())
    }
}

/// Persisted standardisation + PCA parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearProjectorData {
    pub scaler_mean: Vec<f64>,
    pub scaler_scale: Vec<f64>,
    /// Defaults to zeros when absent
    #[serde(default)]
    pub pca_mean: Vec<f64>,
    /// `n_components` rows of length `input_dim`
    pub components: Vec<Vec<f64>>,
}

/// `((x - mean) / scale - pca_mean) · componentsᵀ`
#[derive(Debug, Clone)]
pub struct LinearProjector {
    scaler_mean: Array1<f64>,
    scaler_scale: Array1<f64>,
    pca_mean: Array1<f64>,
    components: Array2<f64>,
}

impl LinearProjector {
    pub fn new(
        scaler_mean: Array1<f64>,
        scaler_scale: Array1<f64>,
        pca_mean: Array1<f64>,
        components: Array2<f64>,
    ) -> KnnResult<Self> {
        let dim = scaler_mean.len();
        if dim == 0 || components.nrows() == 0 {
            return Err(errors::shape_mismatch(
                "projector",
                "at least one input dimension and one component",
                format!("{} inputs, {} components", dim, components.nrows()),
            ));
        }
        for (what, len) in [
            ("projector scaler_scale", scaler_scale.len()),
            ("projector pca_mean", pca_mean.len()),
            ("projector component width", components.ncols()),
        ] {
            if len != dim {
                return Err(errors::shape_mismatch(what, dim, len));
            }
        }

        // constant features were fitted with zero variance
        let scaler_scale = scaler_scale.mapv(|s| if s == 0.0 { 1.0 } else { s });

        Ok(Self {
            scaler_mean,
            scaler_scale,
            pca_mean,
            components,
        })
    }

    pub fn from_data(data: LinearProjectorData) -> KnnResult<Self> {
        let dim = data.scaler_mean.len();
        let n_components = data.components.len();
        let pca_mean = if data.pca_mean.is_empty() {
            vec![0.0; dim]
        } else {
            data.pca_mean
        };
        if let Some(row) = data.components.iter().find(|row| row.len() != dim) {
            return Err(errors::shape_mismatch("projector component width", dim, row.len()));
        }
        let flat: Vec<f64> = data.components.into_iter().flatten().collect();
        let components = Array2::from_shape_vec((n_components, dim), flat)
            .map_err(|e| errors::shape_mismatch("projector components", format!("{} x {}", n_components, dim), e))?;

        Self::new(
            Array1::from(data.scaler_mean),
            Array1::from(data.scaler_scale),
            Array1::from(pca_mean),
            components,
        )
    }

    pub fn from_json(json: &str) -> KnnResult<Self> {
        let data: LinearProjectorData =
            serde_json::from_str(json).map_err(|e| errors::invalid_json("<projector>", e))?;
        Self::from_data(data)
    }

    /// Load projector parameters from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> KnnResult<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();
        if !path.exists() {
            return Err(errors::file_not_found(&path_str));
        }
        let json = std::fs::read_to_string(path)?;
        let data: LinearProjectorData =
            serde_json::from_str(&json).map_err(|e| errors::invalid_json(&path_str, e))?;
        Self::from_data(data)
    }

    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }
}

impl Projector for LinearProjector {
    fn input_dim(&self) -> Option<usize> {
        Some(self.scaler_mean.len())
    }

    fn output_dim(&self, _input_len: usize) -> usize {
        self.n_components()
    }

    fn project(&self, raw: ArrayView1<'_, f64>) -> KnnResult<Array1<f64>> {
        if raw.len() != self.scaler_mean.len() {
            return Err(errors::shape_mismatch(
                "raw feature vector",
                self.scaler_mean.len(),
                raw.len(),
            ));
        }
        let centered = (&raw - &self.scaler_mean) / &self.scaler_scale - &self.pca_mean;
        Ok(self.components.dot(&centered))
    }
}
