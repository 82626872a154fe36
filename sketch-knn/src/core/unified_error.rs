//! Unified error types for the sketch classifier

use thiserror::Error;

/// Unified error type for the library
#[derive(Debug, Error)]
pub enum KnnError {
    /// Operation requires a fitted classifier
    #[error("Classifier not ready: '{operation}' requires a fitted model")]
    NotReady { operation: String },

    /// Dimension or count mismatch between inputs
    #[error("Shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: String,
        expected: String,
        actual: String,
    },

    /// Incompatible option pairing or out-of-range parameter
    #[error("Configuration error for '{field}': {message}")]
    Configuration { field: String, message: String },

    /// Spatial index construction failed
    #[error("Failed to build spatial index: {source}")]
    IndexBuild {
        #[from]
        source: linfa_nn::BuildError,
    },

    /// Nearest neighbour query failed inside an index
    #[error("Nearest neighbour search failed: {source}")]
    Search {
        #[from]
        source: linfa_nn::NnError,
    },

    /// File not found
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// Invalid JSON
    #[error("Invalid JSON in '{path}': {source}")]
    InvalidJson {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using KnnError
pub type KnnResult<T> = Result<T, KnnError>;

/// Helper functions for creating errors
pub mod errors {
    use super::KnnError;
    use std::fmt::Display;

    pub fn not_ready(operation: &str) -> KnnError {
        KnnError::NotReady {
            operation: operation.to_string(),
        }
    }

    pub fn shape_mismatch(what: &str, expected: impl Display, actual: impl Display) -> KnnError {
        KnnError::ShapeMismatch {
            what: what.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn config_error(field: &str, message: impl Into<String>) -> KnnError {
        KnnError::Configuration {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn file_not_found(path: &str) -> KnnError {
        KnnError::FileNotFound {
            path: path.to_string(),
        }
    }

    pub fn invalid_json(path: &str, source: serde_json::Error) -> KnnError {
        KnnError::InvalidJson {
            path: path.to_string(),
            source,
        }
    }
}
