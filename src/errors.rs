//! Centralized error handling for skillscore
//!
//! Every fallible operation in the crate returns [`Result`]. Validation errors
//! (shape, dimension and parameter problems) are raised synchronously when a
//! score is requested, never deferred into a lazy block graph.

use thiserror::Error;

/// Main error type for skillscore operations
#[derive(Error, Debug)]
pub enum SkillScoreError {
    /// Dimension sets, coordinate labels or buffer shapes are incompatible
    #[error("Shape mismatch: {message}")]
    ShapeMismatch { message: String },

    /// The requested feature is outside the implemented scope
    #[error("Not implemented: {feature}")]
    NotImplemented { feature: String },

    /// A named dimension is missing from an array
    #[error("Dimension '{dim}' not found (available: {})", available.join(", "))]
    DimensionNotFound { dim: String, available: Vec<String> },

    /// Labeled array invariants violated on construction
    #[error("Invalid coordinates: {message}")]
    InvalidCoordinates { message: String },

    /// A parameter value is out of its valid domain
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    ArrayError(#[from] ndarray::ShapeError),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON encoding or decoding errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl SkillScoreError {
    pub(crate) fn shape_mismatch(message: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            message: message.into(),
        }
    }

    pub(crate) fn dimension_not_found(dim: &str, available: &[String]) -> Self {
        Self::DimensionNotFound {
            dim: dim.to_string(),
            available: available.to_vec(),
        }
    }
}

/// Result type alias for skillscore operations
pub type Result<T> = std::result::Result<T, SkillScoreError>;
