//! Error types for the model merger.

use crate::types::{DecalId, ModelId};
use thiserror::Error;

/// Result type alias using MergeError.
pub type Result<T> = std::result::Result<T, MergeError>;

/// Boxed error returned by pluggable collaborators (decoders, encoders, codecs).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for merge operations.
#[derive(Error, Debug)]
pub enum MergeError {
    /// A decal was created for a model that is not registered.
    #[error("Unknown target model: {0}")]
    UnknownTarget(ModelId),

    /// A model id did not resolve to a registered model.
    #[error("Model not found: {0}")]
    ModelNotFound(ModelId),

    /// A decal id did not resolve to a registered decal.
    #[error("Decal not found: {0}")]
    DecalNotFound(DecalId),

    /// Merge attempted with no meshes across all models.
    #[error("No geometry to merge")]
    NoGeometry,

    /// Geometry is missing required attribute data.
    #[error("Invalid attribute: {0}")]
    InvalidAttribute(String),

    /// The model decoder failed.
    #[error("Failed to load asset: {0}")]
    AssetLoad(#[source] BoxError),

    /// The model encoder failed.
    #[error("Export error: {0}")]
    Export(#[source] BoxError),

    /// The image codec failed.
    #[error("Image codec error: {0}")]
    ImageCodec(#[source] BoxError),

    /// Failed to read or process an image.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse JSON data.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Merge options failed validation.
    #[error("Invalid merge options: {0}")]
    InvalidOptions(String),

    /// Failed to build texture atlas.
    #[error("Atlas building error: {0}")]
    AtlasBuild(String),

    /// Export was requested before any successful merge.
    #[error("Nothing to export: run a merge first")]
    NothingToExport,
}

impl MergeError {
    /// Returns `true` for errors caused by a stale or invalid id.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MergeError::UnknownTarget(_) | MergeError::ModelNotFound(_) | MergeError::DecalNotFound(_)
        )
    }
}
