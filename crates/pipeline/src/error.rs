use heirloom_airtable::RecordStoreError;
use heirloom_db::DbError;
use heirloom_gemini::GenerationError;

/// Errors raised while restoring images or running prompt chains.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The source image could not be retrieved.
    #[error("Image fetch failed: {0}")]
    Fetch(String),

    /// The source image could not be decoded or re-encoded.
    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// The model answered without any image where one was required.
    #[error("No image returned by model {model}")]
    NoImage { model: String },

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error(transparent)]
    JobStore(#[from] DbError),

    #[error(transparent)]
    RecordStore(#[from] RecordStoreError),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation error: {0}")]
    Validation(String),
}
