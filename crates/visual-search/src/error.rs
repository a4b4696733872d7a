use thiserror::Error;

/// Failure to turn an image source into an embedding.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to fetch image from {source_ref}: {message}")]
    Fetch { source_ref: String, message: String },

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("embedding inference failed: {0}")]
    Inference(String),

    #[error("embedding has dimension {actual}, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("extraction task aborted: {0}")]
    Aborted(String),
}

/// Request-level failures surfaced to callers of the search engine.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Product not found: {0}")]
    NotFound(String),

    #[error("Error processing image: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Search timed out")]
    Timeout,

    #[error("Search cancelled")]
    Cancelled,
}

impl SearchError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}

/// A single catalog item that could not be scored. Recovered inside the
/// engine; only ever logged.
#[derive(Debug, Error)]
#[error("failed to score item {item_id}: {source}")]
pub struct ItemScoringError {
    pub item_id: String,
    #[source]
    pub source: ExtractionError,
}

pub type Result<T, E = SearchError> = std::result::Result<T, E>;
