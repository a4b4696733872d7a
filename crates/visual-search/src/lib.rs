pub mod cache;
pub mod catalog;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod search;
pub mod search_engine;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export primary types for convenience
pub use cache::FeatureCache;
pub use catalog::Catalog;
pub use config::ServiceConfig;
pub use embeddings::{ImageEmbedder, ModelKind, OnnxImageEmbedder};
pub use error::{ExtractionError, ItemScoringError, SearchError};
pub use fetch::{ImageFetcher, SourceFetcher};
pub use search_engine::SearchEngine;
pub use types::{CatalogItem, Embedding, ScoredResult, SearchRequest, SearchResponse};
