use bytes::Bytes;
use std::sync::Arc;

use crate::embeddings::ImageEmbedder;
use crate::error::ExtractionError;
use crate::fetch::ImageFetcher;
use crate::types::Embedding;

/// Source acquisition plus embedding, with the dimension contract enforced.
pub struct FeatureExtractor {
    embedder: Arc<dyn ImageEmbedder>,
    fetcher: Arc<dyn ImageFetcher>,
    dimension: usize,
}

impl FeatureExtractor {
    pub fn new(embedder: Arc<dyn ImageEmbedder>, fetcher: Arc<dyn ImageFetcher>) -> Self {
        let dimension = embedder.dimension();
        Self {
            embedder,
            fetcher,
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    pub async fn fetch(&self, source: &str) -> Result<Bytes, ExtractionError> {
        self.fetcher.fetch(source).await
    }

    /// Embed already-acquired image bytes. Inference runs on the blocking pool.
    pub async fn embed_bytes(&self, bytes: Bytes) -> Result<Embedding, ExtractionError> {
        let embedder = self.embedder.clone();
        let values = tokio::task::spawn_blocking(move || embedder.embed(&bytes))
            .await
            .map_err(|e| ExtractionError::Aborted(e.to_string()))?
            .map_err(|e| {
                if e.downcast_ref::<image::ImageError>().is_some() {
                    ExtractionError::Decode(format!("{:#}", e))
                } else {
                    ExtractionError::Inference(format!("{:#}", e))
                }
            })?;

        Embedding::new(values, self.dimension)
    }

    pub async fn extract(&self, source: &str) -> Result<Embedding, ExtractionError> {
        let bytes = self.fetch(source).await?;
        self.embed_bytes(bytes).await
    }
}
