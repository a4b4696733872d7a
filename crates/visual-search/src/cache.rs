//! Per-item embedding memoization with compute-once semantics.
//!
//! Each catalog id maps to a `OnceCell`. The first caller to miss runs the
//! extraction; concurrent callers for the same id wait on the same cell. A
//! failed extraction leaves the cell empty so the next caller retries.
//! Extractions run on detached tasks, so a caller that goes away (client
//! disconnect, request timeout) does not discard work that is already in
//! flight.

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::error::{ExtractionError, ItemScoringError};
use crate::extract::FeatureExtractor;
use crate::types::{CatalogItem, Embedding};

pub struct FeatureCache {
    entries: DashMap<String, Arc<OnceCell<Embedding>>>,
    extractor: Arc<FeatureExtractor>,
}

impl FeatureCache {
    pub fn new(extractor: Arc<FeatureExtractor>) -> Self {
        Self {
            entries: DashMap::new(),
            extractor,
        }
    }

    /// Return the cached embedding for `id`, extracting it from `source` on a miss.
    pub async fn get_or_compute(&self, id: &str, source: &str) -> Result<Embedding, ExtractionError> {
        let cell = self.cell(id);
        if let Some(embedding) = cell.get() {
            tracing::debug!("Feature cache hit for {}", id);
            return Ok(embedding.clone());
        }

        let extractor = self.extractor.clone();
        let id = id.to_string();
        let source = source.to_string();
        let task = tokio::spawn(async move {
            cell.get_or_try_init(|| async {
                tracing::debug!("Feature cache miss for {}, extracting from {}", id, source);
                extractor.extract(&source).await
            })
            .await
            .cloned()
        });

        task.await
            .map_err(|e| ExtractionError::Aborted(e.to_string()))?
    }

    /// Read-only lookup, never triggers extraction.
    pub fn get(&self, id: &str) -> Option<Embedding> {
        self.entries.get(id).and_then(|cell| cell.get().cloned())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Number of populated entries.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|entry| entry.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Populate the cache for `items`, at most `concurrency` extractions at a time.
    /// Returns the number of items now cached; failures are logged and skipped.
    pub async fn warm(&self, items: &[Arc<CatalogItem>], concurrency: usize) -> usize {
        let cached = stream::iter(items)
            .map(|item| async move {
                self.get_or_compute(&item.id, &item.image)
                    .await
                    .map_err(|source| ItemScoringError {
                        item_id: item.id.clone(),
                        source,
                    })
            })
            .buffer_unordered(concurrency.max(1))
            .fold(0usize, |cached, result| async move {
                match result {
                    Ok(_) => cached + 1,
                    Err(failure) => {
                        tracing::warn!("Cache warm-up skipped item: {}", failure);
                        cached
                    }
                }
            })
            .await;

        tracing::info!("Feature cache warmed: {}/{} items", cached, items.len());
        cached
    }

    fn cell(&self, id: &str) -> Arc<OnceCell<Embedding>> {
        if let Some(cell) = self.entries.get(id) {
            return cell.clone();
        }
        self.entries
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }
}
