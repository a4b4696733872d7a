use anyhow::Context;
use bytes::Bytes;
use futures::future;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cache::FeatureCache;
use crate::catalog::Catalog;
use crate::config::{SearchConfig, ServiceConfig};
use crate::embeddings::onnx::{OnnxImageEmbedder, OnnxModelConfig};
use crate::embeddings::ImageEmbedder;
use crate::error::{ItemScoringError, Result, SearchError};
use crate::extract::FeatureExtractor;
use crate::fetch::{is_remote, ImageFetcher, SourceFetcher};
use crate::search::{rank, Candidate};
use crate::types::{CatalogItem, Embedding, SearchRequest, SearchResponse};

/// Query image after source resolution.
enum ResolvedQuery {
    Catalog(Arc<CatalogItem>),
    Image { bytes: Bytes, label: Option<String> },
}

pub struct SearchEngine {
    catalog: Arc<Catalog>,
    cache: Arc<FeatureCache>,
    extractor: Arc<FeatureExtractor>,
    config: SearchConfig,
}

impl SearchEngine {
    /// Load the catalog and ONNX model described by `config`.
    pub async fn new(config: &ServiceConfig) -> anyhow::Result<Self> {
        let catalog = Catalog::from_file(&config.catalog_path)?;

        let embedder = OnnxImageEmbedder::new(OnnxModelConfig::from(&config.embedding))
            .context("Failed to load image embedding model")?;
        let fetcher = SourceFetcher::new(&config.image_root, config.search.fetch_timeout())
            .context("Failed to build image fetcher")?;

        let engine = Self::with_components(
            catalog,
            Arc::new(embedder),
            Arc::new(fetcher),
            config.search.clone(),
        );

        if config.search.warm_cache_on_start {
            engine.warm_cache().await;
        }
        Ok(engine)
    }

    pub fn with_components(
        catalog: Catalog,
        embedder: Arc<dyn ImageEmbedder>,
        fetcher: Arc<dyn ImageFetcher>,
        config: SearchConfig,
    ) -> Self {
        let extractor = Arc::new(FeatureExtractor::new(embedder, fetcher));
        Self {
            catalog: Arc::new(catalog),
            cache: Arc::new(FeatureCache::new(extractor.clone())),
            extractor,
            config,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn cache(&self) -> &FeatureCache {
        &self.cache
    }

    pub fn model_name(&self) -> &str {
        self.extractor.model_name()
    }

    pub fn dimension(&self) -> usize {
        self.extractor.dimension()
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub async fn warm_cache(&self) -> usize {
        self.cache
            .warm(self.catalog.items(), self.config.max_concurrency)
            .await
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let never = AtomicBool::new(false);
        self.search_with_cancel(request, &never).await
    }

    /// Products similar to an existing catalog item, excluding the item itself.
    pub async fn similar_to(&self, id: &str) -> Result<SearchResponse> {
        self.search(SearchRequest::CatalogItem(id.to_string())).await
    }

    /// Run a search. Once `cancel` is raised no further catalog items are
    /// looked up; lookups already running finish and stay cached.
    pub async fn search_with_cancel(
        &self,
        request: SearchRequest,
        cancel: &AtomicBool,
    ) -> Result<SearchResponse> {
        let exclude_id = request.exclude_id().map(str::to_string);
        let query = self.resolve(request).await?;

        let (query_embedding, target_product, uploaded_image) = match query {
            ResolvedQuery::Catalog(item) => {
                tracing::info!("Finding products similar to: {}", item.name);
                let embedding = self.cache.get_or_compute(&item.id, &item.image).await?;
                (embedding, Some(item), None)
            }
            ResolvedQuery::Image { bytes, label } => {
                tracing::info!(
                    "Processing query image: {}",
                    label.as_deref().unwrap_or("<upload>")
                );
                (self.extractor.embed_bytes(bytes).await?, None, label)
            }
        };

        let candidates = self.score_catalog(cancel).await;
        if cancel.load(Ordering::Relaxed) {
            return Err(SearchError::Cancelled);
        }

        let results = rank(
            query_embedding.as_slice(),
            candidates,
            exclude_id.as_deref(),
            self.config.result_limit,
        );

        tracing::info!("Found {} similar products", results.len());
        if let Some(top) = results.first() {
            tracing::info!("Top match: {} ({:.2}%)", top.item.name, top.similarity);
        }

        let mut response = SearchResponse::new(results);
        response.target_product = target_product;
        response.uploaded_image = uploaded_image;
        Ok(response)
    }

    async fn resolve(&self, request: SearchRequest) -> Result<ResolvedQuery> {
        match request {
            SearchRequest::Upload { bytes, filename } => {
                if bytes.is_empty() {
                    return Err(SearchError::bad_request("Uploaded image is empty"));
                }
                Ok(ResolvedQuery::Image {
                    bytes,
                    label: filename,
                })
            }
            SearchRequest::ImageUrl(url) => {
                let url = url.trim();
                if url.is_empty() {
                    return Err(SearchError::bad_request("No image file or URL provided"));
                }
                if !is_remote(url) {
                    return Err(SearchError::bad_request(
                        "imageUrl must be an http:// or https:// URL",
                    ));
                }
                let bytes = self.extractor.fetch(url).await?;
                Ok(ResolvedQuery::Image {
                    bytes,
                    label: Some(url.to_string()),
                })
            }
            SearchRequest::CatalogItem(id) => self
                .catalog
                .get(&id)
                .cloned()
                .map(ResolvedQuery::Catalog)
                .ok_or(SearchError::NotFound(id)),
        }
    }

    /// Look up every catalog embedding through the cache, in catalog order.
    /// Items that fail are logged and left out.
    async fn score_catalog(&self, cancel: &AtomicBool) -> Vec<Candidate<Embedding>> {
        let lookups: Vec<_> = stream::iter(self.catalog.items().iter().cloned())
            .take_while(|_| future::ready(!cancel.load(Ordering::Relaxed)))
            .map(|item| async move {
                let result = self.cache.get_or_compute(&item.id, &item.image).await;
                (item, result)
            })
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        let mut candidates = Vec::with_capacity(lookups.len());
        for (item, result) in lookups {
            match result {
                Ok(embedding) => candidates.push(Candidate { item, embedding }),
                Err(source) => {
                    let err = ItemScoringError {
                        item_id: item.id.clone(),
                        source,
                    };
                    tracing::warn!("Skipping product: {}", err);
                }
            }
        }
        candidates
    }
}
