//! In-process stand-ins for the embedding model and image store.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::embeddings::ImageEmbedder;
use crate::error::ExtractionError;
use crate::fetch::ImageFetcher;
use crate::types::CatalogItem;

/// "Images" are comma-separated floats; embedding them parses the floats back.
pub fn encode_vector(values: &[f32]) -> Bytes {
    let text = values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",");
    Bytes::from(text)
}

pub fn catalog_item(id: &str, image: &str) -> CatalogItem {
    CatalogItem {
        id: id.to_string(),
        name: format!("Product {}", id),
        category: "Test".to_string(),
        image: image.to_string(),
        extra: serde_json::Map::new(),
    }
}

pub struct VectorEmbedder {
    dimension: usize,
    delay: Duration,
    calls: AtomicUsize,
}

impl VectorEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageEmbedder for VectorEmbedder {
    fn embed(&self, image: &[u8]) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let text = std::str::from_utf8(image).map_err(|e| anyhow!("not a test image: {}", e))?;
        text.split(',')
            .map(|part| part.trim().parse::<f32>().map_err(|e| anyhow!("bad value: {}", e)))
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "TestVectors"
    }
}

#[derive(Default)]
pub struct MapFetcher {
    images: RwLock<HashMap<String, Bytes>>,
}

impl MapFetcher {
    pub fn new(images: &[(&str, &[f32])]) -> Self {
        let fetcher = Self::default();
        for (source, values) in images {
            fetcher.insert(source, values);
        }
        fetcher
    }

    pub fn insert(&self, source: &str, values: &[f32]) {
        self.images
            .write()
            .insert(source.to_string(), encode_vector(values));
    }
}

#[async_trait]
impl ImageFetcher for MapFetcher {
    async fn fetch(&self, source: &str) -> Result<Bytes, ExtractionError> {
        self.images
            .read()
            .get(source)
            .cloned()
            .ok_or_else(|| ExtractionError::Fetch {
                source_ref: source.to_string(),
                message: "no such image".to_string(),
            })
    }
}
