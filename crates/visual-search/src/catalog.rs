//! Static product catalog, loaded once at startup.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::types::CatalogItem;

#[derive(Debug, Default)]
pub struct Catalog {
    items: Vec<Arc<CatalogItem>>,
    by_id: HashMap<String, usize>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate ids. Iteration order is the input order.
    pub fn new(items: Vec<CatalogItem>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            if by_id.insert(item.id.clone(), idx).is_some() {
                return Err(anyhow!("Duplicate catalog id: {}", item.id));
            }
        }

        Ok(Self {
            items: items.into_iter().map(Arc::new).collect(),
            by_id,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog at {}", path.display()))?;
        let items: Vec<CatalogItem> =
            serde_json::from_str(&content).context("Failed to parse catalog JSON")?;
        let catalog = Self::new(items)?;
        tracing::info!("Loaded {} products from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<CatalogItem>> {
        self.by_id.get(id).map(|&idx| &self.items[idx])
    }

    pub fn items(&self) -> &[Arc<CatalogItem>] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Distinct categories in first-seen order.
    pub fn categories(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for item in &self.items {
            if !seen.contains(&item.category) {
                seen.push(item.category.clone());
            }
        }
        seen
    }

    /// Items whose category matches, ignoring case.
    pub fn in_category(&self, category: &str) -> Vec<Arc<CatalogItem>> {
        self.items
            .iter()
            .filter(|item| item.category.eq_ignore_ascii_case(category))
            .cloned()
            .collect()
    }
}
