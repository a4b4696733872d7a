use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;

use crate::error::ExtractionError;

/// One product record. Immutable after the catalog is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    pub name: String,
    pub category: String,
    /// Local path (relative to the image root) or http(s) URL.
    pub image: String,
    /// Remaining product fields, passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

/// Fixed-length feature vector. Cloning shares the underlying buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    values: Arc<[f32]>,
}

impl Embedding {
    /// Wrap extractor output, rejecting any length other than `expected_dim`.
    pub fn new(values: Vec<f32>, expected_dim: usize) -> Result<Self, ExtractionError> {
        if values.len() != expected_dim {
            return Err(ExtractionError::DimensionMismatch {
                expected: expected_dim,
                actual: values.len(),
            });
        }
        Ok(Self {
            values: values.into(),
        })
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }
}

impl AsRef<[f32]> for Embedding {
    fn as_ref(&self) -> &[f32] {
        &self.values
    }
}

/// A catalog item with its similarity to the query, in percent.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredResult {
    #[serde(flatten)]
    pub item: Arc<CatalogItem>,
    #[serde(serialize_with = "round_two_places")]
    pub similarity: f32,
}

fn round_two_places<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
    let rounded = (*value as f64 * 100.0).round() / 100.0;
    serializer.serialize_f64(rounded)
}

/// Where the query image comes from. Exactly one source per request.
#[derive(Debug, Clone)]
pub enum SearchRequest {
    Upload { bytes: Bytes, filename: Option<String> },
    ImageUrl(String),
    CatalogItem(String),
}

impl SearchRequest {
    pub fn upload(bytes: impl Into<Bytes>) -> Self {
        Self::Upload {
            bytes: bytes.into(),
            filename: None,
        }
    }

    pub fn exclude_id(&self) -> Option<&str> {
        match self {
            Self::CatalogItem(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub success: bool,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_product: Option<Arc<CatalogItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_image: Option<String>,
    pub results: Vec<ScoredResult>,
}

impl SearchResponse {
    pub fn new(results: Vec<ScoredResult>) -> Self {
        Self {
            success: true,
            count: results.len(),
            target_product: None,
            uploaded_image: None,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_item_keeps_extra_fields() {
        let item: CatalogItem = serde_json::from_str(
            r#"{"id": 7, "name": "Runner", "category": "Shoes", "image": "product-images/7.jpg", "price": 59.9}"#,
        )
        .unwrap();
        assert_eq!(item.id, "7");
        assert_eq!(item.extra.get("price").and_then(|v| v.as_f64()), Some(59.9));

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["id"], "7");
        assert_eq!(json["price"], 59.9);
    }

    #[test]
    fn test_embedding_rejects_wrong_dimension() {
        let err = Embedding::new(vec![1.0, 2.0, 3.0], 4).unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::DimensionMismatch { expected: 4, actual: 3 }
        ));
        assert_eq!(Embedding::new(vec![0.5; 4], 4).unwrap().dimension(), 4);
    }

    #[test]
    fn test_scored_result_flattens_item() {
        let item = Arc::new(CatalogItem {
            id: "a".into(),
            name: "Lamp".into(),
            category: "Home".into(),
            image: "a.png".into(),
            extra: serde_json::Map::new(),
        });
        let result = ScoredResult {
            item,
            similarity: 87.654_32,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["name"], "Lamp");
        assert_eq!(json["similarity"], 87.65);
    }

    #[test]
    fn test_empty_response_shape() {
        let json = serde_json::to_value(SearchResponse::new(Vec::new())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"success": true, "count": 0, "results": []})
        );
    }
}
