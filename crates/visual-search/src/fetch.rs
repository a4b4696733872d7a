//! Image acquisition from local storage or remote URLs.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ExtractionError;

/// Prefix some catalogs carry in front of paths that already live under the image root.
const IMAGE_DIR_PREFIX: &str = "product-images/";

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Read the raw encoded image behind `source`.
    async fn fetch(&self, source: &str) -> Result<Bytes, ExtractionError>;
}

pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Fetches `http(s)://` sources over the network and everything else from disk
/// relative to `image_root`.
pub struct SourceFetcher {
    client: reqwest::Client,
    image_root: PathBuf,
}

impl SourceFetcher {
    pub fn new(image_root: impl Into<PathBuf>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("visual-search/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            image_root: image_root.into(),
        })
    }

    pub fn resolve_path(&self, source: &str) -> PathBuf {
        let path = Path::new(source);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        let relative = source.strip_prefix(IMAGE_DIR_PREFIX).unwrap_or(source);
        self.image_root.join(relative)
    }

    async fn fetch_remote(&self, url: &str) -> Result<Bytes, ExtractionError> {
        let fetch_err = |message: String| ExtractionError::Fetch {
            source_ref: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?
            .error_for_status()
            .map_err(|e| fetch_err(e.to_string()))?;

        response.bytes().await.map_err(|e| fetch_err(e.to_string()))
    }
}

#[async_trait]
impl ImageFetcher for SourceFetcher {
    async fn fetch(&self, source: &str) -> Result<Bytes, ExtractionError> {
        if is_remote(source) {
            return self.fetch_remote(source).await;
        }

        let path = self.resolve_path(source);
        tokio::fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|e| ExtractionError::Fetch {
                source_ref: path.display().to_string(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://cdn.example.com/a.jpg"));
        assert!(is_remote("http://localhost/a.jpg"));
        assert!(!is_remote("product-images/a.jpg"));
        assert!(!is_remote("ftp://example.com/a.jpg"));
    }

    #[test]
    fn test_resolve_strips_image_dir_prefix() {
        let fetcher = SourceFetcher::new("/srv/images", Duration::from_secs(1)).unwrap();
        assert_eq!(
            fetcher.resolve_path("product-images/shoe.jpg"),
            PathBuf::from("/srv/images/shoe.jpg")
        );
        assert_eq!(
            fetcher.resolve_path("bags/tote.png"),
            PathBuf::from("/srv/images/bags/tote.png")
        );
        assert_eq!(
            fetcher.resolve_path("/tmp/x.png"),
            PathBuf::from("/tmp/x.png")
        );
    }

    #[tokio::test]
    async fn test_fetch_local_file() {
        let dir = std::env::temp_dir().join(format!("fetch-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.bin"), b"abc").unwrap();

        let fetcher = SourceFetcher::new(&dir, Duration::from_secs(1)).unwrap();
        let bytes = fetcher.fetch("a.bin").await.unwrap();
        assert_eq!(&bytes[..], b"abc");

        let err = fetcher.fetch("missing.bin").await.unwrap_err();
        assert!(matches!(err, ExtractionError::Fetch { .. }));

        std::fs::remove_dir_all(&dir).ok();
    }
}
