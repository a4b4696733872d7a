use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::embeddings::ModelKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub catalog_path: PathBuf,
    pub image_root: PathBuf,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub upload: UploadConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: ModelKind,
    pub model_dir: PathBuf,
    /// Overrides the model's native dimension when set.
    pub dimension: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub result_limit: usize,
    /// Upper bound on concurrent per-item cache lookups within one request.
    pub max_concurrency: usize,
    pub fetch_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub warm_cache_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub allowed_extensions: Vec<String>,
    pub max_bytes: usize,
    /// Keep a copy of each uploaded query image in `dir`.
    pub persist: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl EmbeddingConfig {
    pub fn dimension(&self) -> usize {
        self.dimension.unwrap_or_else(|| self.model.dimension())
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join(self.model.file_name())
    }
}

impl SearchConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl UploadConfig {
    pub fn is_allowed_file(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((_, ext)) => self
                .allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}

impl ServiceConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.embedding.dimension() == 0 {
            return Err("embedding.dimension must be > 0".into());
        }
        if self.search.result_limit == 0 {
            return Err("search.result_limit must be > 0".into());
        }
        if self.search.max_concurrency == 0 {
            return Err("search.max_concurrency must be > 0".into());
        }
        if self.search.fetch_timeout_secs == 0 {
            return Err("search.fetch_timeout_secs must be > 0".into());
        }
        if self.search.request_timeout_secs == 0 {
            return Err("search.request_timeout_secs must be > 0".into());
        }
        if self.upload.allowed_extensions.is_empty() {
            return Err("upload.allowed_extensions must not be empty".into());
        }
        if self.upload.max_bytes == 0 {
            return Err("upload.max_bytes must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("data").join("products.json"),
            image_root: PathBuf::from("product-images"),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            upload: UploadConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let model_dir = if Path::new("models").exists() {
            PathBuf::from("models")
        } else if let Ok(env_path) = std::env::var("MODEL_PATH") {
            PathBuf::from(env_path)
        } else {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("visual-search")
                .join("models")
        };

        Self {
            model: ModelKind::MobileNetV2,
            model_dir,
            dimension: None,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            result_limit: 20,
            max_concurrency: cores.min(8),
            fetch_timeout_secs: 10,
            request_timeout_secs: 60,
            warm_cache_on_start: false,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("uploads"),
            allowed_extensions: ["png", "jpg", "jpeg", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_bytes: 5 * 1024 * 1024,
            persist: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5000);

        Self {
            host: "0.0.0.0".to_string(),
            port,
        }
    }
}
