use anyhow::{anyhow, Context, Result};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

use super::preprocess::{self, INPUT_SIZE};
use super::{ImageEmbedder, ModelKind};
use crate::config::EmbeddingConfig;

#[derive(Clone, Debug)]
pub struct OnnxModelConfig {
    pub model_path: PathBuf,
    pub kind: ModelKind,
    pub dimension: usize,
}

impl From<&EmbeddingConfig> for OnnxModelConfig {
    fn from(config: &EmbeddingConfig) -> Self {
        Self {
            model_path: config.model_path(),
            kind: config.model,
            dimension: config.dimension(),
        }
    }
}

/// CNN feature extractor backed by an ONNX export of a pretrained backbone
/// with the classification head removed.
pub struct OnnxImageEmbedder {
    session: Arc<Mutex<Session>>,
    input_name: String,
    config: OnnxModelConfig,
}

impl OnnxImageEmbedder {
    pub fn new(config: OnnxModelConfig) -> Result<Self> {
        ort::init().with_name("visual_search").commit();

        if !config.model_path.exists() {
            return Err(anyhow!(
                "Model file not found at: {}",
                config.model_path.display()
            ));
        }

        let model_bytes = std::fs::read(&config.model_path)
            .map_err(|e| anyhow!("Failed to read model: {:?}", e))?;

        let num_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        let session = Session::builder()
            .map_err(|e| anyhow!("Session builder: {:?}", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow!("Optimization level: {:?}", e))?
            .with_intra_threads(num_threads)
            .map_err(|e| anyhow!("Intra threads: {:?}", e))?
            .commit_from_memory(&model_bytes)
            .map_err(|e| anyhow!("Failed to load model: {:?}", e))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "input".to_string());

        tracing::info!(
            "Loaded {} from {} (input '{}', {} dims)",
            config.kind.display_name(),
            config.model_path.display(),
            input_name,
            config.dimension
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            config,
        })
    }

    fn run(&self, pixels: Vec<f32>) -> Result<Vec<f32>> {
        let size = INPUT_SIZE as usize;
        let shape = vec![1, 3, size, size];
        let input = Value::from_array((shape, pixels))
            .map_err(|e| anyhow!("input tensor: {:?}", e))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| anyhow!("Inference failed: {:?}", e))?;

        // Pooled backbones have a single output of shape [1, D] (or [1, D, 1, 1])
        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| anyhow!("Model produced no outputs"))?;
        let (_shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| anyhow!("Failed to extract features: {:?}", e))?;

        let features: Vec<f32> = data.to_vec();
        if features.iter().any(|v| !v.is_finite()) {
            return Err(anyhow!("Image features contain non-finite values"));
        }
        Ok(features)
    }
}

impl ImageEmbedder for OnnxImageEmbedder {
    fn embed(&self, image: &[u8]) -> Result<Vec<f32>> {
        let decoded = preprocess::decode(image).context("Failed to decode image")?;
        let tensor = preprocess::to_tensor(&decoded, self.config.kind);
        let pixels: Vec<f32> = tensor.iter().copied().collect();

        let features = self.run(pixels)?;
        if self.config.kind.normalize_output() {
            Ok(preprocess::l2_normalize(features))
        } else {
            Ok(features)
        }
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        self.config.kind.display_name()
    }
}
