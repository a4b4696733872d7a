pub mod onnx;
pub mod preprocess;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use onnx::OnnxImageEmbedder;

/// Unified image embedding model trait
pub trait ImageEmbedder: Send + Sync {
    /// Embed encoded image bytes (png/jpeg/webp). May block for the duration of inference.
    fn embed(&self, image: &[u8]) -> Result<Vec<f32>>;

    /// Embedding vector dimension
    fn dimension(&self) -> usize;

    /// Human-readable model identifier
    fn model_name(&self) -> &str;
}

/// Pretrained backbones the service knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "mobilenet_v2")]
    MobileNetV2,
    #[serde(rename = "resnet50")]
    ResNet50,
}

impl ModelKind {
    pub fn dimension(self) -> usize {
        match self {
            Self::MobileNetV2 => 1280,
            Self::ResNet50 => 2048,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::MobileNetV2 => "MobileNetV2",
            Self::ResNet50 => "ResNet50",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Self::MobileNetV2 => "mobilenet_v2.onnx",
            Self::ResNet50 => "resnet50.onnx",
        }
    }

    /// MobileNetV2 features are L2-normalised on the way out; ResNet50 features are raw.
    pub fn normalize_output(self) -> bool {
        matches!(self, Self::MobileNetV2)
    }
}
