pub mod onnx;
pub mod stub;

pub use onnx::OnnxDetector;
pub use stub::StubDetector;

use crate::config::ModelSettings;
use crate::infrastructure::StartupError;
use crate::models::DetectionResult;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Server-side failures while turning a staged image into a result.
/// Never shown to the client.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Failed to read staged image: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("Model execution failed: {0}")]
    Model(String),

    #[error("Model produced an invalid probability: {0}")]
    InvalidOutput(String),

    #[error("Inference timed out after {0:?}")]
    Timeout(Duration),

    #[error("Inference task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

/// Turns a staged CT scan into a detection result.
#[async_trait::async_trait]
pub trait CancerDetector: Send + Sync {
    async fn predict(&self, image_path: &Path) -> Result<DetectionResult, InferenceError>;

    /// Short identifier reported by the health endpoint
    fn name(&self) -> &'static str;
}

/// Checks a raw model score before it is interpreted
pub fn checked_probability(raw: f32) -> Result<f32, InferenceError> {
    if !raw.is_finite() || !(0.0..=1.0).contains(&raw) {
        return Err(InferenceError::InvalidOutput(raw.to_string()));
    }
    Ok(raw)
}

/// Factory function to create the detector selected by config.
/// Loading the real model happens here, once, before traffic is accepted.
pub fn create_detector(settings: &ModelSettings) -> Result<Arc<dyn CancerDetector>, StartupError> {
    match settings.detector_type.as_str() {
        "onnx" | "model" => Ok(Arc::new(OnnxDetector::load(settings)?)),
        "stub" | "mock" => {
            tracing::warn!("Using StubDetector: results are canned and NOT medical output");
            Ok(Arc::new(StubDetector::from_settings(settings)))
        }
        other => Err(StartupError::Configuration(format!(
            "Unknown detector type '{}', expected 'onnx' or 'stub'",
            other
        ))),
    }
}
