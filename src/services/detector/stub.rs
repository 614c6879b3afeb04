use super::{CancerDetector, InferenceError, checked_probability};
use crate::config::ModelSettings;
use crate::models::DetectionResult;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use xxhash_rust::xxh3::xxh3_64;

/// Test double for development and integration tests. Needs no model file.
///
/// Returns `probability` when set; otherwise draws one from an RNG seeded with
/// `seed ^ xxh3(file bytes)`, so the same image always gets the same result.
#[derive(Debug, Clone)]
pub struct StubDetector {
    probability: Option<f32>,
    seed: u64,
}

impl StubDetector {
    pub fn fixed(probability: f32) -> Self {
        Self {
            probability: Some(probability),
            seed: 0,
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            probability: None,
            seed,
        }
    }

    pub fn from_settings(settings: &ModelSettings) -> Self {
        match settings.stub_probability {
            Some(p) => Self::fixed(p),
            None => Self::seeded(settings.stub_seed),
        }
    }

    fn probability_for(&self, content: &[u8]) -> f32 {
        match self.probability {
            Some(p) => p,
            None => StdRng::seed_from_u64(self.seed ^ xxh3_64(content)).gen_range(0.0..=1.0),
        }
    }
}

#[async_trait::async_trait]
impl CancerDetector for StubDetector {
    async fn predict(&self, image_path: &Path) -> Result<DetectionResult, InferenceError> {
        // Read the staged file anyway so staging is exercised end to end
        let content = tokio::fs::read(image_path).await?;
        let probability = checked_probability(self.probability_for(&content))?;
        Ok(DetectionResult::from_probability(probability))
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}
