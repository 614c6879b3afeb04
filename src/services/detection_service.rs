use crate::api::error::AppError;
use crate::config::ModelSettings;
use crate::models::{DetectionResult, UploadedImage};
use crate::services::detector::{CancerDetector, InferenceError};
use crate::services::staging::Stager;
use crate::utils::validation::validate_upload;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, warn};

/// Runs one upload through validation, staging and inference.
pub struct DetectionService {
    settings: Arc<ModelSettings>,
    stager: Stager,
    detector: Arc<dyn CancerDetector>,
}

impl DetectionService {
    pub fn new(
        settings: Arc<ModelSettings>,
        stager: Stager,
        detector: Arc<dyn CancerDetector>,
    ) -> Self {
        Self {
            settings,
            stager,
            detector,
        }
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    /// Validates, stages and analyzes a CT scan. The staged file is gone by
    /// the time this returns, whatever the outcome.
    pub async fn analyze_ct_scan(&self, upload: &UploadedImage) -> Result<DetectionResult, AppError> {
        validate_upload(Some(upload), &self.settings)?;

        let mut staged = self.stager.stage(upload).await?;
        let outcome = self.predict_with_timeout(staged.path()).await;

        if let Err(e) = staged.release() {
            warn!(
                "Failed to remove staged file {}: {}",
                staged.path().display(),
                e
            );
        }

        Ok(outcome?)
    }

    async fn predict_with_timeout(&self, path: &Path) -> Result<DetectionResult, InferenceError> {
        let timeout = self.settings.inference_timeout();

        let outcome = match tokio::time::timeout(timeout, self.detector.predict(path)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(InferenceError::Timeout(timeout)),
        };

        if let Err(e) = &outcome {
            error!(
                detector = self.detector.name(),
                staged_path = %path.display(),
                "Error during prediction: {:?}",
                e
            );
        }
        outcome
    }
}
