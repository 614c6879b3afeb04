use crate::config::ModelSettings;
use crate::infrastructure::StartupError;
use crate::services::detector::{CancerDetector, create_detector};
use std::sync::Arc;
use tracing::{error, info};

pub fn setup_detector(settings: &ModelSettings) -> Result<Arc<dyn CancerDetector>, StartupError> {
    match create_detector(settings) {
        Ok(detector) => {
            info!("🧠 Detector ready: {}", detector.name());
            Ok(detector)
        }
        Err(e) => {
            error!("❌ Detector failed to initialize: {}", e);
            Err(e)
        }
    }
}
