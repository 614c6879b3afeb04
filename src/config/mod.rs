use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Model and upload configuration, loaded once at startup and shared read-only
#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// Path to the ONNX model file (default: "models/lung_cancer_model.onnx")
    pub model_path: PathBuf,

    /// Directory uploads are staged in before inference (default: "temp_images")
    pub temp_image_storage_path: PathBuf,

    /// Maximum upload size in megabytes (default: 10)
    pub max_file_size_mb: u64,

    /// Allowed file extensions, lowercase with a leading dot
    pub allowed_extensions: Vec<String>,

    /// Detector type: "onnx" or "stub" (default: "onnx")
    pub detector_type: String,

    /// Model input width in pixels (default: 224)
    pub input_width: u32,

    /// Model input height in pixels (default: 224)
    pub input_height: u32,

    /// Upper bound on a single inference call (default: 30s)
    pub inference_timeout_secs: u64,

    /// Canned probability returned by the stub detector
    pub stub_probability: Option<f32>,

    /// Seed for the stub detector when no canned probability is set (default: 42)
    pub stub_seed: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/lung_cancer_model.onnx"),
            temp_image_storage_path: PathBuf::from("temp_images"),
            max_file_size_mb: 10,
            allowed_extensions: normalize_extensions(".png,.jpg,.jpeg,.dcm"),
            detector_type: "onnx".to_string(),
            input_width: 224,
            input_height: 224,
            inference_timeout_secs: 30,
            stub_probability: None,
            stub_seed: 42,
        }
    }
}

impl ModelSettings {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup, falling back to defaults
    /// for missing or unparseable values.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        Self {
            model_path: lookup("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(default.model_path),

            temp_image_storage_path: lookup("TEMP_IMAGE_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(default.temp_image_storage_path),

            max_file_size_mb: lookup("MAX_FILE_SIZE_MB")
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|mb| mb.checked_mul(1024 * 1024).is_some())
                .unwrap_or(default.max_file_size_mb),

            allowed_extensions: lookup("ALLOWED_EXTENSIONS")
                .map(|v| normalize_extensions(&v))
                .filter(|exts| !exts.is_empty())
                .unwrap_or(default.allowed_extensions),

            detector_type: lookup("DETECTOR_TYPE")
                .map(|v| v.trim().to_lowercase())
                .unwrap_or(default.detector_type),

            input_width: lookup("MODEL_INPUT_WIDTH")
                .and_then(|v| v.parse().ok())
                .filter(|w| *w > 0)
                .unwrap_or(default.input_width),

            input_height: lookup("MODEL_INPUT_HEIGHT")
                .and_then(|v| v.parse().ok())
                .filter(|h| *h > 0)
                .unwrap_or(default.input_height),

            inference_timeout_secs: lookup("INFERENCE_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .filter(|s| *s > 0)
                .unwrap_or(default.inference_timeout_secs),

            stub_probability: lookup("STUB_PROBABILITY")
                .and_then(|v| v.parse::<f32>().ok())
                .filter(|p| (0.0..=1.0).contains(p)),

            stub_seed: lookup("STUB_SEED")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.stub_seed),
        }
    }

    /// Config for local development and tests: stub detector, no model file needed
    pub fn development() -> Self {
        Self {
            detector_type: "stub".to_string(),
            temp_image_storage_path: env::temp_dir().join("lung-cancer-detection"),
            ..Self::default()
        }
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }
}

/// Parses a comma separated extension list into lowercase ".ext" entries
pub fn normalize_extensions(raw: &str) -> Vec<String> {
    let mut extensions: Vec<String> = Vec::new();
    for part in raw.split(',') {
        let ext = part.trim().trim_start_matches('.').to_lowercase();
        if ext.is_empty() {
            continue;
        }
        let ext = format!(".{}", ext);
        if !extensions.contains(&ext) {
            extensions.push(ext);
        }
    }
    extensions
}
