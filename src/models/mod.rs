use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;
use utoipa::ToSchema;

/// An image received from a client, owned by the request that read it.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    /// Client-supplied filename
    pub file_name: String,
    pub content_type: Option<String>,
    /// Body bytes. Empty when reading stopped early because of the size limit.
    pub data: Bytes,
    /// Number of bytes the client sent. When reading stopped at the size
    /// limit this is a lower bound that already exceeds the limit.
    pub len: u64,
}

impl UploadedImage {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            file_name: file_name.into(),
            content_type: None,
            len: data.len() as u64,
            data,
        }
    }

    /// Lowercase extension of the filename with a leading dot, or an empty
    /// string when there is none.
    pub fn extension(&self) -> String {
        // Only the last path component counts, whatever separator the client used
        let name = self
            .file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();

        Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default()
    }
}

/// Outcome of one CT scan analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub has_cancer: bool,
    /// Probability mass of the predicted class, in [0.5, 1] for model output
    pub confidence: f32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detailed_results: Option<String>,
}

impl DetectionResult {
    pub const CANCER_THRESHOLD: f32 = 0.5;

    /// Interprets the model's raw cancer probability.
    ///
    /// The caller is responsible for checking that `probability` lies in [0, 1].
    pub fn from_probability(probability: f32) -> Self {
        let has_cancer = probability > Self::CANCER_THRESHOLD;
        let confidence = if has_cancer {
            probability
        } else {
            1.0 - probability
        };
        let percent = f64::from(confidence) * 100.0;

        if has_cancer {
            Self {
                has_cancer,
                confidence,
                message: "Potential cancer detected".to_string(),
                detailed_results: Some(format!("Malignancy confidence: {:.2}%", percent)),
            }
        } else {
            Self {
                has_cancer,
                confidence,
                message: "No signs of cancer detected".to_string(),
                detailed_results: Some(format!("Normal tissue confidence: {:.2}%", percent)),
            }
        }
    }
}
