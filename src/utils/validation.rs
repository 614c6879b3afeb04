use crate::config::ModelSettings;
use crate::models::UploadedImage;
use thiserror::Error;

/// Client-caused upload problems. The message is safe to return verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No file uploaded")]
    Empty,

    #[error("File size exceeds {max_mb}MB limit")]
    TooLarge { max_mb: u64 },

    #[error("Invalid file type. Allowed types: {}", .allowed.join(", "))]
    UnsupportedType { allowed: Vec<String> },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::Empty => "EMPTY_FILE",
            ValidationError::TooLarge { .. } => "FILE_TOO_LARGE",
            ValidationError::UnsupportedType { .. } => "INVALID_FILE_TYPE",
        }
    }
}

/// Validates file size against the configured limit
pub fn validate_file_size(size: u64, max_mb: u64) -> Result<(), ValidationError> {
    if size == 0 {
        return Err(ValidationError::Empty);
    }
    if size > max_mb.saturating_mul(1024 * 1024) {
        return Err(ValidationError::TooLarge { max_mb });
    }
    Ok(())
}

/// Validates the lowercase extension against the allowlist
pub fn validate_extension(extension: &str, allowed: &[String]) -> Result<(), ValidationError> {
    if extension.is_empty() || !allowed.iter().any(|a| a == extension) {
        return Err(ValidationError::UnsupportedType {
            allowed: allowed.to_vec(),
        });
    }
    Ok(())
}

/// Full validation pipeline for an uploaded image. Looks at metadata only.
pub fn validate_upload(
    upload: Option<&UploadedImage>,
    settings: &ModelSettings,
) -> Result<(), ValidationError> {
    let upload = upload.ok_or(ValidationError::Empty)?;

    // 1. Size check
    validate_file_size(upload.len, settings.max_file_size_mb)?;

    // 2. Extension check
    validate_extension(&upload.extension(), &settings.allowed_extensions)
}
