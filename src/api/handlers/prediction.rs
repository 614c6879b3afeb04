use crate::AppState;
use crate::api::error::AppError;
use crate::models::UploadedImage;
use axum::{
    Json,
    extract::{Multipart, State, multipart::Field},
    response::{IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use serde::Deserialize;
use tracing::{error, info, warn};
use utoipa::ToSchema;

pub const IMAGE_FIELD: &str = "CTScanImage";
pub const PATIENT_ID_FIELD: &str = "PatientId";
pub const LIVENESS_MESSAGE: &str = "Cancer Detection API is running";

/// Multipart form accepted by the prediction endpoint
#[derive(Deserialize, ToSchema)]
pub struct DetectionRequest {
    /// CT scan image. Omit it to use the endpoint as a liveness check.
    #[serde(rename = "CTScanImage")]
    #[schema(value_type = Option<String>, format = Binary)]
    pub ct_scan_image: Option<Vec<u8>>,

    #[serde(rename = "PatientId")]
    pub patient_id: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/prediction",
    request_body(content = DetectionRequest, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Detection result, or a plain-text liveness message when no image is attached", body = crate::models::DetectionResult),
        (status = 400, description = "Invalid upload", body = String, content_type = "text/plain"),
        (status = 500, description = "Processing failed", body = String, content_type = "text/plain")
    ),
    tag = "prediction"
)]
pub async fn predict(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let limit = state.detection_service.settings().max_file_size_bytes();
    let mut patient_id: Option<String> = None;
    let mut upload: Option<UploadedImage> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if name.eq_ignore_ascii_case(IMAGE_FIELD) {
            let image = read_image_field(field, limit).await?;
            let oversized = image.len > limit;
            upload = Some(image);
            // The rest of the body is not read once the limit is passed
            if oversized {
                break;
            }
        } else if name.eq_ignore_ascii_case(PATIENT_ID_FIELD) {
            patient_id = Some(field.text().await?);
        }
    }

    // A file input left empty by the client is the same as no file at all
    let upload = upload.filter(|u| !(u.len == 0 && u.file_name.is_empty()));
    let Some(upload) = upload else {
        return Ok(LIVENESS_MESSAGE.into_response());
    };

    let patient = patient_id.as_deref().unwrap_or("unknown");
    info!("Processing CT scan for patient {}", patient);

    match state.detection_service.analyze_ct_scan(&upload).await {
        Ok(result) => {
            info!(
                "Analysis completed for patient {}. Result: {}",
                patient, result.message
            );
            Ok(Json(result).into_response())
        }
        Err(AppError::Validation(e)) => {
            warn!(code = e.code(), "Invalid request for patient {}: {}", patient, e);
            Err(AppError::Validation(e))
        }
        Err(e) => {
            error!("Error processing CT scan for patient {}: {}", patient, e);
            Err(e)
        }
    }
}

/// Reads the image part chunk by chunk. Stops as soon as more than `limit`
/// bytes have arrived and returns an empty body with the count seen so far.
async fn read_image_field(mut field: Field<'_>, limit: u64) -> Result<UploadedImage, AppError> {
    let file_name = field.file_name().unwrap_or_default().to_string();
    let content_type = field.content_type().map(str::to_string);

    let mut buffer = BytesMut::new();
    let mut len: u64 = 0;

    while let Some(chunk) = field.chunk().await? {
        len += chunk.len() as u64;
        if len > limit {
            return Ok(UploadedImage {
                file_name,
                content_type,
                data: Bytes::new(),
                len,
            });
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(UploadedImage {
        file_name,
        content_type,
        data: buffer.freeze(),
        len,
    })
}
