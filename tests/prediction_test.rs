use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use lung_cancer_detection_api::api::error::GENERIC_SERVER_ERROR;
use lung_cancer_detection_api::config::ModelSettings;
use lung_cancer_detection_api::models::DetectionResult;
use lung_cancer_detection_api::services::detection_service::DetectionService;
use lung_cancer_detection_api::services::detector::{CancerDetector, InferenceError, StubDetector};
use lung_cancer_detection_api::services::staging::Stager;
use lung_cancer_detection_api::{AppState, create_app};
use serde_json::Value;
use std::io::Cursor;
use std::fmt::Debug;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

const BOUNDARY: &str = "---------------------------123456789012345678901234567";

struct FailingDetector;

#[async_trait]
impl CancerDetector for FailingDetector {
    async fn predict(&self, image_path: &Path) -> Result<DetectionResult, InferenceError> {
        assert!(image_path.exists(), "staged file must exist during inference");
        Err(InferenceError::Model(format!(
            "forward pass exploded on {}",
            image_path.display()
        )))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

fn setup_app(detector: Arc<dyn CancerDetector>) -> (Router, TempDir) {
    let staging_dir = tempfile::tempdir().unwrap();
    let app = app_staging_in(staging_dir.path(), detector);
    (app, staging_dir)
}

fn app_staging_in(staging_path: &Path, detector: Arc<dyn CancerDetector>) -> Router {
    let settings = Arc::new(ModelSettings {
        temp_image_storage_path: staging_path.to_path_buf(),
        max_file_size_mb: 10,
        allowed_extensions: vec![".png".into(), ".jpg".into(), ".dcm".into()],
        ..ModelSettings::development()
    });
    let stager = Stager::new(staging_path);
    let detection_service = Arc::new(DetectionService::new(settings.clone(), stager, detector));

    create_app(AppState {
        settings,
        detection_service,
    })
}

/// Collects the `request_id` field of every span opened while installed
#[derive(Clone, Default)]
struct RequestIdSpans(Arc<Mutex<Vec<String>>>);

struct RequestIdVisitor<'a>(&'a mut Vec<String>);

impl Visit for RequestIdVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        if field.name() == "request_id" {
            self.0.push(format!("{:?}", value));
        }
    }
}

impl<S: tracing::Subscriber> Layer<S> for RequestIdSpans {
    fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
        attrs.record(&mut RequestIdVisitor(&mut self.0.lock().unwrap()));
    }
}

fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_fn(32, 32, |x, y| image::Rgb([x as u8 * 8, y as u8 * 8, 128]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}

enum Part<'a> {
    File {
        name: &'a str,
        filename: &'a str,
        data: &'a [u8],
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File {
                name,
                filename,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}",
                        name, value
                    )
                    .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Streams the body in 64 KB frames the way a network client would
fn chunked(body: Vec<u8>) -> Body {
    let frames: Vec<Result<Bytes, std::io::Error>> = body
        .chunks(64 * 1024)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    Body::from_stream(futures::stream::iter(frames))
}

async fn post_prediction(app: Router, body: Vec<u8>) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/prediction")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(chunked(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

fn staging_is_empty(dir: &TempDir) -> bool {
    std::fs::read_dir(dir.path()).unwrap().next().is_none()
}

#[tokio::test]
async fn test_no_image_is_a_liveness_check() {
    let (app, staging_dir) = setup_app(Arc::new(StubDetector::fixed(0.82)));

    let body = multipart_body(&[Part::Text {
        name: "PatientId",
        value: "P-001",
    }]);
    let (status, body) = post_prediction(app, body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8_lossy(&body), "Cancer Detection API is running");
    assert!(staging_is_empty(&staging_dir));
}

#[tokio::test]
async fn test_valid_png_returns_detection_result() {
    let (app, staging_dir) = setup_app(Arc::new(StubDetector::fixed(0.82)));
    let png = png_bytes();

    let body = multipart_body(&[
        Part::Text {
            name: "PatientId",
            value: "P-002",
        },
        Part::File {
            name: "CTScanImage",
            filename: "scan.png",
            data: &png,
        },
    ]);
    let (status, body) = post_prediction(app, body).await;

    assert_eq!(status, StatusCode::OK, "{}", String::from_utf8_lossy(&body));
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["hasCancer"], true);
    assert!((json["confidence"].as_f64().unwrap() - 0.82).abs() < 1e-6);
    assert_eq!(json["message"], "Potential cancer detected");
    assert_eq!(json["detailedResults"], "Malignancy confidence: 82.00%");
    assert!(staging_is_empty(&staging_dir));
}

#[tokio::test]
async fn test_field_names_are_case_insensitive() {
    let (app, staging_dir) = setup_app(Arc::new(StubDetector::fixed(0.2)));
    let png = png_bytes();

    let body = multipart_body(&[Part::File {
        name: "ctScanImage",
        filename: "SCAN.PNG",
        data: &png,
    }]);
    let (status, body) = post_prediction(app, body).await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["hasCancer"], false);
    assert_eq!(json["message"], "No signs of cancer detected");
    assert_eq!(json["detailedResults"], "Normal tissue confidence: 80.00%");
    assert!(staging_is_empty(&staging_dir));
}

#[tokio::test]
async fn test_unsupported_extension_is_rejected() {
    let (app, staging_dir) = setup_app(Arc::new(StubDetector::fixed(0.82)));

    let body = multipart_body(&[Part::File {
        name: "CTScanImage",
        filename: "notes.txt",
        data: b"not an image",
    }]);
    let (status, body) = post_prediction(app, body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("Invalid file type"), "{}", text);
    assert!(text.contains(".png, .jpg, .dcm"), "{}", text);
    assert!(staging_is_empty(&staging_dir));
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let (app, staging_dir) = setup_app(Arc::new(StubDetector::fixed(0.82)));
    let data = vec![0u8; 50 * 1024 * 1024];

    let body = multipart_body(&[Part::File {
        name: "CTScanImage",
        filename: "huge.png",
        data: &data,
    }]);
    let (status, body) = post_prediction(app, body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("exceeds 10MB"), "{}", text);
    assert!(staging_is_empty(&staging_dir));
}

#[tokio::test]
async fn test_empty_file_is_rejected() {
    let (app, staging_dir) = setup_app(Arc::new(StubDetector::fixed(0.82)));

    let body = multipart_body(&[Part::File {
        name: "CTScanImage",
        filename: "scan.png",
        data: b"",
    }]);
    let (status, body) = post_prediction(app, body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(String::from_utf8_lossy(&body), "No file uploaded");
    assert!(staging_is_empty(&staging_dir));
}

#[tokio::test]
async fn test_unselected_file_input_is_a_liveness_check() {
    let (app, _staging_dir) = setup_app(Arc::new(StubDetector::fixed(0.82)));

    let body = multipart_body(&[Part::File {
        name: "CTScanImage",
        filename: "",
        data: b"",
    }]);
    let (status, body) = post_prediction(app, body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8_lossy(&body), "Cancer Detection API is running");
}

#[tokio::test]
async fn test_inference_failure_is_generic_and_cleans_up() {
    let (app, staging_dir) = setup_app(Arc::new(FailingDetector));
    let png = png_bytes();

    let body = multipart_body(&[Part::File {
        name: "CTScanImage",
        filename: "scan.png",
        data: &png,
    }]);
    let (status, body) = post_prediction(app, body).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let text = String::from_utf8_lossy(&body);
    assert_eq!(text, GENERIC_SERVER_ERROR);
    assert!(!text.contains("exploded"));
    assert!(staging_is_empty(&staging_dir));
}

#[tokio::test]
async fn test_repeated_requests_give_identical_results() {
    let (app, _staging_dir) = setup_app(Arc::new(StubDetector::seeded(42)));
    let png = png_bytes();
    let body = multipart_body(&[Part::File {
        name: "CTScanImage",
        filename: "scan.png",
        data: &png,
    }]);

    let (status_a, first) = post_prediction(app.clone(), body.clone()).await;
    let (status_b, second) = post_prediction(app, body).await;

    assert_eq!(status_a, StatusCode::OK);
    assert_eq!(status_b, StatusCode::OK);
    let first: Value = serde_json::from_slice(&first).unwrap();
    let second: Value = serde_json::from_slice(&second).unwrap();
    assert_eq!(first, second);
    let confidence = first["confidence"].as_f64().unwrap();
    assert!((0.5..=1.0).contains(&confidence));
}

#[tokio::test]
async fn test_original_route_casing_is_served() {
    let (app, _staging_dir) = setup_app(Arc::new(StubDetector::fixed(0.82)));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/Prediction")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(multipart_body(&[Part::Text {
                    name: "PatientId",
                    value: "P-003",
                }])))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_and_request_id() {
    let (app, _staging_dir) = setup_app(Arc::new(StubDetector::fixed(0.82)));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "req-123");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["detector"], "stub");
}

#[tokio::test]
async fn test_request_id_is_generated_when_missing() {
    let (app, _staging_dir) = setup_app(Arc::new(StubDetector::fixed(0.82)));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let request_id = response.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(request_id).is_ok());
}

#[tokio::test]
async fn test_request_span_carries_the_echoed_request_id() {
    let spans = RequestIdSpans::default();
    let subscriber = tracing_subscriber::registry().with(spans.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let (app, _staging_dir) = setup_app(Arc::new(StubDetector::fixed(0.82)));
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let echoed = response.headers()["x-request-id"].to_str().unwrap().to_string();
    let recorded = spans.0.lock().unwrap().clone();
    assert_eq!(recorded, vec![echoed]);
}

#[tokio::test]
async fn test_staging_failure_is_generic_500() {
    let root = tempfile::tempdir().unwrap();
    let blocker = root.path().join("not-a-directory");
    std::fs::write(&blocker, b"file").unwrap();
    let app = app_staging_in(&blocker.join("staging"), Arc::new(StubDetector::fixed(0.82)));

    let png = png_bytes();
    let body = multipart_body(&[
        Part::Text {
            name: "PatientId",
            value: "P-007",
        },
        Part::File {
            name: "CTScanImage",
            filename: "scan.png",
            data: &png,
        },
    ]);
    let (status, body) = post_prediction(app, body).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let text = String::from_utf8_lossy(&body);
    assert_eq!(text, GENERIC_SERVER_ERROR);
    assert!(!text.contains("not-a-directory"));
    assert_eq!(std::fs::read(&blocker).unwrap(), b"file");
}
