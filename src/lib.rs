pub mod api;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::ModelSettings;
use crate::services::detection_service::DetectionService;
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Cancer Detection API",
        description = "API for detecting lung cancer from CT scan images."
    ),
    paths(
        api::handlers::prediction::predict,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::prediction::DetectionRequest,
            api::handlers::health::HealthResponse,
            models::DetectionResult,
        )
    ),
    tags(
        (name = "prediction", description = "CT scan analysis"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<ModelSettings>,
    pub detection_service: Arc<DetectionService>,
}

/// Multipart framing allowance on top of the upload limit
const MULTIPART_OVERHEAD: usize = 10 * 1024 * 1024;

pub fn create_app(state: AppState) -> Router {
    let body_limit = usize::try_from(state.settings.max_file_size_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get(&api::middleware::request_id::REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>, latency: std::time::Duration, _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/api/prediction", post(api::handlers::prediction::predict))
        .route("/api/Prediction", post(api::handlers::prediction::predict))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(trace_layer)
        // Outermost, so the request span already sees the assigned id
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .with_state(state)
}
