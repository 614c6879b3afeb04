use clap::Parser;
use dotenvy::dotenv;
use lung_cancer_detection_api::config::ModelSettings;
use lung_cancer_detection_api::infrastructure::{detector, staging};
use lung_cancer_detection_api::services::detection_service::DetectionService;
use lung_cancer_detection_api::{AppState, create_app};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the API server
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Detector to use (onnx, stub). Overrides DETECTOR_TYPE.
    #[arg(short, long)]
    detector: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & Logging Setup
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lung_cancer_detection_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Cancer Detection API...");

    // 2. Configuration
    let mut settings = ModelSettings::from_env();
    if let Some(detector_type) = args.detector {
        settings.detector_type = detector_type.trim().to_lowercase();
    }
    info!(
        "⚙️  Model Config: Detector={}, Model={}, Max Size={}MB, Allowed={}",
        settings.detector_type,
        settings.model_path.display(),
        settings.max_file_size_mb,
        settings.allowed_extensions.join(", ")
    );

    // 3. Staging directory and model. Either failing stops startup.
    let stager = staging::setup_staging(&settings).await?;
    let detector = detector::setup_detector(&settings)?;

    let settings = Arc::new(settings);
    let detection_service = Arc::new(DetectionService::new(
        settings.clone(),
        stager,
        detector,
    ));
    let state = AppState {
        settings,
        detection_service,
    };

    // 4. HTTP server
    let app = create_app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ API Server listening on: http://0.0.0.0:{}", args.port);
    info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", args.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Cancer Detection API exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
