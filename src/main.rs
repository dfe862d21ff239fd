//! OCR Gateway
//!
//! A thin HTTP service wrapping a pre-trained OCR engine: accepts an image by
//! upload or URL, validates it, normalizes it, runs recognition, and returns
//! structured detections (text, confidence, bounding polygon).

use anyhow::Context;
use axum::{extract::DefaultBodyLimit, routing::get, Json, Router};
use serde::Serialize;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod engine;
mod error;
mod fetcher;
mod imaging;
mod routes;
mod state;
mod validators;

use config::Config;
use engine::OcrEngine;
use state::AppState;

#[derive(Serialize)]
struct ServiceInfo {
    service: &'static str,
    version: &'static str,
    status: &'static str,
    ocr_engine: &'static str,
}

async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "ocr-gateway",
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
        ocr_engine: "tesseract",
    })
}

/// Builds the full application router over a prepared state.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(service_info))
        .merge(routes::health::router())
        // The upload route streams the body itself under the configured byte
        // cap, so the transport-level limit is lifted here.
        .nest(
            "/api/v1/ocr",
            routes::ocr::router().layer(DefaultBodyLimit::disable()),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn main() -> anyhow::Result<()> {
    // Load .env before tracing so LOG_LEVEL from the file is honored
    dotenvy::dotenv().ok();

    // Initialize tracing; RUST_LOG wins over LOG_LEVEL
    let default_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("ocr_gateway={default_level},tower_http={default_level}").into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    // WORKERS pins the runtime thread count; unset leaves tokio's default
    // (one per core).
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(workers) = config.server.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.build().context("failed to build runtime")?;

    runtime.block_on(serve(config))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting OCR Gateway v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Limits: max upload {} bytes, max dimension {} px",
        config.limits.max_file_size,
        config.limits.max_image_dimension
    );

    // Construct and initialize the engine before binding the listener: a
    // process that cannot recognize anything must not accept traffic.
    let engine = OcrEngine::new(config.ocr.clone());
    engine
        .initialize()
        .await
        .context("OCR engine initialization failed, refusing to serve")?;

    let http_client = fetcher::build_client().context("failed to build HTTP client")?;

    let app_state = AppState::new(config.clone(), engine, http_client);
    let app = app(app_state.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("OCR Gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Release the engine before the runtime tears down; this hook runs ahead
    // of default termination handling so a backend with its own signal
    // expectations exits cleanly.
    app_state.shutdown().await;
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
