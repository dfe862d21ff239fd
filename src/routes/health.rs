//! Health check endpoints
//!
//! `/health` is a pure liveness probe and never looks at the engine.
//! `/health/ready` reports engine state but still always answers 200; a pod
//! that is alive but not ready must not be restarted, only kept out of
//! rotation.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub engine_initialized: bool,
    pub gpu_available: bool,
    pub version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn readiness_check(State(state): State<AppState>) -> Json<ReadinessResponse> {
    let engine = state.engine();
    let initialized = engine.is_ready();

    Json(ReadinessResponse {
        status: if initialized { "ready" } else { "not_ready" },
        engine_initialized: initialized,
        gpu_available: engine.is_gpu_enabled(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
}
