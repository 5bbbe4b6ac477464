//! Operational HTTP endpoints.
//!
//! - `/healthz` : liveness
//! - `/readyz`  : readiness (503 until the transport is up and a model is loaded)
//! - `/status`  : merged bridge status as JSON

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::status::StatusConsolidator;

pub fn build_router(status: StatusConsolidator) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/status", get(status_json))
        .with_state(status)
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn readyz(State(status): State<StatusConsolidator>) -> impl IntoResponse {
    if status.status().is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

pub async fn status_json(State(status): State<StatusConsolidator>) -> impl IntoResponse {
    Json(status.status())
}
