//! Liveness and readiness probes.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

pub async fn liveness() -> Json<HealthStatus> {
    Json(HealthStatus { status: "ok" })
}

/// Reports ready once the database answers.
pub async fn readiness(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthStatus>) {
    match state.stores.health.ping().await {
        Ok(()) => (StatusCode::OK, Json(HealthStatus { status: "ok" })),
        Err(e) => {
            tracing::error!(error = %e, "readiness check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(HealthStatus { status: "ng" }),
            )
        }
    }
}
