use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct HealthReport {
    /// UP | DOWN
    pub status: String,
    pub check: String,
    pub detail: String,
    pub checked_at: String,
}

impl HealthReport {
    fn new(up: bool, check: &str, detail: impl Into<String>) -> Self {
        Self {
            status: if up { "UP" } else { "DOWN" }.to_string(),
            check: check.to_string(),
            detail: detail.into(),
            checked_at: Utc::now().to_rfc3339(),
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/health/live", get(liveness)).route("/health/ready", get(readiness))
}

/// Liveness check
#[utoipa::path(get, path = "/health/live", tag = "meta",
    responses((status = 200, description = "Process is alive", body = HealthReport)))]
pub async fn liveness() -> Json<HealthReport> {
    Json(HealthReport::new(true, "liveness", "Customer service is alive"))
}

/// Readiness check: the customer store must answer
#[utoipa::path(get, path = "/health/ready", tag = "meta",
    responses(
        (status = 200, description = "Store reachable", body = HealthReport),
        (status = 503, description = "Store unreachable", body = HealthReport),
    ))]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    match state.customers.repository().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthReport::new(true, "readiness", "Database connection OK")),
        ),
        Err(e) => {
            tracing::error!(error = %e, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthReport::new(false, "readiness", format!("Database not reachable: {e}"))),
            )
        }
    }
}
