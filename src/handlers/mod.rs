//! # API Handlers
//!
//! HTTP endpoint handlers for the Unitrack API.

use axum::{extract::State, http::StatusCode, response::Json};

use crate::error::ApiError;
use crate::models::ServiceInfo;
use crate::server::AppState;

pub mod connections;
pub mod data;
pub mod planner;
pub mod units;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Liveness/readiness check; pings the database when one is configured.
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service healthy"),
        (status = 503, description = "Database unreachable", body = ApiError)
    ),
    tag = "root"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(db) = &state.db {
        crate::db::health_check(db).await.map_err(|error| {
            tracing::error!(%error, "health check failed");
            ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "Database unreachable",
            )
        })?;
    }

    Ok(Json(serde_json::json!({ "status": "ok" })))
}
