//! # LMS Connection Handlers
//!
//! Connect a Canvas account (token verification + encrypted storage),
//! list and remove connections, and trigger syncs. Secret material never
//! appears in any response shape here.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{ApiAuth, OwnerExtension, OwnerHeader};
use crate::canvas::CanvasError;
use crate::canvas::mapper;
use crate::crypto::secret_aad;
use crate::error::{ApiError, host_not_allowed, validation_error};
use crate::models::PROVIDER_CANVAS;
use crate::server::AppState;
use crate::storage::NewConnection;
use crate::sync::{SyncFailure, SyncOutcome, SyncSummary};

/// One allowlisted institution, as shown to clients.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InstitutionInfo {
    /// Stable key to pass when connecting
    pub key: String,
    /// Human-readable institution name
    pub label: String,
    /// Canvas base URL
    pub base_url: String,
}

/// Request body for creating a connection
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConnectRequest {
    /// Key of an allowlisted institution (see `GET /lms/institutions`)
    pub host_key: String,
    /// Canvas access token generated by the user
    pub access_token: String,
}

/// Connection information for API responses
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConnectionInfo {
    /// Unique identifier for the connection
    #[schema(value_type = String)]
    pub id: Uuid,
    /// Provider tag (always "canvas")
    pub provider: String,
    /// Base URL of the connected instance
    pub base_url: String,
    /// Cached profile snippet from the last sync
    pub metadata: serde_json::Value,
    /// When the last successful sync finished
    pub last_synced_at: Option<String>,
}

impl From<crate::models::connection::Model> for ConnectionInfo {
    fn from(model: crate::models::connection::Model) -> Self {
        Self {
            id: model.id,
            provider: model.provider,
            base_url: model.base_url,
            metadata: model.metadata.unwrap_or_default(),
            last_synced_at: model.last_synced_at.map(|dt| {
                let utc: DateTime<Utc> = dt.naive_utc().and_utc();
                utc.to_rfc3339()
            }),
        }
    }
}

/// Response for the sync endpoint: either a completed summary or the
/// distinguished "disconnected" outcome (expired token, please reconnect).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncResponse {
    /// "completed" or "disconnected"
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SyncSummary>,
}

/// Lists the allowlisted institutions
#[utoipa::path(
    get,
    path = "/lms/institutions",
    responses(
        (status = 200, description = "Allowlisted Canvas instances", body = [InstitutionInfo])
    ),
    tag = "lms"
)]
pub async fn list_institutions(State(state): State<AppState>) -> Json<Vec<InstitutionInfo>> {
    let institutions = state
        .allowlist
        .hosts()
        .iter()
        .map(|host| InstitutionInfo {
            key: host.key.clone(),
            label: host.label.clone(),
            base_url: host.base_url.clone(),
        })
        .collect();
    Json(institutions)
}

/// Lists the owner's connections
#[utoipa::path(
    get,
    path = "/lms/connections",
    security(("bearer_auth" = [])),
    params(OwnerHeader),
    responses(
        (status = 200, description = "Connections for the owner", body = [ConnectionInfo]),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "lms"
)]
pub async fn list_connections(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
) -> Result<Json<Vec<ConnectionInfo>>, ApiError> {
    let connections = state.store.list_connections(owner.0).await?;
    Ok(Json(
        connections.into_iter().map(ConnectionInfo::from).collect(),
    ))
}

/// Creates a connection after verifying the token against Canvas
#[utoipa::path(
    post,
    path = "/lms/connections",
    security(("bearer_auth" = [])),
    params(OwnerHeader),
    request_body = ConnectRequest,
    responses(
        (status = 201, description = "Connection created", body = ConnectionInfo),
        (status = 400, description = "Unknown institution or rejected token", body = ApiError),
        (status = 409, description = "Already connected to this institution", body = ApiError)
    ),
    tag = "lms"
)]
pub async fn create_connection(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Json(body): Json<ConnectRequest>,
) -> Result<(StatusCode, Json<ConnectionInfo>), ApiError> {
    if body.access_token.trim().is_empty() {
        return Err(validation_error(
            "Validation failed",
            serde_json::json!({ "access_token": "must not be empty" }),
        ));
    }

    let host = state
        .allowlist
        .by_key(&body.host_key)
        .map_err(|_| {
            validation_error(
                "Unknown institution",
                serde_json::json!({ "host_key": body.host_key }),
            )
        })?
        .clone();

    // Verify the token before storing anything.
    let profile = state
        .client
        .fetch_profile(&host.base_url, &body.access_token)
        .await
        .map_err(|error| match error {
            CanvasError::TokenInvalid => validation_error(
                "Canvas rejected the access token",
                serde_json::json!({ "access_token": "invalid or expired" }),
            ),
            CanvasError::HostNotAllowed(_) => host_not_allowed(&host.base_url),
            other => {
                tracing::warn!(%other, "canvas verification failed");
                ApiError::new(
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_UNAVAILABLE",
                    "Canvas could not be reached to verify the token",
                )
            }
        })?;

    let snippet = mapper::map_profile(&profile);
    let connection = state
        .store
        .create_connection(
            owner.0,
            NewConnection {
                provider: PROVIDER_CANVAS.to_string(),
                base_url: host.base_url.clone(),
                metadata: Some(serde_json::json!({
                    "profile": {
                        "external_id": snippet.external_id,
                        "name": snippet.name,
                    }
                })),
            },
        )
        .await?;

    let aad = secret_aad(&owner.0, PROVIDER_CANVAS, &host.base_url);
    let encrypted = state.cipher.encrypt(&aad, &body.access_token).map_err(|error| {
        tracing::error!(%error, "token encryption failed");
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Failed to store credentials",
        )
    })?;
    if let Err(error) = state
        .store
        .put_secret(owner.0, connection.id, encrypted)
        .await
    {
        // A connection without a secret can never sync; undo it.
        if let Err(cleanup) = state.store.delete_connection(owner.0, connection.id).await {
            tracing::warn!(%cleanup, "failed to remove secretless connection");
        }
        return Err(error.into());
    }

    Ok((StatusCode::CREATED, Json(ConnectionInfo::from(connection))))
}

/// Deletes a connection and its stored secret
#[utoipa::path(
    delete,
    path = "/lms/connections/{id}",
    security(("bearer_auth" = [])),
    params(
        OwnerHeader,
        ("id" = String, Path, description = "Connection id")
    ),
    responses(
        (status = 204, description = "Connection deleted"),
        (status = 404, description = "Connection not found", body = ApiError)
    ),
    tag = "lms"
)]
pub async fn delete_connection(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_connection(owner.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Runs a sync for one connection
#[utoipa::path(
    post,
    path = "/lms/connections/{id}/sync",
    security(("bearer_auth" = [])),
    params(
        OwnerHeader,
        ("id" = String, Path, description = "Connection id")
    ),
    responses(
        (status = 200, description = "Sync completed or connection disconnected", body = SyncResponse),
        (status = 400, description = "Host not allowlisted", body = ApiError),
        (status = 404, description = "Connection not found", body = ApiError),
        (status = 409, description = "Sync already running", body = ApiError),
        (status = 502, description = "Canvas unreachable", body = ApiError)
    ),
    tag = "lms"
)]
pub async fn sync_connection(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Path(id): Path<Uuid>,
) -> Result<Json<SyncResponse>, ApiError> {
    match state.sync.sync_connection(owner.0, id).await {
        Ok(SyncOutcome::Completed(summary)) => Ok(Json(SyncResponse {
            status: "completed".to_string(),
            summary: Some(summary),
        })),
        Ok(SyncOutcome::Disconnected) => Ok(Json(SyncResponse {
            status: "disconnected".to_string(),
            summary: None,
        })),
        Err(failure) => Err(sync_failure_to_api_error(failure)),
    }
}

fn sync_failure_to_api_error(failure: SyncFailure) -> ApiError {
    let reason = failure.reason_code();
    let error = match &failure {
        SyncFailure::NotFound => ApiError::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Connection not found",
        ),
        SyncFailure::HostNotAllowed { base_url } => host_not_allowed(base_url),
        SyncFailure::Decryption => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "DECRYPTION_FAILED",
            "Stored credentials could not be decrypted",
        ),
        SyncFailure::Network { details } => {
            tracing::warn!(details, "sync failed on upstream error");
            ApiError::new(
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_UNAVAILABLE",
                "Canvas could not be reached; try again later",
            )
        }
        SyncFailure::AlreadyRunning => ApiError::new(
            StatusCode::CONFLICT,
            "CONFLICT",
            "A sync for this connection is already running",
        ),
        SyncFailure::Storage(error) => {
            tracing::error!(%error, "sync failed on storage error");
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Sync failed",
            )
        }
    };
    error.with_details(serde_json::json!({ "reason": reason }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_failures_map_to_reasoned_errors() {
        let error = sync_failure_to_api_error(SyncFailure::NotFound);
        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert_eq!(
            error.details.unwrap().get("reason").unwrap(),
            "not_found"
        );

        let error = sync_failure_to_api_error(SyncFailure::Decryption);
        assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.code, Box::from("DECRYPTION_FAILED"));

        let error = sync_failure_to_api_error(SyncFailure::Network {
            details: "timeout".to_string(),
        });
        assert_eq!(error.status, StatusCode::BAD_GATEWAY);
        assert_eq!(error.details.unwrap().get("reason").unwrap(), "network");

        let error = sync_failure_to_api_error(SyncFailure::AlreadyRunning);
        assert_eq!(error.status, StatusCode::CONFLICT);
    }

    #[test]
    fn connection_info_hides_secret_material() {
        let json = serde_json::to_value(ConnectionInfo {
            id: Uuid::new_v4(),
            provider: "canvas".to_string(),
            base_url: "https://canvas.qut.edu.au".to_string(),
            metadata: serde_json::json!({}),
            last_synced_at: None,
        })
        .unwrap();

        let rendered = json.to_string();
        assert!(!rendered.contains("ciphertext"));
        assert!(!rendered.contains("token"));
    }

    #[test]
    fn sync_response_omits_summary_when_disconnected() {
        let response = SyncResponse {
            status: "disconnected".to_string(),
            summary: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("summary"));
    }
}
