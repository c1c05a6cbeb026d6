//! # Data Export/Import Handlers
//!
//! Whole-account JSON export and import. The bundle round-trips every
//! entity collection except secrets, which never leave the codec
//! boundary.

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{ApiAuth, OwnerExtension, OwnerHeader};
use crate::error::ApiError;
use crate::server::AppState;
use crate::storage::ExportBundle;

/// Result of an import
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ImportResponse {
    /// Number of records written
    pub imported: usize,
}

/// Exports every collection for the owner
#[utoipa::path(
    get,
    path = "/data/export",
    security(("bearer_auth" = [])),
    params(OwnerHeader),
    responses(
        (status = 200, description = "All collections for the owner as JSON"),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "data"
)]
pub async fn export_data(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
) -> Result<Json<ExportBundle>, ApiError> {
    Ok(Json(state.store.export(owner.0).await?))
}

/// Imports a previously exported bundle
#[utoipa::path(
    post,
    path = "/data/import",
    security(("bearer_auth" = [])),
    params(OwnerHeader),
    responses(
        (status = 200, description = "Records imported", body = ImportResponse),
        (status = 400, description = "Malformed bundle", body = ApiError)
    ),
    tag = "data"
)]
pub async fn import_data(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Json(bundle): Json<ExportBundle>,
) -> Result<Json<ImportResponse>, ApiError> {
    let imported = state.store.import(owner.0, bundle).await?;
    Ok(Json(ImportResponse { imported }))
}
