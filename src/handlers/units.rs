//! # Unit Handlers
//!
//! Listing, manual creation, updates and deletion of units. Synced units
//! are owned by the sync pipeline; deleting one here is the explicit user
//! action that removes it (a course disappearing from Canvas never does).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::IntoParams;
use uuid::Uuid;

use crate::auth::{ApiAuth, OwnerExtension, OwnerHeader};
use crate::error::ApiError;
use crate::models::unit;
use crate::server::AppState;
use crate::storage::{NewUnit, UnitFilter, UnitPatch};

/// Query parameters for unit listing; all filters are conjunctive.
#[derive(Debug, Deserialize, Serialize, IntoParams)]
pub struct ListUnitsQuery {
    /// Filter by mirror account
    pub account_id: Option<Uuid>,
    /// Filter by parsed year
    pub year: Option<i32>,
    /// Filter by parsed semester
    pub semester: Option<i32>,
}

/// Lists the owner's units
#[utoipa::path(
    get,
    path = "/units",
    security(("bearer_auth" = [])),
    params(OwnerHeader, ListUnitsQuery),
    responses(
        (status = 200, description = "Units for the owner"),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "units"
)]
pub async fn list_units(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Query(query): Query<ListUnitsQuery>,
) -> Result<Json<Vec<unit::Model>>, ApiError> {
    let filter = UnitFilter {
        account_id: query.account_id,
        year: query.year,
        semester: query.semester,
    };
    let units = state.store.list_units(owner.0, filter).await?;
    Ok(Json(units))
}

/// Fetches one unit
#[utoipa::path(
    get,
    path = "/units/{id}",
    security(("bearer_auth" = [])),
    params(OwnerHeader, ("id" = String, Path, description = "Unit id")),
    responses(
        (status = 200, description = "The unit"),
        (status = 404, description = "Unit not found", body = ApiError)
    ),
    tag = "units"
)]
pub async fn get_unit(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Path(id): Path<Uuid>,
) -> Result<Json<unit::Model>, ApiError> {
    Ok(Json(state.store.get_unit(owner.0, id).await?))
}

/// Creates a manual (non-synced) unit
#[utoipa::path(
    post,
    path = "/units",
    security(("bearer_auth" = [])),
    params(OwnerHeader),
    request_body = NewUnit,
    responses(
        (status = 201, description = "Unit created"),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "units"
)]
pub async fn create_unit(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Json(payload): Json<NewUnit>,
) -> Result<(StatusCode, Json<unit::Model>), ApiError> {
    if payload.title.trim().is_empty() {
        return Err(crate::error::validation_error(
            "Validation failed",
            serde_json::json!({ "title": "must not be empty" }),
        ));
    }

    let unit = state.store.create_unit(owner.0, payload).await?;
    Ok((StatusCode::CREATED, Json(unit)))
}

/// Applies a partial update to a unit
#[utoipa::path(
    patch,
    path = "/units/{id}",
    security(("bearer_auth" = [])),
    params(OwnerHeader, ("id" = String, Path, description = "Unit id")),
    responses(
        (status = 200, description = "Updated unit"),
        (status = 404, description = "Unit not found", body = ApiError)
    ),
    tag = "units"
)]
pub async fn update_unit(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Path(id): Path<Uuid>,
    Json(patch): Json<UnitPatch>,
) -> Result<Json<unit::Model>, ApiError> {
    Ok(Json(state.store.update_unit(owner.0, id, patch).await?))
}

/// Deletes a unit and everything attached to it
#[utoipa::path(
    delete,
    path = "/units/{id}",
    security(("bearer_auth" = [])),
    params(OwnerHeader, ("id" = String, Path, description = "Unit id")),
    responses(
        (status = 204, description = "Unit and dependents deleted"),
        (status = 404, description = "Unit not found", body = ApiError)
    ),
    tag = "units"
)]
pub async fn delete_unit(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_unit(owner.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
