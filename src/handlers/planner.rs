//! # Planner Handlers
//!
//! CRUD for the tracker entities that hang off a unit: assignments,
//! exams, events and grades. Creation validates that the target unit
//! belongs to the owner; the storage port enforces the same, so a forged
//! unit id can never attach records to someone else's unit.

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
use crate::models::{assignment, event, exam, grade};
use crate::server::AppState;
use crate::storage::{
    AssignmentFilter, AssignmentPatch, EventPatch, ExamPatch, GradePatch, NewAssignment, NewEvent,
    NewExam, NewGrade, UnitScopedFilter,
};

/// Filter query shared by the unit-scoped collections.
#[derive(Debug, Deserialize, Serialize, IntoParams)]
pub struct UnitScopedQuery {
    /// Restrict to one unit
    pub unit_id: Option<Uuid>,
}

/// Query parameters for assignment listing.
#[derive(Debug, Deserialize, Serialize, IntoParams)]
pub struct ListAssignmentsQuery {
    /// Restrict to one unit
    pub unit_id: Option<Uuid>,
    /// Filter by completion state
    pub completed: Option<bool>,
}

// Assignments

#[utoipa::path(
    get,
    path = "/assignments",
    security(("bearer_auth" = [])),
    params(OwnerHeader, ListAssignmentsQuery),
    responses((status = 200, description = "Assignments for the owner")),
    tag = "planner"
)]
pub async fn list_assignments(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Query(query): Query<ListAssignmentsQuery>,
) -> Result<Json<Vec<assignment::Model>>, ApiError> {
    let filter = AssignmentFilter {
        unit_id: query.unit_id,
        completed: query.completed,
    };
    Ok(Json(state.store.list_assignments(owner.0, filter).await?))
}

#[utoipa::path(
    post,
    path = "/assignments",
    security(("bearer_auth" = [])),
    params(OwnerHeader),
    request_body = NewAssignment,
    responses(
        (status = 201, description = "Assignment created"),
        (status = 404, description = "Unit not found", body = ApiError)
    ),
    tag = "planner"
)]
pub async fn create_assignment(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Json(payload): Json<NewAssignment>,
) -> Result<(StatusCode, Json<assignment::Model>), ApiError> {
    let created = state.store.create_assignment(owner.0, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    patch,
    path = "/assignments/{id}",
    security(("bearer_auth" = [])),
    params(OwnerHeader, ("id" = String, Path, description = "Assignment id")),
    responses(
        (status = 200, description = "Updated assignment"),
        (status = 404, description = "Assignment not found", body = ApiError)
    ),
    tag = "planner"
)]
pub async fn update_assignment(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Path(id): Path<Uuid>,
    Json(patch): Json<AssignmentPatch>,
) -> Result<Json<assignment::Model>, ApiError> {
    Ok(Json(
        state.store.update_assignment(owner.0, id, patch).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/assignments/{id}",
    security(("bearer_auth" = [])),
    params(OwnerHeader, ("id" = String, Path, description = "Assignment id")),
    responses(
        (status = 204, description = "Assignment deleted"),
        (status = 404, description = "Assignment not found", body = ApiError)
    ),
    tag = "planner"
)]
pub async fn delete_assignment(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_assignment(owner.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Exams

#[utoipa::path(
    get,
    path = "/exams",
    security(("bearer_auth" = [])),
    params(OwnerHeader, UnitScopedQuery),
    responses((status = 200, description = "Exams for the owner")),
    tag = "planner"
)]
pub async fn list_exams(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Query(query): Query<UnitScopedQuery>,
) -> Result<Json<Vec<exam::Model>>, ApiError> {
    let filter = UnitScopedFilter {
        unit_id: query.unit_id,
    };
    Ok(Json(state.store.list_exams(owner.0, filter).await?))
}

#[utoipa::path(
    post,
    path = "/exams",
    security(("bearer_auth" = [])),
    params(OwnerHeader),
    request_body = NewExam,
    responses(
        (status = 201, description = "Exam created"),
        (status = 404, description = "Unit not found", body = ApiError)
    ),
    tag = "planner"
)]
pub async fn create_exam(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Json(payload): Json<NewExam>,
) -> Result<(StatusCode, Json<exam::Model>), ApiError> {
    let created = state.store.create_exam(owner.0, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    patch,
    path = "/exams/{id}",
    security(("bearer_auth" = [])),
    params(OwnerHeader, ("id" = String, Path, description = "Exam id")),
    responses(
        (status = 200, description = "Updated exam"),
        (status = 404, description = "Exam not found", body = ApiError)
    ),
    tag = "planner"
)]
pub async fn update_exam(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Path(id): Path<Uuid>,
    Json(patch): Json<ExamPatch>,
) -> Result<Json<exam::Model>, ApiError> {
    Ok(Json(state.store.update_exam(owner.0, id, patch).await?))
}

#[utoipa::path(
    delete,
    path = "/exams/{id}",
    security(("bearer_auth" = [])),
    params(OwnerHeader, ("id" = String, Path, description = "Exam id")),
    responses(
        (status = 204, description = "Exam deleted"),
        (status = 404, description = "Exam not found", body = ApiError)
    ),
    tag = "planner"
)]
pub async fn delete_exam(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_exam(owner.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Events

#[utoipa::path(
    get,
    path = "/events",
    security(("bearer_auth" = [])),
    params(OwnerHeader, UnitScopedQuery),
    responses((status = 200, description = "Events for the owner")),
    tag = "planner"
)]
pub async fn list_events(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Query(query): Query<UnitScopedQuery>,
) -> Result<Json<Vec<event::Model>>, ApiError> {
    let filter = UnitScopedFilter {
        unit_id: query.unit_id,
    };
    Ok(Json(state.store.list_events(owner.0, filter).await?))
}

#[utoipa::path(
    post,
    path = "/events",
    security(("bearer_auth" = [])),
    params(OwnerHeader),
    request_body = NewEvent,
    responses(
        (status = 201, description = "Event created"),
        (status = 404, description = "Unit not found", body = ApiError)
    ),
    tag = "planner"
)]
pub async fn create_event(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Json(payload): Json<NewEvent>,
) -> Result<(StatusCode, Json<event::Model>), ApiError> {
    let created = state.store.create_event(owner.0, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    patch,
    path = "/events/{id}",
    security(("bearer_auth" = [])),
    params(OwnerHeader, ("id" = String, Path, description = "Event id")),
    responses(
        (status = 200, description = "Updated event"),
        (status = 404, description = "Event not found", body = ApiError)
    ),
    tag = "planner"
)]
pub async fn update_event(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Path(id): Path<Uuid>,
    Json(patch): Json<EventPatch>,
) -> Result<Json<event::Model>, ApiError> {
    Ok(Json(state.store.update_event(owner.0, id, patch).await?))
}

#[utoipa::path(
    delete,
    path = "/events/{id}",
    security(("bearer_auth" = [])),
    params(OwnerHeader, ("id" = String, Path, description = "Event id")),
    responses(
        (status = 204, description = "Event deleted"),
        (status = 404, description = "Event not found", body = ApiError)
    ),
    tag = "planner"
)]
pub async fn delete_event(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_event(owner.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Grades

#[utoipa::path(
    get,
    path = "/grades",
    security(("bearer_auth" = [])),
    params(OwnerHeader, UnitScopedQuery),
    responses((status = 200, description = "Grades for the owner")),
    tag = "planner"
)]
pub async fn list_grades(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Query(query): Query<UnitScopedQuery>,
) -> Result<Json<Vec<grade::Model>>, ApiError> {
    let filter = UnitScopedFilter {
        unit_id: query.unit_id,
    };
    Ok(Json(state.store.list_grades(owner.0, filter).await?))
}

#[utoipa::path(
    post,
    path = "/grades",
    security(("bearer_auth" = [])),
    params(OwnerHeader),
    request_body = NewGrade,
    responses(
        (status = 201, description = "Grade created"),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 404, description = "Unit not found", body = ApiError)
    ),
    tag = "planner"
)]
pub async fn create_grade(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Json(payload): Json<NewGrade>,
) -> Result<(StatusCode, Json<grade::Model>), ApiError> {
    if payload.max_score <= 0.0 || payload.score < 0.0 {
        return Err(crate::error::validation_error(
            "Validation failed",
            serde_json::json!({ "score": "score must be >= 0 and max_score > 0" }),
        ));
    }

    let created = state.store.create_grade(owner.0, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    patch,
    path = "/grades/{id}",
    security(("bearer_auth" = [])),
    params(OwnerHeader, ("id" = String, Path, description = "Grade id")),
    responses(
        (status = 200, description = "Updated grade"),
        (status = 404, description = "Grade not found", body = ApiError)
    ),
    tag = "planner"
)]
pub async fn update_grade(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Path(id): Path<Uuid>,
    Json(patch): Json<GradePatch>,
) -> Result<Json<grade::Model>, ApiError> {
    Ok(Json(state.store.update_grade(owner.0, id, patch).await?))
}

#[utoipa::path(
    delete,
    path = "/grades/{id}",
    security(("bearer_auth" = [])),
    params(OwnerHeader, ("id" = String, Path, description = "Grade id")),
    responses(
        (status = 204, description = "Grade deleted"),
        (status = 404, description = "Grade not found", body = ApiError)
    ),
    tag = "planner"
)]
pub async fn delete_grade(
    State(state): State<AppState>,
    _auth: ApiAuth,
    OwnerExtension(owner): OwnerExtension,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_grade(owner.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
