//! # Storage Port
//!
//! Backend-agnostic persistence contract for every Unitrack entity, with
//! two interchangeable adapters: [`MemoryStore`] (ephemeral, for local
//! development and tests) and [`DatabaseStore`] (SeaORM). The adapter is
//! selected by configuration at process start; both satisfy the same
//! behavioral contract and the test suite runs against each.
//!
//! All operations are scoped to the authenticated owner, which is attached
//! server-side; payloads never carry an owner id. Filters on `list_*`
//! operations are conjunctive: every provided field must match.

pub mod database;
pub mod memory;

pub use database::DatabaseStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::crypto::EncryptedToken;
use crate::models::{account, assignment, connection, event, exam, grade, unit};

/// Storage failures, independent of the backing adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("a record with the same unique key already exists")]
    Conflict,
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Whether an upsert created a fresh row or updated an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Payload for creating a connection; system-assigned fields (id, owner,
/// timestamps) are filled in by the adapter.
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub provider: String,
    pub base_url: String,
    pub metadata: Option<JsonValue>,
}

/// Partial connection update. Outer `None` leaves a field untouched;
/// inner `None` clears a nullable column.
#[derive(Debug, Clone, Default)]
pub struct ConnectionPatch {
    pub metadata: Option<Option<JsonValue>>,
    pub last_synced_at: Option<Option<DateTime<Utc>>>,
}

/// Full field set written on every account upsert, keyed by
/// (owner, provider, base_url).
#[derive(Debug, Clone)]
pub struct AccountUpsert {
    pub provider: String,
    pub base_url: String,
    pub external_id: String,
    pub name: Option<String>,
    pub short_name: Option<String>,
    pub sortable_name: Option<String>,
    pub avatar_url: Option<String>,
    pub primary_email: Option<String>,
    pub locale: Option<String>,
    pub calendar_url: Option<String>,
}

/// Full field set written on every unit upsert, keyed by
/// (owner, external_id).
#[derive(Debug, Clone)]
pub struct UnitUpsert {
    pub account_id: Option<Uuid>,
    pub external_id: String,
    pub code: Option<String>,
    pub title: String,
    pub canvas_url: Option<String>,
    pub year: Option<i32>,
    pub semester: Option<i32>,
    pub role: Option<String>,
    pub syllabus: Option<String>,
}

/// Payload for a manually created unit.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewUnit {
    pub title: String,
    pub code: Option<String>,
    pub year: Option<i32>,
    pub semester: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnitPatch {
    pub title: Option<String>,
    pub code: Option<Option<String>>,
    pub year: Option<Option<i32>>,
    pub semester: Option<Option<i32>>,
    pub syllabus: Option<Option<String>>,
}

/// Conjunctive filters for unit listing.
#[derive(Debug, Clone, Default)]
pub struct UnitFilter {
    pub account_id: Option<Uuid>,
    pub year: Option<i32>,
    pub semester: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewAssignment {
    pub unit_id: Uuid,
    pub title: String,
    pub due_at: Option<DateTime<Utc>>,
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssignmentPatch {
    pub title: Option<String>,
    pub due_at: Option<Option<DateTime<Utc>>>,
    pub weight: Option<Option<f64>>,
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentFilter {
    pub unit_id: Option<Uuid>,
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewExam {
    pub unit_id: Uuid,
    pub title: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExamPatch {
    pub title: Option<String>,
    pub starts_at: Option<Option<DateTime<Utc>>>,
    pub location: Option<Option<String>>,
    pub weight: Option<Option<f64>>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewEvent {
    pub unit_id: Uuid,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPatch {
    pub title: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<Option<DateTime<Utc>>>,
    pub location: Option<Option<String>>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewGrade {
    pub unit_id: Uuid,
    pub label: String,
    pub score: f64,
    pub max_score: f64,
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GradePatch {
    pub label: Option<String>,
    pub score: Option<f64>,
    pub max_score: Option<f64>,
    pub weight: Option<Option<f64>>,
}

/// Filter by owning unit for the unit-scoped collections.
#[derive(Debug, Clone, Default)]
pub struct UnitScopedFilter {
    pub unit_id: Option<Uuid>,
}

/// Every entity collection for one owner, as exported to and imported from
/// JSON. Secrets are deliberately absent: credential material does not
/// leave the codec boundary, so a reimported connection requires a
/// reconnect.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportBundle {
    #[serde(default)]
    pub connections: Vec<connection::Model>,
    #[serde(default)]
    pub accounts: Vec<account::Model>,
    #[serde(default)]
    pub units: Vec<unit::Model>,
    #[serde(default)]
    pub assignments: Vec<assignment::Model>,
    #[serde(default)]
    pub exams: Vec<exam::Model>,
    #[serde(default)]
    pub events: Vec<event::Model>,
    #[serde(default)]
    pub grades: Vec<grade::Model>,
}

impl ExportBundle {
    pub fn record_count(&self) -> usize {
        self.connections.len()
            + self.accounts.len()
            + self.units.len()
            + self.assignments.len()
            + self.exams.len()
            + self.events.len()
            + self.grades.len()
    }
}

/// The persistence contract both adapters implement.
#[async_trait]
pub trait Store: Send + Sync {
    // Connections

    async fn list_connections(&self, owner: Uuid) -> StoreResult<Vec<connection::Model>>;
    async fn get_connection(&self, owner: Uuid, id: Uuid) -> StoreResult<connection::Model>;
    async fn find_connection(
        &self,
        owner: Uuid,
        provider: &str,
        base_url: &str,
    ) -> StoreResult<Option<connection::Model>>;
    async fn create_connection(
        &self,
        owner: Uuid,
        payload: NewConnection,
    ) -> StoreResult<connection::Model>;
    async fn update_connection(
        &self,
        owner: Uuid,
        id: Uuid,
        patch: ConnectionPatch,
    ) -> StoreResult<connection::Model>;
    /// Deletes the connection and its secret.
    async fn delete_connection(&self, owner: Uuid, id: Uuid) -> StoreResult<()>;

    // Secrets (reachable only through an owner's connection)

    /// Create or replace the secret for a connection.
    async fn put_secret(
        &self,
        owner: Uuid,
        connection_id: Uuid,
        token: EncryptedToken,
    ) -> StoreResult<()>;
    async fn get_secret(&self, owner: Uuid, connection_id: Uuid)
    -> StoreResult<EncryptedToken>;
    async fn delete_secret(&self, owner: Uuid, connection_id: Uuid) -> StoreResult<()>;

    // Accounts

    async fn list_accounts(&self, owner: Uuid) -> StoreResult<Vec<account::Model>>;
    async fn upsert_account(
        &self,
        owner: Uuid,
        payload: AccountUpsert,
    ) -> StoreResult<(account::Model, UpsertOutcome)>;
    async fn delete_account(&self, owner: Uuid, id: Uuid) -> StoreResult<()>;

    // Units

    async fn list_units(&self, owner: Uuid, filter: UnitFilter) -> StoreResult<Vec<unit::Model>>;
    async fn get_unit(&self, owner: Uuid, id: Uuid) -> StoreResult<unit::Model>;
    async fn create_unit(&self, owner: Uuid, payload: NewUnit) -> StoreResult<unit::Model>;
    async fn update_unit(
        &self,
        owner: Uuid,
        id: Uuid,
        patch: UnitPatch,
    ) -> StoreResult<unit::Model>;
    async fn upsert_unit(
        &self,
        owner: Uuid,
        payload: UnitUpsert,
    ) -> StoreResult<(unit::Model, UpsertOutcome)>;
    /// Deletes a unit and cascades to its assignments, exams, events and grades.
    async fn delete_unit(&self, owner: Uuid, id: Uuid) -> StoreResult<()>;

    // Assignments

    async fn list_assignments(
        &self,
        owner: Uuid,
        filter: AssignmentFilter,
    ) -> StoreResult<Vec<assignment::Model>>;
    async fn create_assignment(
        &self,
        owner: Uuid,
        payload: NewAssignment,
    ) -> StoreResult<assignment::Model>;
    async fn update_assignment(
        &self,
        owner: Uuid,
        id: Uuid,
        patch: AssignmentPatch,
    ) -> StoreResult<assignment::Model>;
    async fn delete_assignment(&self, owner: Uuid, id: Uuid) -> StoreResult<()>;

    // Exams

    async fn list_exams(
        &self,
        owner: Uuid,
        filter: UnitScopedFilter,
    ) -> StoreResult<Vec<exam::Model>>;
    async fn create_exam(&self, owner: Uuid, payload: NewExam) -> StoreResult<exam::Model>;
    async fn update_exam(
        &self,
        owner: Uuid,
        id: Uuid,
        patch: ExamPatch,
    ) -> StoreResult<exam::Model>;
    async fn delete_exam(&self, owner: Uuid, id: Uuid) -> StoreResult<()>;

    // Events

    async fn list_events(
        &self,
        owner: Uuid,
        filter: UnitScopedFilter,
    ) -> StoreResult<Vec<event::Model>>;
    async fn create_event(&self, owner: Uuid, payload: NewEvent) -> StoreResult<event::Model>;
    async fn update_event(
        &self,
        owner: Uuid,
        id: Uuid,
        patch: EventPatch,
    ) -> StoreResult<event::Model>;
    async fn delete_event(&self, owner: Uuid, id: Uuid) -> StoreResult<()>;

    // Grades

    async fn list_grades(
        &self,
        owner: Uuid,
        filter: UnitScopedFilter,
    ) -> StoreResult<Vec<grade::Model>>;
    async fn create_grade(&self, owner: Uuid, payload: NewGrade) -> StoreResult<grade::Model>;
    async fn update_grade(
        &self,
        owner: Uuid,
        id: Uuid,
        patch: GradePatch,
    ) -> StoreResult<grade::Model>;
    async fn delete_grade(&self, owner: Uuid, id: Uuid) -> StoreResult<()>;

    // Bulk data

    async fn export(&self, owner: Uuid) -> StoreResult<ExportBundle>;
    /// Upserts every record in the bundle by id, forcing `owner_id` to the
    /// authenticated owner. `export` followed by `import` round-trips
    /// every collection losslessly.
    async fn import(&self, owner: Uuid, bundle: ExportBundle) -> StoreResult<usize>;
}
