//! Relational storage adapter backed by SeaORM.
//!
//! Every query filters on the owner id taken from the authenticated
//! principal; a client-supplied owner never reaches this layer. Upsert
//! keys are enforced by the unique indexes the migrations create, and
//! unit deletion removes dependent rows explicitly rather than relying on
//! the backend honoring FK cascades.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};
use uuid::Uuid;

use crate::crypto::EncryptedToken;
use crate::error::is_unique_violation;
use crate::models::{account, assignment, connection, event, exam, grade, secret, unit};

use super::{
    AccountUpsert, AssignmentFilter, AssignmentPatch, ConnectionPatch, EventPatch, ExamPatch,
    ExportBundle, GradePatch, NewAssignment, NewConnection, NewEvent, NewExam, NewGrade, NewUnit,
    Store, StoreError, StoreResult, UnitFilter, UnitPatch, UnitScopedFilter, UnitUpsert,
    UpsertOutcome,
};

/// SeaORM [`Store`] implementation.
#[derive(Debug, Clone)]
pub struct DatabaseStore {
    db: DatabaseConnection,
}

impl DatabaseStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn owned_connection(
        &self,
        owner: Uuid,
        id: Uuid,
    ) -> StoreResult<connection::Model> {
        connection::Entity::find_by_id(id)
            .filter(connection::Column::OwnerId.eq(owner))
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .ok_or(StoreError::NotFound)
    }

    async fn owned_unit(&self, owner: Uuid, id: Uuid) -> StoreResult<unit::Model> {
        unit::Entity::find_by_id(id)
            .filter(unit::Column::OwnerId.eq(owner))
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .ok_or(StoreError::NotFound)
    }
}

fn map_db_err(error: sea_orm::DbErr) -> StoreError {
    if is_unique_violation(&error) {
        return StoreError::Conflict;
    }
    match error {
        sea_orm::DbErr::RecordNotFound(_) => StoreError::NotFound,
        other => StoreError::Backend(other.to_string()),
    }
}

fn now() -> DateTimeWithTimeZone {
    Utc::now().into()
}

#[async_trait]
impl Store for DatabaseStore {
    async fn list_connections(&self, owner: Uuid) -> StoreResult<Vec<connection::Model>> {
        connection::Entity::find()
            .filter(connection::Column::OwnerId.eq(owner))
            .order_by_asc(connection::Column::CreatedAt)
            .order_by_asc(connection::Column::Id)
            .all(&self.db)
            .await
            .map_err(map_db_err)
    }

    async fn get_connection(&self, owner: Uuid, id: Uuid) -> StoreResult<connection::Model> {
        self.owned_connection(owner, id).await
    }

    async fn find_connection(
        &self,
        owner: Uuid,
        provider: &str,
        base_url: &str,
    ) -> StoreResult<Option<connection::Model>> {
        connection::Entity::find()
            .filter(connection::Column::OwnerId.eq(owner))
            .filter(connection::Column::Provider.eq(provider))
            .filter(connection::Column::BaseUrl.eq(base_url))
            .one(&self.db)
            .await
            .map_err(map_db_err)
    }

    async fn create_connection(
        &self,
        owner: Uuid,
        payload: NewConnection,
    ) -> StoreResult<connection::Model> {
        let timestamp = now();
        let id = Uuid::new_v4();

        let active = connection::ActiveModel {
            id: Set(id),
            owner_id: Set(owner),
            provider: Set(payload.provider),
            base_url: Set(payload.base_url),
            metadata: Set(payload.metadata),
            last_synced_at: Set(None),
            created_at: Set(timestamp),
            updated_at: Set(timestamp),
        };
        active.insert(&self.db).await.map_err(map_db_err)?;

        // Re-fetch so backend-assigned defaults are reflected (SQLite).
        connection::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| StoreError::Backend("connection not persisted".to_string()))
    }

    async fn update_connection(
        &self,
        owner: Uuid,
        id: Uuid,
        patch: ConnectionPatch,
    ) -> StoreResult<connection::Model> {
        let existing = self.owned_connection(owner, id).await?;
        let mut model: connection::ActiveModel = existing.into();

        if let Some(metadata) = patch.metadata {
            model.metadata = Set(metadata);
        }
        if let Some(last_synced_at) = patch.last_synced_at {
            model.last_synced_at = Set(last_synced_at.map(Into::into));
        }
        model.updated_at = Set(now());

        model.update(&self.db).await.map_err(map_db_err)
    }

    async fn delete_connection(&self, owner: Uuid, id: Uuid) -> StoreResult<()> {
        self.owned_connection(owner, id).await?;

        secret::Entity::delete_many()
            .filter(secret::Column::ConnectionId.eq(id))
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;

        let result = connection::Entity::delete_by_id(id)
            .filter(connection::Column::OwnerId.eq(owner))
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn put_secret(
        &self,
        owner: Uuid,
        connection_id: Uuid,
        token: EncryptedToken,
    ) -> StoreResult<()> {
        self.owned_connection(owner, connection_id).await?;

        secret::Entity::delete_many()
            .filter(secret::Column::ConnectionId.eq(connection_id))
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;

        let active = secret::ActiveModel {
            id: Set(Uuid::new_v4()),
            connection_id: Set(connection_id),
            ciphertext: Set(token.ciphertext),
            iv: Set(token.iv),
            created_at: Set(now()),
        };
        active.insert(&self.db).await.map_err(map_db_err)?;
        Ok(())
    }

    async fn get_secret(
        &self,
        owner: Uuid,
        connection_id: Uuid,
    ) -> StoreResult<EncryptedToken> {
        self.owned_connection(owner, connection_id).await?;

        let row = secret::Entity::find()
            .filter(secret::Column::ConnectionId.eq(connection_id))
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .ok_or(StoreError::NotFound)?;

        Ok(EncryptedToken {
            ciphertext: row.ciphertext,
            iv: row.iv,
        })
    }

    async fn delete_secret(&self, owner: Uuid, connection_id: Uuid) -> StoreResult<()> {
        self.owned_connection(owner, connection_id).await?;

        let result = secret::Entity::delete_many()
            .filter(secret::Column::ConnectionId.eq(connection_id))
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_accounts(&self, owner: Uuid) -> StoreResult<Vec<account::Model>> {
        account::Entity::find()
            .filter(account::Column::OwnerId.eq(owner))
            .order_by_asc(account::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(map_db_err)
    }

    async fn upsert_account(
        &self,
        owner: Uuid,
        payload: AccountUpsert,
    ) -> StoreResult<(account::Model, UpsertOutcome)> {
        let timestamp = now();

        let existing = account::Entity::find()
            .filter(account::Column::OwnerId.eq(owner))
            .filter(account::Column::Provider.eq(payload.provider.clone()))
            .filter(account::Column::BaseUrl.eq(payload.base_url.clone()))
            .one(&self.db)
            .await
            .map_err(map_db_err)?;

        if let Some(found) = existing {
            let mut model: account::ActiveModel = found.into();
            model.external_id = Set(payload.external_id);
            model.name = Set(payload.name);
            model.short_name = Set(payload.short_name);
            model.sortable_name = Set(payload.sortable_name);
            model.avatar_url = Set(payload.avatar_url);
            model.primary_email = Set(payload.primary_email);
            model.locale = Set(payload.locale);
            model.calendar_url = Set(payload.calendar_url);
            model.profile_synced_at = Set(Some(timestamp));
            model.updated_at = Set(timestamp);

            let updated = model.update(&self.db).await.map_err(map_db_err)?;
            return Ok((updated, UpsertOutcome::Updated));
        }

        let id = Uuid::new_v4();
        let active = account::ActiveModel {
            id: Set(id),
            owner_id: Set(owner),
            provider: Set(payload.provider),
            base_url: Set(payload.base_url),
            external_id: Set(payload.external_id),
            name: Set(payload.name),
            short_name: Set(payload.short_name),
            sortable_name: Set(payload.sortable_name),
            avatar_url: Set(payload.avatar_url),
            primary_email: Set(payload.primary_email),
            locale: Set(payload.locale),
            calendar_url: Set(payload.calendar_url),
            profile_synced_at: Set(Some(timestamp)),
            created_at: Set(timestamp),
            updated_at: Set(timestamp),
        };
        active.insert(&self.db).await.map_err(map_db_err)?;

        let created = account::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| StoreError::Backend("account not persisted".to_string()))?;
        Ok((created, UpsertOutcome::Created))
    }

    async fn delete_account(&self, owner: Uuid, id: Uuid) -> StoreResult<()> {
        let result = account::Entity::delete_by_id(id)
            .filter(account::Column::OwnerId.eq(owner))
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }

        // Mirror ON DELETE SET NULL for backends without enforced FKs.
        let orphaned = unit::Entity::find()
            .filter(unit::Column::OwnerId.eq(owner))
            .filter(unit::Column::AccountId.eq(id))
            .all(&self.db)
            .await
            .map_err(map_db_err)?;
        for row in orphaned {
            let mut model: unit::ActiveModel = row.into();
            model.account_id = Set(None);
            model.update(&self.db).await.map_err(map_db_err)?;
        }
        Ok(())
    }

    async fn list_units(&self, owner: Uuid, filter: UnitFilter) -> StoreResult<Vec<unit::Model>> {
        let mut query = unit::Entity::find()
            .filter(unit::Column::OwnerId.eq(owner))
            .order_by_asc(unit::Column::CreatedAt)
            .order_by_asc(unit::Column::Id);

        if let Some(account_id) = filter.account_id {
            query = query.filter(unit::Column::AccountId.eq(account_id));
        }
        if let Some(year) = filter.year {
            query = query.filter(unit::Column::Year.eq(year));
        }
        if let Some(semester) = filter.semester {
            query = query.filter(unit::Column::Semester.eq(semester));
        }

        query.all(&self.db).await.map_err(map_db_err)
    }

    async fn get_unit(&self, owner: Uuid, id: Uuid) -> StoreResult<unit::Model> {
        self.owned_unit(owner, id).await
    }

    async fn create_unit(&self, owner: Uuid, payload: NewUnit) -> StoreResult<unit::Model> {
        let timestamp = now();
        let id = Uuid::new_v4();

        let active = unit::ActiveModel {
            id: Set(id),
            owner_id: Set(owner),
            account_id: Set(None),
            external_id: Set(None),
            code: Set(payload.code),
            title: Set(payload.title),
            canvas_url: Set(None),
            year: Set(payload.year),
            semester: Set(payload.semester),
            role: Set(None),
            syllabus: Set(None),
            created_at: Set(timestamp),
            updated_at: Set(timestamp),
        };
        active.insert(&self.db).await.map_err(map_db_err)?;

        unit::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| StoreError::Backend("unit not persisted".to_string()))
    }

    async fn update_unit(
        &self,
        owner: Uuid,
        id: Uuid,
        patch: UnitPatch,
    ) -> StoreResult<unit::Model> {
        let existing = self.owned_unit(owner, id).await?;
        let mut model: unit::ActiveModel = existing.into();

        if let Some(title) = patch.title {
            model.title = Set(title);
        }
        if let Some(code) = patch.code {
            model.code = Set(code);
        }
        if let Some(year) = patch.year {
            model.year = Set(year);
        }
        if let Some(semester) = patch.semester {
            model.semester = Set(semester);
        }
        if let Some(syllabus) = patch.syllabus {
            model.syllabus = Set(syllabus);
        }
        model.updated_at = Set(now());

        model.update(&self.db).await.map_err(map_db_err)
    }

    async fn upsert_unit(
        &self,
        owner: Uuid,
        payload: UnitUpsert,
    ) -> StoreResult<(unit::Model, UpsertOutcome)> {
        let timestamp = now();

        let existing = unit::Entity::find()
            .filter(unit::Column::OwnerId.eq(owner))
            .filter(unit::Column::ExternalId.eq(payload.external_id.clone()))
            .one(&self.db)
            .await
            .map_err(map_db_err)?;

        if let Some(found) = existing {
            let mut model: unit::ActiveModel = found.into();
            model.account_id = Set(payload.account_id);
            model.code = Set(payload.code);
            model.title = Set(payload.title);
            model.canvas_url = Set(payload.canvas_url);
            model.year = Set(payload.year);
            model.semester = Set(payload.semester);
            model.role = Set(payload.role);
            model.syllabus = Set(payload.syllabus);
            model.updated_at = Set(timestamp);

            let updated = model.update(&self.db).await.map_err(map_db_err)?;
            return Ok((updated, UpsertOutcome::Updated));
        }

        let id = Uuid::new_v4();
        let active = unit::ActiveModel {
            id: Set(id),
            owner_id: Set(owner),
            account_id: Set(payload.account_id),
            external_id: Set(Some(payload.external_id)),
            code: Set(payload.code),
            title: Set(payload.title),
            canvas_url: Set(payload.canvas_url),
            year: Set(payload.year),
            semester: Set(payload.semester),
            role: Set(payload.role),
            syllabus: Set(payload.syllabus),
            created_at: Set(timestamp),
            updated_at: Set(timestamp),
        };
        active.insert(&self.db).await.map_err(map_db_err)?;

        let created = unit::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| StoreError::Backend("unit not persisted".to_string()))?;
        Ok((created, UpsertOutcome::Created))
    }

    async fn delete_unit(&self, owner: Uuid, id: Uuid) -> StoreResult<()> {
        self.owned_unit(owner, id).await?;

        assignment::Entity::delete_many()
            .filter(assignment::Column::UnitId.eq(id))
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;
        exam::Entity::delete_many()
            .filter(exam::Column::UnitId.eq(id))
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;
        event::Entity::delete_many()
            .filter(event::Column::UnitId.eq(id))
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;
        grade::Entity::delete_many()
            .filter(grade::Column::UnitId.eq(id))
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;

        let result = unit::Entity::delete_by_id(id)
            .filter(unit::Column::OwnerId.eq(owner))
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_assignments(
        &self,
        owner: Uuid,
        filter: AssignmentFilter,
    ) -> StoreResult<Vec<assignment::Model>> {
        let mut query = assignment::Entity::find()
            .filter(assignment::Column::OwnerId.eq(owner))
            .order_by_asc(assignment::Column::CreatedAt);

        if let Some(unit_id) = filter.unit_id {
            query = query.filter(assignment::Column::UnitId.eq(unit_id));
        }
        if let Some(completed) = filter.completed {
            query = query.filter(assignment::Column::Completed.eq(completed));
        }

        query.all(&self.db).await.map_err(map_db_err)
    }

    async fn create_assignment(
        &self,
        owner: Uuid,
        payload: NewAssignment,
    ) -> StoreResult<assignment::Model> {
        self.owned_unit(owner, payload.unit_id).await?;
        let timestamp = now();
        let id = Uuid::new_v4();

        let active = assignment::ActiveModel {
            id: Set(id),
            owner_id: Set(owner),
            unit_id: Set(payload.unit_id),
            title: Set(payload.title),
            due_at: Set(payload.due_at.map(Into::into)),
            weight: Set(payload.weight),
            completed: Set(false),
            created_at: Set(timestamp),
            updated_at: Set(timestamp),
        };
        active.insert(&self.db).await.map_err(map_db_err)?;

        assignment::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| StoreError::Backend("assignment not persisted".to_string()))
    }

    async fn update_assignment(
        &self,
        owner: Uuid,
        id: Uuid,
        patch: AssignmentPatch,
    ) -> StoreResult<assignment::Model> {
        let existing = assignment::Entity::find_by_id(id)
            .filter(assignment::Column::OwnerId.eq(owner))
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .ok_or(StoreError::NotFound)?;

        let mut model: assignment::ActiveModel = existing.into();
        if let Some(title) = patch.title {
            model.title = Set(title);
        }
        if let Some(due_at) = patch.due_at {
            model.due_at = Set(due_at.map(Into::into));
        }
        if let Some(weight) = patch.weight {
            model.weight = Set(weight);
        }
        if let Some(completed) = patch.completed {
            model.completed = Set(completed);
        }
        model.updated_at = Set(now());

        model.update(&self.db).await.map_err(map_db_err)
    }

    async fn delete_assignment(&self, owner: Uuid, id: Uuid) -> StoreResult<()> {
        let result = assignment::Entity::delete_by_id(id)
            .filter(assignment::Column::OwnerId.eq(owner))
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_exams(
        &self,
        owner: Uuid,
        filter: UnitScopedFilter,
    ) -> StoreResult<Vec<exam::Model>> {
        let mut query = exam::Entity::find()
            .filter(exam::Column::OwnerId.eq(owner))
            .order_by_asc(exam::Column::CreatedAt);

        if let Some(unit_id) = filter.unit_id {
            query = query.filter(exam::Column::UnitId.eq(unit_id));
        }

        query.all(&self.db).await.map_err(map_db_err)
    }

    async fn create_exam(&self, owner: Uuid, payload: NewExam) -> StoreResult<exam::Model> {
        self.owned_unit(owner, payload.unit_id).await?;
        let timestamp = now();
        let id = Uuid::new_v4();

        let active = exam::ActiveModel {
            id: Set(id),
            owner_id: Set(owner),
            unit_id: Set(payload.unit_id),
            title: Set(payload.title),
            starts_at: Set(payload.starts_at.map(Into::into)),
            location: Set(payload.location),
            weight: Set(payload.weight),
            created_at: Set(timestamp),
            updated_at: Set(timestamp),
        };
        active.insert(&self.db).await.map_err(map_db_err)?;

        exam::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| StoreError::Backend("exam not persisted".to_string()))
    }

    async fn update_exam(
        &self,
        owner: Uuid,
        id: Uuid,
        patch: ExamPatch,
    ) -> StoreResult<exam::Model> {
        let existing = exam::Entity::find_by_id(id)
            .filter(exam::Column::OwnerId.eq(owner))
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .ok_or(StoreError::NotFound)?;

        let mut model: exam::ActiveModel = existing.into();
        if let Some(title) = patch.title {
            model.title = Set(title);
        }
        if let Some(starts_at) = patch.starts_at {
            model.starts_at = Set(starts_at.map(Into::into));
        }
        if let Some(location) = patch.location {
            model.location = Set(location);
        }
        if let Some(weight) = patch.weight {
            model.weight = Set(weight);
        }
        model.updated_at = Set(now());

        model.update(&self.db).await.map_err(map_db_err)
    }

    async fn delete_exam(&self, owner: Uuid, id: Uuid) -> StoreResult<()> {
        let result = exam::Entity::delete_by_id(id)
            .filter(exam::Column::OwnerId.eq(owner))
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_events(
        &self,
        owner: Uuid,
        filter: UnitScopedFilter,
    ) -> StoreResult<Vec<event::Model>> {
        let mut query = event::Entity::find()
            .filter(event::Column::OwnerId.eq(owner))
            .order_by_asc(event::Column::StartsAt);

        if let Some(unit_id) = filter.unit_id {
            query = query.filter(event::Column::UnitId.eq(unit_id));
        }

        query.all(&self.db).await.map_err(map_db_err)
    }

    async fn create_event(&self, owner: Uuid, payload: NewEvent) -> StoreResult<event::Model> {
        self.owned_unit(owner, payload.unit_id).await?;
        let timestamp = now();
        let id = Uuid::new_v4();

        let active = event::ActiveModel {
            id: Set(id),
            owner_id: Set(owner),
            unit_id: Set(payload.unit_id),
            title: Set(payload.title),
            starts_at: Set(payload.starts_at.into()),
            ends_at: Set(payload.ends_at.map(Into::into)),
            location: Set(payload.location),
            created_at: Set(timestamp),
            updated_at: Set(timestamp),
        };
        active.insert(&self.db).await.map_err(map_db_err)?;

        event::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| StoreError::Backend("event not persisted".to_string()))
    }

    async fn update_event(
        &self,
        owner: Uuid,
        id: Uuid,
        patch: EventPatch,
    ) -> StoreResult<event::Model> {
        let existing = event::Entity::find_by_id(id)
            .filter(event::Column::OwnerId.eq(owner))
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .ok_or(StoreError::NotFound)?;

        let mut model: event::ActiveModel = existing.into();
        if let Some(title) = patch.title {
            model.title = Set(title);
        }
        if let Some(starts_at) = patch.starts_at {
            model.starts_at = Set(starts_at.into());
        }
        if let Some(ends_at) = patch.ends_at {
            model.ends_at = Set(ends_at.map(Into::into));
        }
        if let Some(location) = patch.location {
            model.location = Set(location);
        }
        model.updated_at = Set(now());

        model.update(&self.db).await.map_err(map_db_err)
    }

    async fn delete_event(&self, owner: Uuid, id: Uuid) -> StoreResult<()> {
        let result = event::Entity::delete_by_id(id)
            .filter(event::Column::OwnerId.eq(owner))
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_grades(
        &self,
        owner: Uuid,
        filter: UnitScopedFilter,
    ) -> StoreResult<Vec<grade::Model>> {
        let mut query = grade::Entity::find()
            .filter(grade::Column::OwnerId.eq(owner))
            .order_by_asc(grade::Column::CreatedAt);

        if let Some(unit_id) = filter.unit_id {
            query = query.filter(grade::Column::UnitId.eq(unit_id));
        }

        query.all(&self.db).await.map_err(map_db_err)
    }

    async fn create_grade(&self, owner: Uuid, payload: NewGrade) -> StoreResult<grade::Model> {
        self.owned_unit(owner, payload.unit_id).await?;
        let timestamp = now();
        let id = Uuid::new_v4();

        let active = grade::ActiveModel {
            id: Set(id),
            owner_id: Set(owner),
            unit_id: Set(payload.unit_id),
            label: Set(payload.label),
            score: Set(payload.score),
            max_score: Set(payload.max_score),
            weight: Set(payload.weight),
            created_at: Set(timestamp),
            updated_at: Set(timestamp),
        };
        active.insert(&self.db).await.map_err(map_db_err)?;

        grade::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| StoreError::Backend("grade not persisted".to_string()))
    }

    async fn update_grade(
        &self,
        owner: Uuid,
        id: Uuid,
        patch: GradePatch,
    ) -> StoreResult<grade::Model> {
        let existing = grade::Entity::find_by_id(id)
            .filter(grade::Column::OwnerId.eq(owner))
            .one(&self.db)
            .await
            .map_err(map_db_err)?
            .ok_or(StoreError::NotFound)?;

        let mut model: grade::ActiveModel = existing.into();
        if let Some(label) = patch.label {
            model.label = Set(label);
        }
        if let Some(score) = patch.score {
            model.score = Set(score);
        }
        if let Some(max_score) = patch.max_score {
            model.max_score = Set(max_score);
        }
        if let Some(weight) = patch.weight {
            model.weight = Set(weight);
        }
        model.updated_at = Set(now());

        model.update(&self.db).await.map_err(map_db_err)
    }

    async fn delete_grade(&self, owner: Uuid, id: Uuid) -> StoreResult<()> {
        let result = grade::Entity::delete_by_id(id)
            .filter(grade::Column::OwnerId.eq(owner))
            .exec(&self.db)
            .await
            .map_err(map_db_err)?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn export(&self, owner: Uuid) -> StoreResult<ExportBundle> {
        Ok(ExportBundle {
            connections: self.list_connections(owner).await?,
            accounts: self.list_accounts(owner).await?,
            units: self.list_units(owner, UnitFilter::default()).await?,
            assignments: self
                .list_assignments(owner, AssignmentFilter::default())
                .await?,
            exams: self.list_exams(owner, UnitScopedFilter::default()).await?,
            events: self.list_events(owner, UnitScopedFilter::default()).await?,
            grades: self.list_grades(owner, UnitScopedFilter::default()).await?,
        })
    }

    async fn import(&self, owner: Uuid, bundle: ExportBundle) -> StoreResult<usize> {
        let count = bundle.record_count();

        // Replace-by-id, forcing the authenticated owner onto every row. An
        // id that already belongs to a different owner is a conflict, never
        // an overwrite.
        macro_rules! import_collection {
            ($records:expr, $module:ident) => {
                for mut record in $records {
                    record.owner_id = owner;
                    if let Some(existing) = $module::Entity::find_by_id(record.id)
                        .one(&self.db)
                        .await
                        .map_err(map_db_err)?
                    {
                        if existing.owner_id != owner {
                            return Err(StoreError::Conflict);
                        }
                        $module::Entity::delete_by_id(record.id)
                            .exec(&self.db)
                            .await
                            .map_err(map_db_err)?;
                    }
                    record
                        .into_active_model()
                        .reset_all()
                        .insert(&self.db)
                        .await
                        .map_err(map_db_err)?;
                }
            };
        }

        import_collection!(bundle.connections, connection);
        import_collection!(bundle.accounts, account);
        import_collection!(bundle.units, unit);
        import_collection!(bundle.assignments, assignment);
        import_collection!(bundle.exams, exam);
        import_collection!(bundle.events, event);
        import_collection!(bundle.grades, grade);

        Ok(count)
    }
}
