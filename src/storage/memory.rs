//! Ephemeral in-memory storage adapter.
//!
//! Plain vectors behind one async mutex, with generated ids. Used for
//! local development and tests. Uniqueness constraints and cascades are
//! enforced by hand to match the database schema.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::crypto::EncryptedToken;
use crate::models::{account, assignment, connection, event, exam, grade, secret, unit};

use super::{
    AccountUpsert, AssignmentFilter, AssignmentPatch, ConnectionPatch, EventPatch, ExamPatch,
    ExportBundle, GradePatch, NewAssignment, NewConnection, NewEvent, NewExam, NewGrade, NewUnit,
    Store, StoreError, StoreResult, UnitFilter, UnitPatch, UnitScopedFilter, UnitUpsert,
    UpsertOutcome,
};

#[derive(Debug, Default)]
struct Collections {
    connections: Vec<connection::Model>,
    secrets: Vec<secret::Model>,
    accounts: Vec<account::Model>,
    units: Vec<unit::Model>,
    assignments: Vec<assignment::Model>,
    exams: Vec<exam::Model>,
    events: Vec<event::Model>,
    grades: Vec<grade::Model>,
}

/// In-memory [`Store`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn now() -> DateTimeWithTimeZone {
    Utc::now().into()
}

impl Collections {
    fn owned_unit(&self, owner: Uuid, id: Uuid) -> StoreResult<&unit::Model> {
        self.units
            .iter()
            .find(|u| u.id == id && u.owner_id == owner)
            .ok_or(StoreError::NotFound)
    }

    fn owned_connection(&self, owner: Uuid, id: Uuid) -> StoreResult<&connection::Model> {
        self.connections
            .iter()
            .find(|c| c.id == id && c.owner_id == owner)
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_connections(&self, owner: Uuid) -> StoreResult<Vec<connection::Model>> {
        let data = self.inner.lock().await;
        Ok(data
            .connections
            .iter()
            .filter(|c| c.owner_id == owner)
            .cloned()
            .collect())
    }

    async fn get_connection(&self, owner: Uuid, id: Uuid) -> StoreResult<connection::Model> {
        let data = self.inner.lock().await;
        data.owned_connection(owner, id).cloned()
    }

    async fn find_connection(
        &self,
        owner: Uuid,
        provider: &str,
        base_url: &str,
    ) -> StoreResult<Option<connection::Model>> {
        let data = self.inner.lock().await;
        Ok(data
            .connections
            .iter()
            .find(|c| c.owner_id == owner && c.provider == provider && c.base_url == base_url)
            .cloned())
    }

    async fn create_connection(
        &self,
        owner: Uuid,
        payload: NewConnection,
    ) -> StoreResult<connection::Model> {
        let mut data = self.inner.lock().await;

        let duplicate = data.connections.iter().any(|c| {
            c.owner_id == owner && c.provider == payload.provider && c.base_url == payload.base_url
        });
        if duplicate {
            return Err(StoreError::Conflict);
        }

        let timestamp = now();
        let model = connection::Model {
            id: Uuid::new_v4(),
            owner_id: owner,
            provider: payload.provider,
            base_url: payload.base_url,
            metadata: payload.metadata,
            last_synced_at: None,
            created_at: timestamp,
            updated_at: timestamp,
        };
        data.connections.push(model.clone());
        Ok(model)
    }

    async fn update_connection(
        &self,
        owner: Uuid,
        id: Uuid,
        patch: ConnectionPatch,
    ) -> StoreResult<connection::Model> {
        let mut data = self.inner.lock().await;
        let model = data
            .connections
            .iter_mut()
            .find(|c| c.id == id && c.owner_id == owner)
            .ok_or(StoreError::NotFound)?;

        if let Some(metadata) = patch.metadata {
            model.metadata = metadata;
        }
        if let Some(last_synced_at) = patch.last_synced_at {
            model.last_synced_at = last_synced_at.map(Into::into);
        }
        model.updated_at = now();

        Ok(model.clone())
    }

    async fn delete_connection(&self, owner: Uuid, id: Uuid) -> StoreResult<()> {
        let mut data = self.inner.lock().await;
        data.owned_connection(owner, id)?;

        data.connections.retain(|c| c.id != id);
        data.secrets.retain(|s| s.connection_id != id);
        Ok(())
    }

    async fn put_secret(
        &self,
        owner: Uuid,
        connection_id: Uuid,
        token: EncryptedToken,
    ) -> StoreResult<()> {
        let mut data = self.inner.lock().await;
        data.owned_connection(owner, connection_id)?;

        data.secrets.retain(|s| s.connection_id != connection_id);
        data.secrets.push(secret::Model {
            id: Uuid::new_v4(),
            connection_id,
            ciphertext: token.ciphertext,
            iv: token.iv,
            created_at: now(),
        });
        Ok(())
    }

    async fn get_secret(
        &self,
        owner: Uuid,
        connection_id: Uuid,
    ) -> StoreResult<EncryptedToken> {
        let data = self.inner.lock().await;
        data.owned_connection(owner, connection_id)?;

        data.secrets
            .iter()
            .find(|s| s.connection_id == connection_id)
            .map(|s| EncryptedToken {
                ciphertext: s.ciphertext.clone(),
                iv: s.iv.clone(),
            })
            .ok_or(StoreError::NotFound)
    }

    async fn delete_secret(&self, owner: Uuid, connection_id: Uuid) -> StoreResult<()> {
        let mut data = self.inner.lock().await;
        data.owned_connection(owner, connection_id)?;

        let before = data.secrets.len();
        data.secrets.retain(|s| s.connection_id != connection_id);
        if data.secrets.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_accounts(&self, owner: Uuid) -> StoreResult<Vec<account::Model>> {
        let data = self.inner.lock().await;
        Ok(data
            .accounts
            .iter()
            .filter(|a| a.owner_id == owner)
            .cloned()
            .collect())
    }

    async fn upsert_account(
        &self,
        owner: Uuid,
        payload: AccountUpsert,
    ) -> StoreResult<(account::Model, UpsertOutcome)> {
        let mut data = self.inner.lock().await;
        let timestamp = now();

        if let Some(existing) = data.accounts.iter_mut().find(|a| {
            a.owner_id == owner && a.provider == payload.provider && a.base_url == payload.base_url
        }) {
            existing.external_id = payload.external_id;
            existing.name = payload.name;
            existing.short_name = payload.short_name;
            existing.sortable_name = payload.sortable_name;
            existing.avatar_url = payload.avatar_url;
            existing.primary_email = payload.primary_email;
            existing.locale = payload.locale;
            existing.calendar_url = payload.calendar_url;
            existing.profile_synced_at = Some(timestamp);
            existing.updated_at = timestamp;
            return Ok((existing.clone(), UpsertOutcome::Updated));
        }

        let model = account::Model {
            id: Uuid::new_v4(),
            owner_id: owner,
            provider: payload.provider,
            base_url: payload.base_url,
            external_id: payload.external_id,
            name: payload.name,
            short_name: payload.short_name,
            sortable_name: payload.sortable_name,
            avatar_url: payload.avatar_url,
            primary_email: payload.primary_email,
            locale: payload.locale,
            calendar_url: payload.calendar_url,
            profile_synced_at: Some(timestamp),
            created_at: timestamp,
            updated_at: timestamp,
        };
        data.accounts.push(model.clone());
        Ok((model, UpsertOutcome::Created))
    }

    async fn delete_account(&self, owner: Uuid, id: Uuid) -> StoreResult<()> {
        let mut data = self.inner.lock().await;
        let exists = data
            .accounts
            .iter()
            .any(|a| a.id == id && a.owner_id == owner);
        if !exists {
            return Err(StoreError::NotFound);
        }

        data.accounts.retain(|a| a.id != id);
        // Mirror the relational ON DELETE SET NULL.
        for unit in data.units.iter_mut().filter(|u| u.account_id == Some(id)) {
            unit.account_id = None;
        }
        Ok(())
    }

    async fn list_units(&self, owner: Uuid, filter: UnitFilter) -> StoreResult<Vec<unit::Model>> {
        let data = self.inner.lock().await;
        Ok(data
            .units
            .iter()
            .filter(|u| u.owner_id == owner)
            .filter(|u| filter.account_id.is_none_or(|id| u.account_id == Some(id)))
            .filter(|u| filter.year.is_none_or(|y| u.year == Some(y)))
            .filter(|u| filter.semester.is_none_or(|s| u.semester == Some(s)))
            .cloned()
            .collect())
    }

    async fn get_unit(&self, owner: Uuid, id: Uuid) -> StoreResult<unit::Model> {
        let data = self.inner.lock().await;
        data.owned_unit(owner, id).cloned()
    }

    async fn create_unit(&self, owner: Uuid, payload: NewUnit) -> StoreResult<unit::Model> {
        let mut data = self.inner.lock().await;
        let timestamp = now();

        let model = unit::Model {
            id: Uuid::new_v4(),
            owner_id: owner,
            account_id: None,
            external_id: None,
            code: payload.code,
            title: payload.title,
            canvas_url: None,
            year: payload.year,
            semester: payload.semester,
            role: None,
            syllabus: None,
            created_at: timestamp,
            updated_at: timestamp,
        };
        data.units.push(model.clone());
        Ok(model)
    }

    async fn update_unit(
        &self,
        owner: Uuid,
        id: Uuid,
        patch: UnitPatch,
    ) -> StoreResult<unit::Model> {
        let mut data = self.inner.lock().await;
        let model = data
            .units
            .iter_mut()
            .find(|u| u.id == id && u.owner_id == owner)
            .ok_or(StoreError::NotFound)?;

        if let Some(title) = patch.title {
            model.title = title;
        }
        if let Some(code) = patch.code {
            model.code = code;
        }
        if let Some(year) = patch.year {
            model.year = year;
        }
        if let Some(semester) = patch.semester {
            model.semester = semester;
        }
        if let Some(syllabus) = patch.syllabus {
            model.syllabus = syllabus;
        }
        model.updated_at = now();

        Ok(model.clone())
    }

    async fn upsert_unit(
        &self,
        owner: Uuid,
        payload: UnitUpsert,
    ) -> StoreResult<(unit::Model, UpsertOutcome)> {
        let mut data = self.inner.lock().await;
        let timestamp = now();

        if let Some(existing) = data
            .units
            .iter_mut()
            .find(|u| u.owner_id == owner && u.external_id.as_deref() == Some(&payload.external_id))
        {
            existing.account_id = payload.account_id;
            existing.code = payload.code;
            existing.title = payload.title;
            existing.canvas_url = payload.canvas_url;
            existing.year = payload.year;
            existing.semester = payload.semester;
            existing.role = payload.role;
            existing.syllabus = payload.syllabus;
            existing.updated_at = timestamp;
            return Ok((existing.clone(), UpsertOutcome::Updated));
        }

        let model = unit::Model {
            id: Uuid::new_v4(),
            owner_id: owner,
            account_id: payload.account_id,
            external_id: Some(payload.external_id),
            code: payload.code,
            title: payload.title,
            canvas_url: payload.canvas_url,
            year: payload.year,
            semester: payload.semester,
            role: payload.role,
            syllabus: payload.syllabus,
            created_at: timestamp,
            updated_at: timestamp,
        };
        data.units.push(model.clone());
        Ok((model, UpsertOutcome::Created))
    }

    async fn delete_unit(&self, owner: Uuid, id: Uuid) -> StoreResult<()> {
        let mut data = self.inner.lock().await;
        data.owned_unit(owner, id)?;

        data.units.retain(|u| u.id != id);
        data.assignments.retain(|a| a.unit_id != id);
        data.exams.retain(|e| e.unit_id != id);
        data.events.retain(|e| e.unit_id != id);
        data.grades.retain(|g| g.unit_id != id);
        Ok(())
    }

    async fn list_assignments(
        &self,
        owner: Uuid,
        filter: AssignmentFilter,
    ) -> StoreResult<Vec<assignment::Model>> {
        let data = self.inner.lock().await;
        Ok(data
            .assignments
            .iter()
            .filter(|a| a.owner_id == owner)
            .filter(|a| filter.unit_id.is_none_or(|id| a.unit_id == id))
            .filter(|a| filter.completed.is_none_or(|done| a.completed == done))
            .cloned()
            .collect())
    }

    async fn create_assignment(
        &self,
        owner: Uuid,
        payload: NewAssignment,
    ) -> StoreResult<assignment::Model> {
        let mut data = self.inner.lock().await;
        data.owned_unit(owner, payload.unit_id)?;
        let timestamp = now();

        let model = assignment::Model {
            id: Uuid::new_v4(),
            owner_id: owner,
            unit_id: payload.unit_id,
            title: payload.title,
            due_at: payload.due_at.map(Into::into),
            weight: payload.weight,
            completed: false,
            created_at: timestamp,
            updated_at: timestamp,
        };
        data.assignments.push(model.clone());
        Ok(model)
    }

    async fn update_assignment(
        &self,
        owner: Uuid,
        id: Uuid,
        patch: AssignmentPatch,
    ) -> StoreResult<assignment::Model> {
        let mut data = self.inner.lock().await;
        let model = data
            .assignments
            .iter_mut()
            .find(|a| a.id == id && a.owner_id == owner)
            .ok_or(StoreError::NotFound)?;

        if let Some(title) = patch.title {
            model.title = title;
        }
        if let Some(due_at) = patch.due_at {
            model.due_at = due_at.map(Into::into);
        }
        if let Some(weight) = patch.weight {
            model.weight = weight;
        }
        if let Some(completed) = patch.completed {
            model.completed = completed;
        }
        model.updated_at = now();

        Ok(model.clone())
    }

    async fn delete_assignment(&self, owner: Uuid, id: Uuid) -> StoreResult<()> {
        let mut data = self.inner.lock().await;
        let before = data.assignments.len();
        data.assignments
            .retain(|a| !(a.id == id && a.owner_id == owner));
        if data.assignments.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_exams(
        &self,
        owner: Uuid,
        filter: UnitScopedFilter,
    ) -> StoreResult<Vec<exam::Model>> {
        let data = self.inner.lock().await;
        Ok(data
            .exams
            .iter()
            .filter(|e| e.owner_id == owner)
            .filter(|e| filter.unit_id.is_none_or(|id| e.unit_id == id))
            .cloned()
            .collect())
    }

    async fn create_exam(&self, owner: Uuid, payload: NewExam) -> StoreResult<exam::Model> {
        let mut data = self.inner.lock().await;
        data.owned_unit(owner, payload.unit_id)?;
        let timestamp = now();

        let model = exam::Model {
            id: Uuid::new_v4(),
            owner_id: owner,
            unit_id: payload.unit_id,
            title: payload.title,
            starts_at: payload.starts_at.map(Into::into),
            location: payload.location,
            weight: payload.weight,
            created_at: timestamp,
            updated_at: timestamp,
        };
        data.exams.push(model.clone());
        Ok(model)
    }

    async fn update_exam(
        &self,
        owner: Uuid,
        id: Uuid,
        patch: ExamPatch,
    ) -> StoreResult<exam::Model> {
        let mut data = self.inner.lock().await;
        let model = data
            .exams
            .iter_mut()
            .find(|e| e.id == id && e.owner_id == owner)
            .ok_or(StoreError::NotFound)?;

        if let Some(title) = patch.title {
            model.title = title;
        }
        if let Some(starts_at) = patch.starts_at {
            model.starts_at = starts_at.map(Into::into);
        }
        if let Some(location) = patch.location {
            model.location = location;
        }
        if let Some(weight) = patch.weight {
            model.weight = weight;
        }
        model.updated_at = now();

        Ok(model.clone())
    }

    async fn delete_exam(&self, owner: Uuid, id: Uuid) -> StoreResult<()> {
        let mut data = self.inner.lock().await;
        let before = data.exams.len();
        data.exams.retain(|e| !(e.id == id && e.owner_id == owner));
        if data.exams.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_events(
        &self,
        owner: Uuid,
        filter: UnitScopedFilter,
    ) -> StoreResult<Vec<event::Model>> {
        let data = self.inner.lock().await;
        Ok(data
            .events
            .iter()
            .filter(|e| e.owner_id == owner)
            .filter(|e| filter.unit_id.is_none_or(|id| e.unit_id == id))
            .cloned()
            .collect())
    }

    async fn create_event(&self, owner: Uuid, payload: NewEvent) -> StoreResult<event::Model> {
        let mut data = self.inner.lock().await;
        data.owned_unit(owner, payload.unit_id)?;
        let timestamp = now();

        let model = event::Model {
            id: Uuid::new_v4(),
            owner_id: owner,
            unit_id: payload.unit_id,
            title: payload.title,
            starts_at: payload.starts_at.into(),
            ends_at: payload.ends_at.map(Into::into),
            location: payload.location,
            created_at: timestamp,
            updated_at: timestamp,
        };
        data.events.push(model.clone());
        Ok(model)
    }

    async fn update_event(
        &self,
        owner: Uuid,
        id: Uuid,
        patch: EventPatch,
    ) -> StoreResult<event::Model> {
        let mut data = self.inner.lock().await;
        let model = data
            .events
            .iter_mut()
            .find(|e| e.id == id && e.owner_id == owner)
            .ok_or(StoreError::NotFound)?;

        if let Some(title) = patch.title {
            model.title = title;
        }
        if let Some(starts_at) = patch.starts_at {
            model.starts_at = starts_at.into();
        }
        if let Some(ends_at) = patch.ends_at {
            model.ends_at = ends_at.map(Into::into);
        }
        if let Some(location) = patch.location {
            model.location = location;
        }
        model.updated_at = now();

        Ok(model.clone())
    }

    async fn delete_event(&self, owner: Uuid, id: Uuid) -> StoreResult<()> {
        let mut data = self.inner.lock().await;
        let before = data.events.len();
        data.events.retain(|e| !(e.id == id && e.owner_id == owner));
        if data.events.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_grades(
        &self,
        owner: Uuid,
        filter: UnitScopedFilter,
    ) -> StoreResult<Vec<grade::Model>> {
        let data = self.inner.lock().await;
        Ok(data
            .grades
            .iter()
            .filter(|g| g.owner_id == owner)
            .filter(|g| filter.unit_id.is_none_or(|id| g.unit_id == id))
            .cloned()
            .collect())
    }

    async fn create_grade(&self, owner: Uuid, payload: NewGrade) -> StoreResult<grade::Model> {
        let mut data = self.inner.lock().await;
        data.owned_unit(owner, payload.unit_id)?;
        let timestamp = now();

        let model = grade::Model {
            id: Uuid::new_v4(),
            owner_id: owner,
            unit_id: payload.unit_id,
            label: payload.label,
            score: payload.score,
            max_score: payload.max_score,
            weight: payload.weight,
            created_at: timestamp,
            updated_at: timestamp,
        };
        data.grades.push(model.clone());
        Ok(model)
    }

    async fn update_grade(
        &self,
        owner: Uuid,
        id: Uuid,
        patch: GradePatch,
    ) -> StoreResult<grade::Model> {
        let mut data = self.inner.lock().await;
        let model = data
            .grades
            .iter_mut()
            .find(|g| g.id == id && g.owner_id == owner)
            .ok_or(StoreError::NotFound)?;

        if let Some(label) = patch.label {
            model.label = label;
        }
        if let Some(score) = patch.score {
            model.score = score;
        }
        if let Some(max_score) = patch.max_score {
            model.max_score = max_score;
        }
        if let Some(weight) = patch.weight {
            model.weight = weight;
        }
        model.updated_at = now();

        Ok(model.clone())
    }

    async fn delete_grade(&self, owner: Uuid, id: Uuid) -> StoreResult<()> {
        let mut data = self.inner.lock().await;
        let before = data.grades.len();
        data.grades.retain(|g| !(g.id == id && g.owner_id == owner));
        if data.grades.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn export(&self, owner: Uuid) -> StoreResult<ExportBundle> {
        let data = self.inner.lock().await;
        Ok(ExportBundle {
            connections: data
                .connections
                .iter()
                .filter(|c| c.owner_id == owner)
                .cloned()
                .collect(),
            accounts: data
                .accounts
                .iter()
                .filter(|a| a.owner_id == owner)
                .cloned()
                .collect(),
            units: data
                .units
                .iter()
                .filter(|u| u.owner_id == owner)
                .cloned()
                .collect(),
            assignments: data
                .assignments
                .iter()
                .filter(|a| a.owner_id == owner)
                .cloned()
                .collect(),
            exams: data
                .exams
                .iter()
                .filter(|e| e.owner_id == owner)
                .cloned()
                .collect(),
            events: data
                .events
                .iter()
                .filter(|e| e.owner_id == owner)
                .cloned()
                .collect(),
            grades: data
                .grades
                .iter()
                .filter(|g| g.owner_id == owner)
                .cloned()
                .collect(),
        })
    }

    async fn import(&self, owner: Uuid, bundle: ExportBundle) -> StoreResult<usize> {
        let mut data = self.inner.lock().await;
        let count = bundle.record_count();

        // Replace-by-id, forcing the authenticated owner onto every row. An
        // id that already belongs to a different owner is a conflict, never
        // an overwrite.
        fn merge<T: Clone>(
            existing: &mut Vec<T>,
            incoming: Vec<T>,
            id_of: impl Fn(&T) -> Uuid,
            owner_of: impl Fn(&T) -> Uuid,
            force_owner: impl Fn(&mut T),
            importer: Uuid,
        ) -> StoreResult<()> {
            for mut record in incoming {
                force_owner(&mut record);
                let id = id_of(&record);
                if let Some(slot) = existing.iter_mut().find(|r| id_of(r) == id) {
                    if owner_of(slot) != importer {
                        return Err(StoreError::Conflict);
                    }
                    *slot = record;
                } else {
                    existing.push(record);
                }
            }
            Ok(())
        }

        merge(
            &mut data.connections,
            bundle.connections,
            |c| c.id,
            |c| c.owner_id,
            |c| c.owner_id = owner,
            owner,
        )?;
        merge(
            &mut data.accounts,
            bundle.accounts,
            |a| a.id,
            |a| a.owner_id,
            |a| a.owner_id = owner,
            owner,
        )?;
        merge(
            &mut data.units,
            bundle.units,
            |u| u.id,
            |u| u.owner_id,
            |u| u.owner_id = owner,
            owner,
        )?;
        merge(
            &mut data.assignments,
            bundle.assignments,
            |a| a.id,
            |a| a.owner_id,
            |a| a.owner_id = owner,
            owner,
        )?;
        merge(
            &mut data.exams,
            bundle.exams,
            |e| e.id,
            |e| e.owner_id,
            |e| e.owner_id = owner,
            owner,
        )?;
        merge(
            &mut data.events,
            bundle.events,
            |e| e.id,
            |e| e.owner_id,
            |e| e.owner_id = owner,
            owner,
        )?;
        merge(
            &mut data.grades,
            bundle.grades,
            |g| g.id,
            |g| g.owner_id,
            |g| g.owner_id = owner,
            owner,
        )?;

        Ok(count)
    }
}
