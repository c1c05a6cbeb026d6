//! Storage port contract suite.
//!
//! Every test runs against both adapters (the in-memory store and the
//! SeaORM store on in-memory SQLite) to guarantee behavioral parity.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use unitrack::crypto::EncryptedToken;
use unitrack::storage::{
    AccountUpsert, AssignmentFilter, AssignmentPatch, DatabaseStore, MemoryStore, NewAssignment,
    NewConnection, NewEvent, NewExam, NewGrade, Store, StoreError, UnitFilter, UnitScopedFilter,
    UnitUpsert, UpsertOutcome,
};

async fn stores() -> Vec<(&'static str, Arc<dyn Store>)> {
    let memory: Arc<dyn Store> = Arc::new(MemoryStore::new());

    let db = sea_orm::Database::connect("sqlite::memory:")
        .await
        .expect("sqlite connects");
    unitrack::db::run_migrations(&db).await.expect("migrations apply");
    let database: Arc<dyn Store> = Arc::new(DatabaseStore::new(db));

    vec![("memory", memory), ("database", database)]
}

fn new_connection() -> NewConnection {
    NewConnection {
        provider: "canvas".to_string(),
        base_url: "https://canvas.qut.edu.au".to_string(),
        metadata: None,
    }
}

fn unit_upsert(external_id: &str, title: &str) -> UnitUpsert {
    UnitUpsert {
        account_id: None,
        external_id: external_id.to_string(),
        code: Some("MXB202_25se2".to_string()),
        title: title.to_string(),
        canvas_url: Some(format!(
            "https://canvas.qut.edu.au/courses/{}",
            external_id
        )),
        year: Some(2025),
        semester: Some(2),
        role: Some("student".to_string()),
        syllabus: None,
    }
}

fn account_upsert(external_id: &str, name: &str) -> AccountUpsert {
    AccountUpsert {
        provider: "canvas".to_string(),
        base_url: "https://canvas.qut.edu.au".to_string(),
        external_id: external_id.to_string(),
        name: Some(name.to_string()),
        short_name: None,
        sortable_name: None,
        avatar_url: None,
        primary_email: None,
        locale: None,
        calendar_url: None,
    }
}

#[tokio::test]
async fn connection_crud_roundtrip() {
    for (label, store) in stores().await {
        let owner = Uuid::new_v4();

        let created = store
            .create_connection(owner, new_connection())
            .await
            .unwrap_or_else(|e| panic!("[{label}] create: {e}"));
        assert_eq!(created.owner_id, owner);
        assert_eq!(created.provider, "canvas");
        assert!(created.last_synced_at.is_none());

        let fetched = store.get_connection(owner, created.id).await.unwrap();
        assert_eq!(fetched.id, created.id);

        let listed = store.list_connections(owner).await.unwrap();
        assert_eq!(listed.len(), 1, "[{label}] one connection listed");

        let found = store
            .find_connection(owner, "canvas", "https://canvas.qut.edu.au")
            .await
            .unwrap();
        assert_eq!(found.map(|c| c.id), Some(created.id));

        store.delete_connection(owner, created.id).await.unwrap();
        assert!(matches!(
            store.get_connection(owner, created.id).await,
            Err(StoreError::NotFound)
        ));
    }
}

#[tokio::test]
async fn duplicate_connection_conflicts() {
    for (label, store) in stores().await {
        let owner = Uuid::new_v4();

        store.create_connection(owner, new_connection()).await.unwrap();
        let second = store.create_connection(owner, new_connection()).await;
        assert!(
            matches!(second, Err(StoreError::Conflict)),
            "[{label}] duplicate (owner, provider, base_url) must conflict"
        );

        // A different owner connecting to the same instance is fine.
        let other_owner = Uuid::new_v4();
        store
            .create_connection(other_owner, new_connection())
            .await
            .unwrap_or_else(|e| panic!("[{label}] other owner create: {e}"));
    }
}

#[tokio::test]
async fn secret_lifecycle_follows_connection() {
    for (label, store) in stores().await {
        let owner = Uuid::new_v4();
        let conn = store.create_connection(owner, new_connection()).await.unwrap();

        let token = EncryptedToken {
            ciphertext: vec![1, 2, 3, 4],
            iv: vec![9; 12],
        };
        store.put_secret(owner, conn.id, token.clone()).await.unwrap();

        let fetched = store.get_secret(owner, conn.id).await.unwrap();
        assert_eq!(fetched, token);

        // Replacement overwrites in place.
        let replacement = EncryptedToken {
            ciphertext: vec![5, 6, 7, 8],
            iv: vec![8; 12],
        };
        store
            .put_secret(owner, conn.id, replacement.clone())
            .await
            .unwrap();
        assert_eq!(store.get_secret(owner, conn.id).await.unwrap(), replacement);

        // Deleting the connection removes the secret with it.
        store.delete_connection(owner, conn.id).await.unwrap();
        assert!(
            matches!(store.get_secret(owner, conn.id).await, Err(StoreError::NotFound)),
            "[{label}] secret gone after connection delete"
        );
    }
}

#[tokio::test]
async fn account_upsert_is_keyed_by_owner_provider_base() {
    for (label, store) in stores().await {
        let owner = Uuid::new_v4();

        let (first, outcome) = store
            .upsert_account(owner, account_upsert("101", "Jess Chen"))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);

        let (second, outcome) = store
            .upsert_account(owner, account_upsert("101", "Jess M Chen"))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated, "[{label}] same key updates");
        assert_eq!(second.id, first.id, "[{label}] no duplicate row");
        assert_eq!(second.name.as_deref(), Some("Jess M Chen"));

        let accounts = store.list_accounts(owner).await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert!(accounts[0].profile_synced_at.is_some());
    }
}

#[tokio::test]
async fn unit_upsert_is_idempotent_with_last_write_wins() {
    for (label, store) in stores().await {
        let owner = Uuid::new_v4();

        let (first, outcome) = store
            .upsert_unit(owner, unit_upsert("4321", "Advanced Calculus"))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);

        let (second, outcome) = store
            .upsert_unit(owner, unit_upsert("4321", "Advanced Calculus II"))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(second.id, first.id);

        let units = store.list_units(owner, UnitFilter::default()).await.unwrap();
        assert_eq!(units.len(), 1, "[{label}] exactly one unit row");
        assert_eq!(units[0].title, "Advanced Calculus II");
    }
}

#[tokio::test]
async fn unit_filters_are_conjunctive() {
    for (label, store) in stores().await {
        let owner = Uuid::new_v4();

        let mut sem1 = unit_upsert("1", "Unit One");
        sem1.year = Some(2025);
        sem1.semester = Some(1);
        store.upsert_unit(owner, sem1).await.unwrap();

        let mut sem2 = unit_upsert("2", "Unit Two");
        sem2.year = Some(2025);
        sem2.semester = Some(2);
        store.upsert_unit(owner, sem2).await.unwrap();

        let mut old = unit_upsert("3", "Unit Three");
        old.year = Some(2024);
        old.semester = Some(2);
        store.upsert_unit(owner, old).await.unwrap();

        let all = store.list_units(owner, UnitFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);

        let filtered = store
            .list_units(
                owner,
                UnitFilter {
                    account_id: None,
                    year: Some(2025),
                    semester: Some(2),
                },
            )
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1, "[{label}] both filters must match");
        assert_eq!(filtered[0].title, "Unit Two");
    }
}

#[tokio::test]
async fn deleting_a_unit_cascades_to_dependents() {
    for (label, store) in stores().await {
        let owner = Uuid::new_v4();
        let (unit, _) = store
            .upsert_unit(owner, unit_upsert("4321", "Advanced Calculus"))
            .await
            .unwrap();

        store
            .create_assignment(
                owner,
                NewAssignment {
                    unit_id: unit.id,
                    title: "Problem sheet 1".to_string(),
                    due_at: Some(Utc::now()),
                    weight: Some(10.0),
                },
            )
            .await
            .unwrap();
        store
            .create_exam(
                owner,
                NewExam {
                    unit_id: unit.id,
                    title: "Final exam".to_string(),
                    starts_at: None,
                    location: None,
                    weight: Some(50.0),
                },
            )
            .await
            .unwrap();
        store
            .create_event(
                owner,
                NewEvent {
                    unit_id: unit.id,
                    title: "Lecture".to_string(),
                    starts_at: Utc::now(),
                    ends_at: None,
                    location: Some("GP Z411".to_string()),
                },
            )
            .await
            .unwrap();
        store
            .create_grade(
                owner,
                NewGrade {
                    unit_id: unit.id,
                    label: "Quiz 1".to_string(),
                    score: 8.0,
                    max_score: 10.0,
                    weight: None,
                },
            )
            .await
            .unwrap();

        store.delete_unit(owner, unit.id).await.unwrap();

        assert!(
            store
                .list_assignments(owner, AssignmentFilter::default())
                .await
                .unwrap()
                .is_empty(),
            "[{label}] assignments cascade"
        );
        assert!(
            store
                .list_exams(owner, UnitScopedFilter::default())
                .await
                .unwrap()
                .is_empty(),
            "[{label}] exams cascade"
        );
        assert!(
            store
                .list_events(owner, UnitScopedFilter::default())
                .await
                .unwrap()
                .is_empty(),
            "[{label}] events cascade"
        );
        assert!(
            store
                .list_grades(owner, UnitScopedFilter::default())
                .await
                .unwrap()
                .is_empty(),
            "[{label}] grades cascade"
        );
    }
}

#[tokio::test]
async fn deleting_an_account_detaches_units_without_deleting_them() {
    for (label, store) in stores().await {
        let owner = Uuid::new_v4();
        let (account, _) = store
            .upsert_account(owner, account_upsert("101", "Jess Chen"))
            .await
            .unwrap();

        let mut linked = unit_upsert("4321", "Advanced Calculus");
        linked.account_id = Some(account.id);
        store.upsert_unit(owner, linked).await.unwrap();

        store.delete_account(owner, account.id).await.unwrap();

        let units = store.list_units(owner, UnitFilter::default()).await.unwrap();
        assert_eq!(units.len(), 1, "[{label}] unit survives account deletion");
        assert_eq!(units[0].account_id, None, "[{label}] link cleared");
        assert!(store.list_accounts(owner).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn cross_owner_access_is_impossible() {
    for (label, store) in stores().await {
        let alice = Uuid::new_v4();
        let mallory = Uuid::new_v4();

        let conn = store.create_connection(alice, new_connection()).await.unwrap();
        let (unit, _) = store
            .upsert_unit(alice, unit_upsert("4321", "Advanced Calculus"))
            .await
            .unwrap();

        assert!(matches!(
            store.get_connection(mallory, conn.id).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.delete_connection(mallory, conn.id).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.get_unit(mallory, unit.id).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.delete_unit(mallory, unit.id).await,
            Err(StoreError::NotFound)
        ));
        // Attaching a record to someone else's unit must fail.
        let forged = store
            .create_assignment(
                mallory,
                NewAssignment {
                    unit_id: unit.id,
                    title: "Planted".to_string(),
                    due_at: None,
                    weight: None,
                },
            )
            .await;
        assert!(
            matches!(forged, Err(StoreError::NotFound)),
            "[{label}] cross-owner attach rejected"
        );

        assert!(store.list_units(mallory, UnitFilter::default()).await.unwrap().is_empty());
        assert_eq!(store.list_units(alice, UnitFilter::default()).await.unwrap().len(), 1);
    }
}

#[tokio::test]
async fn assignment_patch_updates_and_clears_fields() {
    for (label, store) in stores().await {
        let owner = Uuid::new_v4();
        let (unit, _) = store
            .upsert_unit(owner, unit_upsert("4321", "Advanced Calculus"))
            .await
            .unwrap();

        let created = store
            .create_assignment(
                owner,
                NewAssignment {
                    unit_id: unit.id,
                    title: "Problem sheet 1".to_string(),
                    due_at: Some(Utc::now()),
                    weight: Some(10.0),
                },
            )
            .await
            .unwrap();
        assert!(!created.completed);

        let patched = store
            .update_assignment(
                owner,
                created.id,
                AssignmentPatch {
                    title: None,
                    due_at: Some(None),
                    weight: None,
                    completed: Some(true),
                },
            )
            .await
            .unwrap();
        assert!(patched.completed, "[{label}] completed set");
        assert!(patched.due_at.is_none(), "[{label}] due date cleared");
        assert_eq!(patched.title, "Problem sheet 1", "[{label}] title untouched");
        assert_eq!(patched.weight, Some(10.0));

        let done = store
            .list_assignments(
                owner,
                AssignmentFilter {
                    unit_id: Some(unit.id),
                    completed: Some(true),
                },
            )
            .await
            .unwrap();
        assert_eq!(done.len(), 1);
    }
}

#[tokio::test]
async fn export_import_round_trips_every_collection() {
    for (label, store) in stores().await {
        let owner = Uuid::new_v4();

        store.create_connection(owner, new_connection()).await.unwrap();
        store
            .upsert_account(owner, account_upsert("101", "Jess Chen"))
            .await
            .unwrap();
        let (unit, _) = store
            .upsert_unit(owner, unit_upsert("4321", "Advanced Calculus"))
            .await
            .unwrap();
        store
            .create_assignment(
                owner,
                NewAssignment {
                    unit_id: unit.id,
                    title: "Problem sheet 1".to_string(),
                    due_at: None,
                    weight: None,
                },
            )
            .await
            .unwrap();
        store
            .create_exam(
                owner,
                NewExam {
                    unit_id: unit.id,
                    title: "Final exam".to_string(),
                    starts_at: None,
                    location: None,
                    weight: None,
                },
            )
            .await
            .unwrap();
        store
            .create_event(
                owner,
                NewEvent {
                    unit_id: unit.id,
                    title: "Lecture".to_string(),
                    starts_at: Utc::now(),
                    ends_at: None,
                    location: None,
                },
            )
            .await
            .unwrap();
        store
            .create_grade(
                owner,
                NewGrade {
                    unit_id: unit.id,
                    label: "Quiz 1".to_string(),
                    score: 8.0,
                    max_score: 10.0,
                    weight: None,
                },
            )
            .await
            .unwrap();

        let exported = store.export(owner).await.unwrap();
        assert_eq!(exported.record_count(), 7, "[{label}] everything exported");

        // Round-trip through JSON into a fresh store of the same kind.
        let json = serde_json::to_string(&exported).unwrap();
        let parsed = serde_json::from_str(&json).unwrap();

        let fresh: Arc<dyn Store> = if label == "memory" {
            Arc::new(MemoryStore::new())
        } else {
            let db = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
            unitrack::db::run_migrations(&db).await.unwrap();
            Arc::new(DatabaseStore::new(db))
        };

        let imported = fresh.import(owner, parsed).await.unwrap();
        assert_eq!(imported, 7);

        let reexported = fresh.export(owner).await.unwrap();
        assert_eq!(
            serde_json::to_value(&exported).unwrap(),
            serde_json::to_value(&reexported).unwrap(),
            "[{label}] lossless round-trip"
        );
    }
}

#[tokio::test]
async fn import_forces_owner_and_rejects_foreign_ids() {
    for (label, store) in stores().await {
        let original_owner = Uuid::new_v4();
        store
            .upsert_unit(original_owner, unit_upsert("4321", "Advanced Calculus"))
            .await
            .unwrap();
        let bundle = store.export(original_owner).await.unwrap();

        // Importing ids that belong to someone else must not overwrite them.
        let importer = Uuid::new_v4();
        assert!(
            matches!(
                store.import(importer, bundle.clone()).await,
                Err(StoreError::Conflict)
            ),
            "[{label}] foreign ids conflict"
        );
        let originals = store
            .list_units(original_owner, UnitFilter::default())
            .await
            .unwrap();
        assert_eq!(originals[0].owner_id, original_owner);

        // Into a fresh store the same bundle lands under the importer.
        let fresh: Arc<dyn Store> = if label == "memory" {
            Arc::new(MemoryStore::new())
        } else {
            let db = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
            unitrack::db::run_migrations(&db).await.unwrap();
            Arc::new(DatabaseStore::new(db))
        };
        fresh.import(importer, bundle).await.unwrap();
        let imported_units = fresh.list_units(importer, UnitFilter::default()).await.unwrap();
        assert_eq!(imported_units.len(), 1, "[{label}] importer owns the rows");
        assert_eq!(imported_units[0].owner_id, importer);
    }
}
