//! Database migrations for the Unitrack API.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_06_01_000001_create_lms_connections;
mod m2025_06_01_000002_create_lms_secrets;
mod m2025_06_01_000003_create_lms_accounts;
mod m2025_06_01_000004_create_units;
mod m2025_06_01_000005_create_assignments;
mod m2025_06_01_000006_create_exams;
mod m2025_06_01_000007_create_events;
mod m2025_06_01_000008_create_grades;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_06_01_000001_create_lms_connections::Migration),
            Box::new(m2025_06_01_000002_create_lms_secrets::Migration),
            Box::new(m2025_06_01_000003_create_lms_accounts::Migration),
            Box::new(m2025_06_01_000004_create_units::Migration),
            Box::new(m2025_06_01_000005_create_assignments::Migration),
            Box::new(m2025_06_01_000006_create_exams::Migration),
            Box::new(m2025_06_01_000007_create_events::Migration),
            Box::new(m2025_06_01_000008_create_grades::Migration),
        ]
    }
}
