//! Migration to create the units table.
//!
//! A unit is one course, either mirrored from Canvas (external_id set)
//! or created manually by the owner. Sync upserts by
//! (owner_id, external_id) and never deletes rows.

use sea_orm_migration::prelude::*;

use crate::m2025_06_01_000003_create_lms_accounts::LmsAccounts;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Units::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Units::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Units::OwnerId).uuid().not_null())
                    .col(ColumnDef::new(Units::AccountId).uuid().null())
                    .col(ColumnDef::new(Units::ExternalId).text().null())
                    .col(ColumnDef::new(Units::Code).text().null())
                    .col(ColumnDef::new(Units::Title).text().not_null())
                    .col(ColumnDef::new(Units::CanvasUrl).text().null())
                    .col(ColumnDef::new(Units::Year).integer().null())
                    .col(ColumnDef::new(Units::Semester).integer().null())
                    .col(ColumnDef::new(Units::Role).text().null())
                    .col(ColumnDef::new(Units::Syllabus).text().null())
                    .col(
                        ColumnDef::new(Units::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Units::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_units_account_id")
                            .from(Units::Table, Units::AccountId)
                            .to(LmsAccounts::Table, LmsAccounts::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // Upsert key for course sync; partial on external_id being present
        // is not portable, so the unique index includes owner_id only and
        // NULL external_id rows (manual units) never collide.
        manager
            .create_index(
                Index::create()
                    .name("idx_units_owner_external")
                    .table(Units::Table)
                    .col(Units::OwnerId)
                    .col(Units::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_units_owner_id")
                    .table(Units::Table)
                    .col(Units::OwnerId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_units_owner_external").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_units_owner_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Units::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Units {
    Table,
    Id,
    OwnerId,
    AccountId,
    ExternalId,
    Code,
    Title,
    CanvasUrl,
    Year,
    Semester,
    Role,
    Syllabus,
    CreatedAt,
    UpdatedAt,
}
