//! Migration to create the assignments table.

use sea_orm_migration::prelude::*;

use crate::m2025_06_01_000004_create_units::Units;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Assignments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Assignments::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Assignments::OwnerId).uuid().not_null())
                    .col(ColumnDef::new(Assignments::UnitId).uuid().not_null())
                    .col(ColumnDef::new(Assignments::Title).text().not_null())
                    .col(
                        ColumnDef::new(Assignments::DueAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Assignments::Weight).double().null())
                    .col(
                        ColumnDef::new(Assignments::Completed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Assignments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Assignments::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_assignments_unit_id")
                            .from(Assignments::Table, Assignments::UnitId)
                            .to(Units::Table, Units::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_assignments_owner_unit")
                    .table(Assignments::Table)
                    .col(Assignments::OwnerId)
                    .col(Assignments::UnitId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_assignments_owner_unit").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Assignments::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Assignments {
    Table,
    Id,
    OwnerId,
    UnitId,
    Title,
    DueAt,
    Weight,
    Completed,
    CreatedAt,
    UpdatedAt,
}
