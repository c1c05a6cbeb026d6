//! Migration to create the exams table.

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
                    .table(Exams::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Exams::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Exams::OwnerId).uuid().not_null())
                    .col(ColumnDef::new(Exams::UnitId).uuid().not_null())
                    .col(ColumnDef::new(Exams::Title).text().not_null())
                    .col(
                        ColumnDef::new(Exams::StartsAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Exams::Location).text().null())
                    .col(ColumnDef::new(Exams::Weight).double().null())
                    .col(
                        ColumnDef::new(Exams::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Exams::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_exams_unit_id")
                            .from(Exams::Table, Exams::UnitId)
                            .to(Units::Table, Units::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_exams_owner_unit")
                    .table(Exams::Table)
                    .col(Exams::OwnerId)
                    .col(Exams::UnitId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_exams_owner_unit").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Exams::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Exams {
    Table,
    Id,
    OwnerId,
    UnitId,
    Title,
    StartsAt,
    Location,
    Weight,
    CreatedAt,
    UpdatedAt,
}
