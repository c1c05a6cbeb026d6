//! Migration to create the grades table.

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
                    .table(Grades::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Grades::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Grades::OwnerId).uuid().not_null())
                    .col(ColumnDef::new(Grades::UnitId).uuid().not_null())
                    .col(ColumnDef::new(Grades::Label).text().not_null())
                    .col(ColumnDef::new(Grades::Score).double().not_null())
                    .col(ColumnDef::new(Grades::MaxScore).double().not_null())
                    .col(ColumnDef::new(Grades::Weight).double().null())
                    .col(
                        ColumnDef::new(Grades::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Grades::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_grades_unit_id")
                            .from(Grades::Table, Grades::UnitId)
                            .to(Units::Table, Units::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_grades_owner_unit")
                    .table(Grades::Table)
                    .col(Grades::OwnerId)
                    .col(Grades::UnitId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_grades_owner_unit").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Grades::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Grades {
    Table,
    Id,
    OwnerId,
    UnitId,
    Label,
    Score,
    MaxScore,
    Weight,
    CreatedAt,
    UpdatedAt,
}
