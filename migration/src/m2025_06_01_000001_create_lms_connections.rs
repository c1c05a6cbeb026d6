//! Migration to create the lms_connections table.
//!
//! A connection links a local owner to one Canvas instance. The access
//! token itself lives in lms_secrets, not here.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LmsConnections::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LmsConnections::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LmsConnections::OwnerId).uuid().not_null())
                    .col(ColumnDef::new(LmsConnections::Provider).text().not_null())
                    .col(ColumnDef::new(LmsConnections::BaseUrl).text().not_null())
                    .col(ColumnDef::new(LmsConnections::Metadata).json_binary().null())
                    .col(
                        ColumnDef::new(LmsConnections::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(LmsConnections::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(LmsConnections::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // One connection per owner per institution.
        manager
            .create_index(
                Index::create()
                    .name("idx_lms_connections_owner_provider_base")
                    .table(LmsConnections::Table)
                    .col(LmsConnections::OwnerId)
                    .col(LmsConnections::Provider)
                    .col(LmsConnections::BaseUrl)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_lms_connections_owner_id")
                    .table(LmsConnections::Table)
                    .col(LmsConnections::OwnerId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_lms_connections_owner_provider_base")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_lms_connections_owner_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(LmsConnections::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum LmsConnections {
    Table,
    Id,
    OwnerId,
    Provider,
    BaseUrl,
    Metadata,
    LastSyncedAt,
    CreatedAt,
    UpdatedAt,
}
