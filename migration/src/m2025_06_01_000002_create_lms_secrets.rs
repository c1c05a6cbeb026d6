//! Migration to create the lms_secrets table.
//!
//! Stores the encrypted Canvas access token for a connection, one row per
//! connection, separated from connection metadata so listing connections
//! never touches credential material.

use sea_orm_migration::prelude::*;

use crate::m2025_06_01_000001_create_lms_connections::LmsConnections;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LmsSecrets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LmsSecrets::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LmsSecrets::ConnectionId).uuid().not_null())
                    .col(ColumnDef::new(LmsSecrets::Ciphertext).binary().not_null())
                    .col(ColumnDef::new(LmsSecrets::Iv).binary().not_null())
                    .col(
                        ColumnDef::new(LmsSecrets::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_lms_secrets_connection_id")
                            .from(LmsSecrets::Table, LmsSecrets::ConnectionId)
                            .to(LmsConnections::Table, LmsConnections::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_lms_secrets_connection_id")
                    .table(LmsSecrets::Table)
                    .col(LmsSecrets::ConnectionId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_lms_secrets_connection_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(LmsSecrets::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum LmsSecrets {
    Table,
    Id,
    ConnectionId,
    Ciphertext,
    Iv,
    CreatedAt,
}
