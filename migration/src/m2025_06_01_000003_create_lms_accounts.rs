//! Migration to create the lms_accounts table.
//!
//! Local mirror of the Canvas user profile, one row per owner per
//! institution, upserted on every profile sync.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LmsAccounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LmsAccounts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LmsAccounts::OwnerId).uuid().not_null())
                    .col(ColumnDef::new(LmsAccounts::Provider).text().not_null())
                    .col(ColumnDef::new(LmsAccounts::BaseUrl).text().not_null())
                    .col(ColumnDef::new(LmsAccounts::ExternalId).text().not_null())
                    .col(ColumnDef::new(LmsAccounts::Name).text().null())
                    .col(ColumnDef::new(LmsAccounts::ShortName).text().null())
                    .col(ColumnDef::new(LmsAccounts::SortableName).text().null())
                    .col(ColumnDef::new(LmsAccounts::AvatarUrl).text().null())
                    .col(ColumnDef::new(LmsAccounts::PrimaryEmail).text().null())
                    .col(ColumnDef::new(LmsAccounts::Locale).text().null())
                    .col(ColumnDef::new(LmsAccounts::CalendarUrl).text().null())
                    .col(
                        ColumnDef::new(LmsAccounts::ProfileSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(LmsAccounts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(LmsAccounts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Upsert key for profile sync.
        manager
            .create_index(
                Index::create()
                    .name("idx_lms_accounts_owner_provider_base")
                    .table(LmsAccounts::Table)
                    .col(LmsAccounts::OwnerId)
                    .col(LmsAccounts::Provider)
                    .col(LmsAccounts::BaseUrl)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_lms_accounts_owner_provider_base")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(LmsAccounts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum LmsAccounts {
    Table,
    Id,
    OwnerId,
    Provider,
    BaseUrl,
    ExternalId,
    Name,
    ShortName,
    SortableName,
    AvatarUrl,
    PrimaryEmail,
    Locale,
    CalendarUrl,
    ProfileSyncedAt,
    CreatedAt,
    UpdatedAt,
}
