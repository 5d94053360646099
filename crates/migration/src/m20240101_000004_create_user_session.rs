//! Create `user_session`: one row per issued refresh token, keyed by its `jti`.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserSession::Table)
                    .if_not_exists()
                    .col(uuid(UserSession::Id).primary_key())
                    .col(uuid(UserSession::UserId).not_null())
                    .col(ColumnDef::new(UserSession::TenantId).uuid().null())
                    .col(string_len(UserSession::TokenRef, 64).unique_key().not_null())
                    .col(timestamp_with_time_zone(UserSession::IssuedAt).not_null())
                    .col(timestamp_with_time_zone(UserSession::ExpiresAt).not_null())
                    .col(ColumnDef::new(UserSession::RevokedAt).timestamp_with_time_zone().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_session_user")
                            .from(UserSession::Table, UserSession::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(UserSession::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum UserSession { Table, Id, UserId, TenantId, TokenRef, IssuedAt, ExpiresAt, RevokedAt }

#[derive(DeriveIden)]
enum User { Table, Id }
