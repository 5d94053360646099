use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .name("idx_domain_mapping_tenant")
                    .table(DomainMapping::Table)
                    .col(DomainMapping::TenantId)
                    .to_owned(),
            )
            .await?;

        // Role names are unique per tenant
        manager
            .create_index(
                Index::create()
                    .name("uniq_role_tenant_name")
                    .table(Role::Table)
                    .col(Role::TenantId)
                    .col(Role::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uniq_user_tenant_email")
                    .table(User::Table)
                    .col(User::TenantId)
                    .col(User::Email)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_session_user")
                    .table(UserSession::Table)
                    .col(UserSession::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_user_session_user").table(UserSession::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("uniq_user_tenant_email").table(User::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("uniq_role_tenant_name").table(Role::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_domain_mapping_tenant").table(DomainMapping::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DomainMapping { Table, TenantId }

#[derive(DeriveIden)]
enum Role { Table, TenantId, Name }

#[derive(DeriveIden)]
enum User { Table, TenantId, Email }

#[derive(DeriveIden)]
enum UserSession { Table, UserId }
