//! Create `tenant` and `domain_mapping`.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tenant::Table)
                    .if_not_exists()
                    .col(uuid(Tenant::Id).primary_key())
                    .col(string_len(Tenant::Name, 128).not_null())
                    .col(string_len(Tenant::Slug, 30).unique_key().not_null())
                    .col(string_len(Tenant::Subdomain, 30).unique_key().not_null())
                    .col(string_len(Tenant::Status, 16).not_null().default("PENDING"))
                    .col(json_binary(Tenant::Settings).not_null().default(Expr::cust("'{}'::jsonb")))
                    .col(timestamp_with_time_zone(Tenant::CreatedAt).not_null())
                    .col(timestamp_with_time_zone(Tenant::UpdatedAt).not_null())
                    .col(ColumnDef::new(Tenant::DeletedAt).timestamp_with_time_zone().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DomainMapping::Table)
                    .if_not_exists()
                    .col(uuid(DomainMapping::Id).primary_key())
                    .col(uuid(DomainMapping::TenantId).not_null())
                    .col(string_len(DomainMapping::Domain, 253).unique_key().not_null())
                    .col(boolean(DomainMapping::IsPrimary).not_null().default(false))
                    .col(ColumnDef::new(DomainMapping::VerifiedAt).timestamp_with_time_zone().null())
                    .col(timestamp_with_time_zone(DomainMapping::CreatedAt).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_domain_mapping_tenant")
                            .from(DomainMapping::Table, DomainMapping::TenantId)
                            .to(Tenant::Table, Tenant::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(DomainMapping::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Tenant::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Tenant { Table, Id, Name, Slug, Subdomain, Status, Settings, CreatedAt, UpdatedAt, DeletedAt }

#[derive(DeriveIden)]
enum DomainMapping { Table, Id, TenantId, Domain, IsPrimary, VerifiedAt, CreatedAt }
