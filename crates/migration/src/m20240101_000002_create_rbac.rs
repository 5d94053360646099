//! Create `permission`, `role` and the `role_permission` join table.
//!
//! `role.tenant_id` is NULL for system roles.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Permission::Table)
                    .if_not_exists()
                    .col(uuid(Permission::Id).primary_key())
                    .col(string_len(Permission::Name, 100).unique_key().not_null())
                    .col(string_len(Permission::Resource, 50).not_null())
                    .col(string_len(Permission::Action, 50).not_null())
                    .col(ColumnDef::new(Permission::Description).text().null())
                    .col(boolean(Permission::IsSystemPermission).not_null().default(false))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Role::Table)
                    .if_not_exists()
                    .col(uuid(Role::Id).primary_key())
                    .col(ColumnDef::new(Role::TenantId).uuid().null())
                    .col(string_len(Role::Name, 50).not_null())
                    .col(ColumnDef::new(Role::Description).text().null())
                    .col(boolean(Role::IsSystemRole).not_null().default(false))
                    .col(boolean(Role::IsDefault).not_null().default(false))
                    .col(timestamp_with_time_zone(Role::CreatedAt).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_role_tenant")
                            .from(Role::Table, Role::TenantId)
                            .to(Tenant::Table, Tenant::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RolePermission::Table)
                    .if_not_exists()
                    .col(uuid(RolePermission::RoleId).not_null())
                    .col(uuid(RolePermission::PermissionId).not_null())
                    .primary_key(Index::create().col(RolePermission::RoleId).col(RolePermission::PermissionId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_role_permission_role")
                            .from(RolePermission::Table, RolePermission::RoleId)
                            .to(Role::Table, Role::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_role_permission_permission")
                            .from(RolePermission::Table, RolePermission::PermissionId)
                            .to(Permission::Table, Permission::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(RolePermission::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Role::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Permission::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Permission { Table, Id, Name, Resource, Action, Description, IsSystemPermission }

#[derive(DeriveIden)]
enum Role { Table, Id, TenantId, Name, Description, IsSystemRole, IsDefault, CreatedAt }

#[derive(DeriveIden)]
enum RolePermission { Table, RoleId, PermissionId }

#[derive(DeriveIden)]
enum Tenant { Table, Id }
