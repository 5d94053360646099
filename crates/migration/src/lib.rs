//! Global (public schema) tables in dependency order. Indexes are applied last.
//! Per-tenant schemas are created at runtime and are not migrated here.
pub use sea_orm_migration::prelude::*;

mod m20240101_000001_create_tenant;
mod m20240101_000002_create_rbac;
mod m20240101_000003_create_user;
mod m20240101_000004_create_user_session;
mod m20240101_000005_add_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_tenant::Migration),
            Box::new(m20240101_000002_create_rbac::Migration),
            Box::new(m20240101_000003_create_user::Migration),
            Box::new(m20240101_000004_create_user_session::Migration),
            Box::new(m20240101_000005_add_indexes::Migration),
        ]
    }
}
