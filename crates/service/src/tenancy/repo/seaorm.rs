use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use tracing::debug;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::tenancy::domain::{DomainMapping, Tenant, TenantStatus};
use crate::tenancy::repository::TenantRepository;
use crate::tenancy::router::HandleFactory;
use models::{domain_mapping, tenant};

pub struct SeaOrmTenantRepository {
    pub db: DatabaseConnection,
}

fn mapping_to_domain(m: domain_mapping::Model) -> DomainMapping {
    DomainMapping {
        id: m.id,
        tenant_id: m.tenant_id,
        domain: m.domain,
        is_primary: m.is_primary,
        verified_at: m.verified_at.map(|t| t.with_timezone(&Utc)),
        created_at: m.created_at.with_timezone(&Utc),
    }
}

fn tenant_to_domain(m: tenant::Model, custom_domains: Vec<String>) -> Result<Tenant, ServiceError> {
    Ok(Tenant {
        status: m.status.parse::<TenantStatus>()?,
        id: m.id,
        name: m.name,
        slug: m.slug,
        subdomain: m.subdomain,
        settings: m.settings,
        custom_domains,
    })
}

async fn verified_domains<C: ConnectionTrait>(db: &C, tenant_id: Uuid) -> Result<Vec<String>, ServiceError> {
    let rows = domain_mapping::Entity::find()
        .filter(domain_mapping::Column::TenantId.eq(tenant_id))
        .filter(domain_mapping::Column::VerifiedAt.is_not_null())
        .order_by_asc(domain_mapping::Column::Domain)
        .all(db)
        .await?;
    Ok(rows.into_iter().map(|m| m.domain).collect())
}

async fn hydrate<C: ConnectionTrait>(db: &C, m: tenant::Model) -> Result<Tenant, ServiceError> {
    let domains = verified_domains(db, m.id).await?;
    tenant_to_domain(m, domains)
}

async fn live_tenant<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<tenant::Model>, ServiceError> {
    Ok(tenant::Entity::find_by_id(id).filter(tenant::Column::DeletedAt.is_null()).one(db).await?)
}

impl SeaOrmTenantRepository {
    async fn update_tenant<F>(&self, id: Uuid, f: F) -> Result<Tenant, ServiceError>
    where
        F: FnOnce(&mut tenant::ActiveModel) + Send,
    {
        let m = live_tenant(&self.db, id).await?.ok_or_else(|| ServiceError::not_found("tenant"))?;
        let mut am: tenant::ActiveModel = m.into();
        f(&mut am);
        am.updated_at = Set(Utc::now().into());
        let m = am.update(&self.db).await?;
        hydrate(&self.db, m).await
    }
}

#[async_trait::async_trait]
impl TenantRepository for SeaOrmTenantRepository {
    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, ServiceError> {
        let res = tenant::Entity::find()
            .filter(tenant::Column::Subdomain.eq(subdomain))
            .filter(tenant::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?;
        match res {
            Some(m) => Ok(Some(hydrate(&self.db, m).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_verified_domain(&self, domain: &str) -> Result<Option<Tenant>, ServiceError> {
        let mapping = domain_mapping::Entity::find()
            .filter(domain_mapping::Column::Domain.eq(domain))
            .filter(domain_mapping::Column::VerifiedAt.is_not_null())
            .one(&self.db)
            .await?;
        let Some(mapping) = mapping else { return Ok(None) };
        match live_tenant(&self.db, mapping.tenant_id).await? {
            Some(m) => Ok(Some(hydrate(&self.db, m).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, ServiceError> {
        match live_tenant(&self.db, id).await? {
            Some(m) => Ok(Some(hydrate(&self.db, m).await?)),
            None => Ok(None),
        }
    }

    async fn update_status(&self, id: Uuid, status: TenantStatus) -> Result<Tenant, ServiceError> {
        self.update_tenant(id, |am| am.status = Set(status.as_str().to_string())).await
    }

    async fn update_settings(&self, id: Uuid, settings: serde_json::Value) -> Result<Tenant, ServiceError> {
        self.update_tenant(id, |am| am.settings = Set(settings)).await
    }

    async fn list_domains(&self, tenant_id: Uuid) -> Result<Vec<DomainMapping>, ServiceError> {
        let rows = domain_mapping::Entity::find()
            .filter(domain_mapping::Column::TenantId.eq(tenant_id))
            .order_by_asc(domain_mapping::Column::Domain)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(mapping_to_domain).collect())
    }

    async fn find_domain(&self, domain: &str) -> Result<Option<DomainMapping>, ServiceError> {
        let res = domain_mapping::Entity::find()
            .filter(domain_mapping::Column::Domain.eq(domain))
            .one(&self.db)
            .await?;
        Ok(res.map(mapping_to_domain))
    }

    async fn insert_domain(&self, tenant_id: Uuid, domain: &str) -> Result<DomainMapping, ServiceError> {
        if self.find_domain(domain).await?.is_some() {
            return Err(ServiceError::Validation(format!("domain {domain} is already mapped")));
        }
        let am = domain_mapping::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            domain: Set(domain.to_string()),
            is_primary: Set(false),
            verified_at: Set(None),
            created_at: Set(Utc::now().into()),
        };
        let m = am.insert(&self.db).await?;
        Ok(mapping_to_domain(m))
    }

    async fn mark_domain_verified(&self, domain: &str, at: DateTime<Utc>) -> Result<DomainMapping, ServiceError> {
        let m = domain_mapping::Entity::find()
            .filter(domain_mapping::Column::Domain.eq(domain))
            .one(&self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("domain mapping"))?;
        if m.verified_at.is_some() {
            return Ok(mapping_to_domain(m));
        }
        let mut am: domain_mapping::ActiveModel = m.into();
        am.verified_at = Set(Some(at.fixed_offset()));
        let m = am.update(&self.db).await?;
        Ok(mapping_to_domain(m))
    }

    async fn delete_domain(&self, domain: &str) -> Result<Option<DomainMapping>, ServiceError> {
        let Some(existing) = self.find_domain(domain).await? else { return Ok(None) };
        domain_mapping::Entity::delete_by_id(existing.id).exec(&self.db).await?;
        Ok(Some(existing))
    }

    async fn set_primary_domain(&self, tenant_id: Uuid, domain: &str) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let target = domain_mapping::Entity::find()
            .filter(domain_mapping::Column::Domain.eq(domain))
            .filter(domain_mapping::Column::TenantId.eq(tenant_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::not_found("domain mapping"))?;
        domain_mapping::Entity::update_many()
            .col_expr(domain_mapping::Column::IsPrimary, Expr::value(false))
            .filter(domain_mapping::Column::TenantId.eq(tenant_id))
            .exec(&txn)
            .await?;
        domain_mapping::Entity::update_many()
            .col_expr(domain_mapping::Column::IsPrimary, Expr::value(true))
            .filter(domain_mapping::Column::Id.eq(target.id))
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(())
    }
}

/// `<prefix><uuid without hyphens>`, e.g. `tenant_3f2a...`.
pub fn schema_name(prefix: &str, tenant_id: Uuid) -> String {
    format!("{prefix}{}", tenant_id.simple())
}

/// Tenant-scoped storage handle: a shared pool plus the tenant's schema.
///
/// Statements run through [`TenantDb::begin`] see the tenant schema first on
/// the search path, then `public` for the global tables.
pub struct TenantDb {
    tenant_id: Uuid,
    schema: String,
    db: DatabaseConnection,
}

impl TenantDb {
    pub fn new(tenant_id: Uuid, schema: String, db: DatabaseConnection) -> Self { Self { tenant_id, schema, db } }

    pub fn tenant_id(&self) -> Uuid { self.tenant_id }

    pub fn schema(&self) -> &str { &self.schema }

    pub fn connection(&self) -> &DatabaseConnection { &self.db }

    pub async fn begin(&self) -> Result<DatabaseTransaction, ServiceError> {
        let txn = self.db.begin().await?;
        txn.execute_unprepared(&format!("SET LOCAL search_path TO \"{}\", public", self.schema)).await?;
        Ok(txn)
    }
}

/// Creates one schema per tenant on first use and hands out [`TenantDb`]s
/// sharing the global pool.
pub struct SchemaHandleFactory {
    pub db: DatabaseConnection,
    pub prefix: String,
}

#[async_trait::async_trait]
impl HandleFactory<TenantDb> for SchemaHandleFactory {
    async fn create(&self, tenant_id: Uuid) -> Result<TenantDb, ServiceError> {
        let schema = schema_name(&self.prefix, tenant_id);
        self.db
            .execute_unprepared(&format!("CREATE SCHEMA IF NOT EXISTS \"{schema}\""))
            .await?;
        debug!(tenant_id = %tenant_id, schema = %schema, "tenant_schema_ready");
        Ok(TenantDb::new(tenant_id, schema, self.db.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_names_are_stable_identifiers() {
        let id = Uuid::parse_str("3f2a9c1e-0000-4000-8000-00000000abcd").unwrap();
        assert_eq!(schema_name("tenant_", id), "tenant_3f2a9c1e00004000800000000000abcd");
        assert!(schema_name("t_", id).chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }
}
