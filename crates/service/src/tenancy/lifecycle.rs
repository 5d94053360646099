use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::domain::{normalize_domain, DomainMapping, Tenant, TenantStatus};
use super::repository::TenantRepository;
use super::resolver::TenantResolver;
use crate::deadline::bounded;
use crate::errors::ServiceError;

/// Tenant mutations that change resolution. Every successful write is
/// followed by a cache invalidation for the tenant before returning.
pub struct TenantLifecycle {
    repo: Arc<dyn TenantRepository>,
    resolver: Arc<TenantResolver>,
    timeout: Duration,
}

impl TenantLifecycle {
    pub fn new(repo: Arc<dyn TenantRepository>, resolver: Arc<TenantResolver>, timeout: Duration) -> Self {
        Self { repo, resolver, timeout }
    }

    pub async fn get(&self, tenant_id: Uuid) -> Result<Tenant, ServiceError> {
        bounded(self.timeout, "lookup tenant by id", self.repo.find_by_id(tenant_id))
            .await?
            .ok_or_else(|| ServiceError::not_found("tenant"))
    }

    async fn owned_mapping(&self, tenant_id: Uuid, domain: &str) -> Result<DomainMapping, ServiceError> {
        let domain = normalize_domain(domain)?;
        bounded(self.timeout, "lookup domain mapping", self.repo.find_domain(&domain))
            .await?
            .filter(|m| m.tenant_id == tenant_id)
            .ok_or_else(|| ServiceError::not_found("domain mapping"))
    }

    #[instrument(skip(self))]
    pub async fn set_status(&self, tenant_id: Uuid, status: TenantStatus) -> Result<Tenant, ServiceError> {
        let tenant = bounded(self.timeout, "update tenant status", self.repo.update_status(tenant_id, status)).await?;
        self.resolver.invalidate(tenant_id).await?;
        info!(slug = %tenant.slug, status = %status, "tenant_status_changed");
        Ok(tenant)
    }

    #[instrument(skip(self, settings))]
    pub async fn update_settings(&self, tenant_id: Uuid, settings: serde_json::Value) -> Result<Tenant, ServiceError> {
        if !settings.is_object() {
            return Err(ServiceError::Validation("settings must be a JSON object".into()));
        }
        let tenant = bounded(self.timeout, "update tenant settings", self.repo.update_settings(tenant_id, settings)).await?;
        self.resolver.invalidate(tenant_id).await?;
        Ok(tenant)
    }

    pub async fn list_domains(&self, tenant_id: Uuid) -> Result<Vec<DomainMapping>, ServiceError> {
        bounded(self.timeout, "list domain mappings", self.repo.list_domains(tenant_id)).await
    }

    /// Register a custom domain in the pending state.
    #[instrument(skip(self))]
    pub async fn add_domain_mapping(&self, tenant_id: Uuid, domain: &str, primary: bool) -> Result<DomainMapping, ServiceError> {
        let domain = normalize_domain(domain)?;
        self.get(tenant_id).await?;
        let mut mapping = bounded(self.timeout, "insert domain mapping", self.repo.insert_domain(tenant_id, &domain)).await?;
        if primary {
            bounded(self.timeout, "set primary domain", self.repo.set_primary_domain(tenant_id, &domain)).await?;
            mapping.is_primary = true;
        }
        self.resolver.invalidate(tenant_id).await?;
        info!(domain = %domain, "domain_mapping_added");
        Ok(mapping)
    }

    /// Pending → Verified. Verifying twice keeps the first timestamp.
    #[instrument(skip(self))]
    pub async fn verify_domain(&self, tenant_id: Uuid, domain: &str) -> Result<DomainMapping, ServiceError> {
        let mapping = self.owned_mapping(tenant_id, domain).await?;
        let mapping = bounded(self.timeout, "verify domain mapping", self.repo.mark_domain_verified(&mapping.domain, Utc::now())).await?;
        self.resolver.invalidate(tenant_id).await?;
        info!(domain = %mapping.domain, "domain_mapping_verified");
        Ok(mapping)
    }

    #[instrument(skip(self))]
    pub async fn remove_domain_mapping(&self, tenant_id: Uuid, domain: &str) -> Result<(), ServiceError> {
        let mapping = self.owned_mapping(tenant_id, domain).await?;
        bounded(self.timeout, "delete domain mapping", self.repo.delete_domain(&mapping.domain)).await?;
        self.resolver.invalidate(tenant_id).await?;
        info!(domain = %mapping.domain, "domain_mapping_removed");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn set_primary_domain(&self, tenant_id: Uuid, domain: &str) -> Result<(), ServiceError> {
        let mapping = self.owned_mapping(tenant_id, domain).await?;
        bounded(self.timeout, "set primary domain", self.repo.set_primary_domain(tenant_id, &mapping.domain)).await?;
        self.resolver.invalidate(tenant_id).await?;
        Ok(())
    }
}
