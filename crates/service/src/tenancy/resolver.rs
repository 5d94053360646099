use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::cache::{CacheKey, TenantCache};
use super::domain::Tenant;
use super::host::{HostRules, HostTarget};
use super::repository::TenantRepository;
use crate::deadline::bounded;
use crate::errors::ServiceError;
use crate::observability::{
    RESOLUTION_FAILURES_TOTAL, TENANT_CACHE_ERRORS_TOTAL, TENANT_CACHE_HITS_TOTAL, TENANT_CACHE_MISSES_TOTAL,
};

#[derive(Clone, Debug)]
pub struct ResolverConfig {
    pub platform_domain: String,
    pub dev_base_domains: Vec<String>,
    pub reserved_prefixes: Vec<String>,
    pub lookup_timeout: Duration,
}

/// Outcome of resolving a host that may legitimately be platform traffic.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    System,
    Tenant(Tenant),
}

/// Maps a request host to an active tenant through a cache in front of
/// storage. Misses are never cached.
pub struct TenantResolver {
    repo: Arc<dyn TenantRepository>,
    cache: Arc<dyn TenantCache>,
    rules: HostRules,
    timeout: Duration,
    /// Bumped on every invalidation; a lookup that straddles a bump drops
    /// what it cached.
    epoch: AtomicU64,
}

impl TenantResolver {
    pub fn new(repo: Arc<dyn TenantRepository>, cache: Arc<dyn TenantCache>, cfg: ResolverConfig) -> Self {
        Self {
            rules: HostRules::new(&cfg.platform_domain, &cfg.dev_base_domains, &cfg.reserved_prefixes),
            repo,
            cache,
            timeout: cfg.lookup_timeout,
            epoch: AtomicU64::new(0),
        }
    }

    pub fn classify_host(&self, host: &str) -> Result<HostTarget, ServiceError> { self.rules.classify(host) }

    /// Resolve a host that must name a tenant.
    pub async fn resolve(&self, host: &str) -> Result<Tenant, ServiceError> {
        match self.resolve_host(host).await? {
            Resolved::Tenant(t) => Ok(t),
            Resolved::System => Err(ServiceError::NotFound(format!("host {host} does not name a tenant"))),
        }
    }

    /// Resolve a host, allowing platform traffic through as `System`.
    ///
    /// # Examples
    /// ```
    /// use service::tenancy::{TenantResolver, ResolverConfig, Resolved, TenantStatus};
    /// use service::tenancy::{cache::MokaTenantCache, repository::mock::MockTenantRepository};
    /// use std::{sync::Arc, time::Duration};
    /// let repo = Arc::new(MockTenantRepository::default());
    /// let acme = repo.insert_tenant("Acme", "acme", TenantStatus::Active);
    /// let cfg = ResolverConfig {
    ///     platform_domain: "example.com".into(),
    ///     dev_base_domains: vec!["localhost".into()],
    ///     reserved_prefixes: vec!["www".into(), "api".into()],
    ///     lookup_timeout: Duration::from_secs(1),
    /// };
    /// let cache = Arc::new(MokaTenantCache::new(Duration::from_secs(60), 100));
    /// let resolver = TenantResolver::new(repo, cache, cfg);
    /// let got = tokio_test::block_on(resolver.resolve_host("acme.example.com")).unwrap();
    /// assert_eq!(got, Resolved::Tenant(acme));
    /// assert_eq!(tokio_test::block_on(resolver.resolve_host("www.example.com")).unwrap(), Resolved::System);
    /// ```
    #[instrument(skip(self))]
    pub async fn resolve_host(&self, host: &str) -> Result<Resolved, ServiceError> {
        let found = match self.rules.classify(host)? {
            HostTarget::System => return Ok(Resolved::System),
            HostTarget::Subdomain { label, host } => {
                let by_label = if models::tenant::validate_slug(&label).is_ok() {
                    self.lookup(CacheKey::Subdomain(label)).await?
                } else {
                    None
                };
                match by_label {
                    Some(t) => Some(t),
                    None => self.lookup(CacheKey::Domain(host)).await?,
                }
            }
            HostTarget::Domain(domain) => self.lookup(CacheKey::Domain(domain)).await?,
        };
        let tenant = found.ok_or_else(|| {
            RESOLUTION_FAILURES_TOTAL.inc();
            debug!("tenant_not_found");
            ServiceError::not_found("tenant")
        })?;
        Self::ensure_active(tenant).map(Resolved::Tenant)
    }

    pub async fn resolve_subdomain(&self, subdomain: &str) -> Result<Tenant, ServiceError> {
        let subdomain = subdomain.trim().to_ascii_lowercase();
        models::tenant::validate_slug(&subdomain)?;
        let tenant = self.lookup(CacheKey::Subdomain(subdomain)).await?.ok_or_else(|| ServiceError::not_found("tenant"))?;
        Self::ensure_active(tenant)
    }

    pub async fn resolve_domain(&self, domain: &str) -> Result<Tenant, ServiceError> {
        let domain = super::domain::normalize_domain(domain)?;
        let tenant = self.lookup(CacheKey::Domain(domain)).await?.ok_or_else(|| ServiceError::not_found("tenant"))?;
        Self::ensure_active(tenant)
    }

    fn ensure_active(tenant: Tenant) -> Result<Tenant, ServiceError> {
        if tenant.is_active() {
            return Ok(tenant);
        }
        RESOLUTION_FAILURES_TOTAL.inc();
        debug!(tenant_id = %tenant.id, status = %tenant.status, "tenant_not_active");
        Err(ServiceError::InvalidState(format!("tenant {} is {}", tenant.slug, tenant.status)))
    }

    async fn lookup(&self, key: CacheKey) -> Result<Option<Tenant>, ServiceError> {
        let rendered = key.render();
        match bounded(self.timeout, "tenant cache get", self.cache.get(&rendered)).await {
            Ok(Some(t)) => {
                TENANT_CACHE_HITS_TOTAL.inc();
                return Ok(Some(t));
            }
            Ok(None) => TENANT_CACHE_MISSES_TOTAL.inc(),
            Err(e) => {
                TENANT_CACHE_ERRORS_TOTAL.inc();
                warn!(key = %rendered, error = %e, "tenant_cache_unavailable");
            }
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        let found = match &key {
            CacheKey::Subdomain(v) => {
                bounded(self.timeout, "lookup tenant by subdomain", self.repo.find_by_subdomain(v)).await?
            }
            CacheKey::Domain(v) => {
                bounded(self.timeout, "lookup tenant by domain", self.repo.find_by_verified_domain(v)).await?
            }
        };

        if let Some(t) = &found {
            if let Err(e) = bounded(self.timeout, "tenant cache put", self.cache.put(&rendered, t)).await {
                TENANT_CACHE_ERRORS_TOTAL.inc();
                warn!(key = %rendered, error = %e, "tenant_cache_write_failed");
            } else if self.epoch.load(Ordering::SeqCst) != epoch {
                // an invalidation ran while we were reading storage
                if let Err(e) = bounded(self.timeout, "tenant cache evict", self.cache.evict_key(&rendered)).await {
                    warn!(key = %rendered, error = %e, "tenant_cache_evict_failed");
                }
            }
        }
        Ok(found)
    }

    /// Evict every cached entry for the tenant. Called after any mutation
    /// that changes how the tenant resolves.
    #[instrument(skip(self))]
    pub async fn invalidate(&self, tenant_id: Uuid) -> Result<(), ServiceError> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        bounded(self.timeout, "tenant cache invalidate", self.cache.evict_tenant(tenant_id))
            .await
            .inspect_err(|e| warn!(error = %e, "tenant_cache_invalidation_failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::cache::mock::FlakyCache;
    use crate::tenancy::cache::MokaTenantCache;
    use crate::tenancy::domain::TenantStatus;
    use crate::tenancy::repository::mock::MockTenantRepository;

    fn config() -> ResolverConfig {
        ResolverConfig {
            platform_domain: "example.com".into(),
            dev_base_domains: vec!["localhost".into()],
            reserved_prefixes: vec!["www".into(), "api".into()],
            lookup_timeout: Duration::from_millis(200),
        }
    }

    fn resolver(repo: Arc<MockTenantRepository>) -> TenantResolver {
        TenantResolver::new(repo, Arc::new(MokaTenantCache::new(Duration::from_secs(60), 100)), config())
    }

    #[tokio::test]
    async fn active_resolves_inactive_is_invalid_state() {
        let repo = Arc::new(MockTenantRepository::default());
        let acme = repo.insert_tenant("Acme", "acme", TenantStatus::Active);
        repo.insert_tenant("Dormant", "dormant", TenantStatus::Inactive);
        repo.insert_tenant("Naughty", "naughty", TenantStatus::Suspended);
        let r = resolver(repo);

        assert_eq!(r.resolve("acme.example.com").await.unwrap(), acme);
        assert_eq!(r.resolve("acme.localhost:3000").await.unwrap(), acme);
        for host in ["dormant.example.com", "naughty.example.com"] {
            assert!(matches!(r.resolve(host).await, Err(ServiceError::InvalidState(_))), "{host}");
        }
    }

    #[tokio::test]
    async fn cache_hit_skips_storage() {
        let repo = Arc::new(MockTenantRepository::default());
        repo.insert_tenant("Acme", "acme", TenantStatus::Active);
        let r = resolver(repo.clone());
        r.resolve("acme.example.com").await.unwrap();
        r.resolve("acme.example.com").await.unwrap();
        r.resolve("ACME.example.com:443").await.unwrap();
        assert_eq!(repo.lookups(), 1);
    }

    #[tokio::test]
    async fn unknown_hosts_are_not_negatively_cached() {
        let repo = Arc::new(MockTenantRepository::default());
        let r = resolver(repo.clone());
        assert!(matches!(r.resolve("later.example.com").await, Err(ServiceError::NotFound(_))));
        assert!(matches!(r.resolve("nobody.com").await, Err(ServiceError::NotFound(_))));

        let later = repo.insert_tenant("Later", "later", TenantStatus::Active);
        assert_eq!(r.resolve("later.example.com").await.unwrap(), later);
    }

    #[tokio::test]
    async fn suspension_is_visible_on_next_resolve() {
        let repo = Arc::new(MockTenantRepository::default());
        let acme = repo.insert_tenant("Acme", "acme", TenantStatus::Active);
        let r = resolver(repo.clone());
        r.resolve("acme.example.com").await.unwrap();

        repo.update_status(acme.id, TenantStatus::Suspended).await.unwrap();
        r.invalidate(acme.id).await.unwrap();
        assert!(matches!(r.resolve("acme.example.com").await, Err(ServiceError::InvalidState(_))));
    }

    #[tokio::test]
    async fn custom_domains_need_verification() {
        let repo = Arc::new(MockTenantRepository::default());
        let acme = repo.insert_tenant("Acme", "acme", TenantStatus::Active);
        repo.insert_domain(acme.id, "acme.com").await.unwrap();
        repo.insert_domain(acme.id, "shop.acme.com").await.unwrap();
        let r = resolver(repo.clone());

        assert!(matches!(r.resolve("acme.com").await, Err(ServiceError::NotFound(_))));
        repo.mark_domain_verified("acme.com", chrono::Utc::now()).await.unwrap();
        repo.mark_domain_verified("shop.acme.com", chrono::Utc::now()).await.unwrap();
        assert_eq!(r.resolve("acme.com").await.unwrap().id, acme.id);
        assert_eq!(r.resolve("www.acme.com").await.map(|t| t.id).ok(), None);
        // subdomain miss falls back to the full host
        assert_eq!(r.resolve("shop.acme.com").await.unwrap().id, acme.id);
    }

    #[tokio::test]
    async fn platform_hosts_are_system() {
        let r = resolver(Arc::new(MockTenantRepository::default()));
        for host in ["example.com", "www.example.com", "api.example.com", "localhost:8080", "10.0.0.7"] {
            assert_eq!(r.resolve_host(host).await.unwrap(), Resolved::System, "{host}");
        }
        assert!(matches!(r.resolve("www.example.com").await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn invalid_labels_skip_the_subdomain_lookup() {
        let repo = Arc::new(MockTenantRepository::default());
        let r = resolver(repo.clone());
        assert!(r.resolve("a1.example.com").await.is_err());
        // only the domain fallback ran
        assert_eq!(repo.lookups(), 1);
    }

    #[tokio::test]
    async fn cache_failure_degrades_to_storage() {
        let repo = Arc::new(MockTenantRepository::default());
        let acme = repo.insert_tenant("Acme", "acme", TenantStatus::Active);
        let cache = Arc::new(FlakyCache::default());
        cache.set_down(true);
        let r = TenantResolver::new(repo.clone(), cache.clone(), config());

        assert_eq!(r.resolve("acme.example.com").await.unwrap(), acme);
        assert_eq!(r.resolve("acme.example.com").await.unwrap(), acme);
        assert_eq!(repo.lookups(), 2);

        cache.set_down(false);
        r.resolve("acme.example.com").await.unwrap();
        r.resolve("acme.example.com").await.unwrap();
        assert_eq!(repo.lookups(), 3);
    }

    #[tokio::test]
    async fn storage_failures_surface_with_context() {
        let repo = Arc::new(MockTenantRepository::default());
        repo.set_failing(true);
        let r = resolver(repo);
        let err = r.resolve("acme.example.com").await.unwrap_err();
        assert!(err.to_string().contains("lookup tenant by subdomain"), "{err}");
    }

    #[tokio::test]
    async fn slow_storage_times_out() {
        let repo = Arc::new(MockTenantRepository::default());
        repo.insert_tenant("Acme", "acme", TenantStatus::Active);
        repo.set_delay(Some(Duration::from_secs(2)));
        let r = resolver(repo);
        assert!(matches!(r.resolve("acme.example.com").await, Err(ServiceError::Timeout(_))));
    }

    #[tokio::test]
    async fn lookup_straddling_invalidation_does_not_leave_stale_entry() {
        let repo = Arc::new(MockTenantRepository::default());
        let acme = repo.insert_tenant("Acme", "acme", TenantStatus::Active);
        repo.set_delay(Some(Duration::from_millis(100)));
        let r = Arc::new(resolver(repo.clone()));

        let slow = {
            let r = r.clone();
            tokio::spawn(async move { r.resolve("acme.example.com").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        repo.update_status(acme.id, TenantStatus::Suspended).await.unwrap();
        r.invalidate(acme.id).await.unwrap();
        let _ = slow.await.unwrap();

        repo.set_delay(None);
        assert!(matches!(r.resolve("acme.example.com").await, Err(ServiceError::InvalidState(_))));
    }
}
