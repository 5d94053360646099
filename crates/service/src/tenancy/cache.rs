use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use moka::future::Cache;
use uuid::Uuid;

use super::domain::Tenant;
use crate::errors::ServiceError;

/// Cache key namespace for tenant lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Subdomain(String),
    Domain(String),
}

impl CacheKey {
    pub fn render(&self) -> String {
        match self {
            CacheKey::Subdomain(v) => format!("tenant:subdomain:{v}"),
            CacheKey::Domain(v) => format!("tenant:domain:{v}"),
        }
    }
}

/// Tenant lookup cache. Implementations may fail; callers treat failures as
/// misses.
#[async_trait]
pub trait TenantCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Tenant>, ServiceError>;
    async fn put(&self, key: &str, tenant: &Tenant) -> Result<(), ServiceError>;
    async fn evict_key(&self, key: &str) -> Result<(), ServiceError>;
    /// Evict every key written for this tenant.
    async fn evict_tenant(&self, tenant_id: Uuid) -> Result<(), ServiceError>;
}

/// In-process cache with a TTL and a tenant → keys index for invalidation.
pub struct MokaTenantCache {
    entries: Cache<String, Tenant>,
    keys_by_tenant: DashMap<Uuid, HashSet<String>>,
}

impl MokaTenantCache {
    pub fn new(ttl: Duration, capacity: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(capacity).time_to_live(ttl).build(),
            keys_by_tenant: DashMap::new(),
        }
    }
}

#[async_trait]
impl TenantCache for MokaTenantCache {
    async fn get(&self, key: &str) -> Result<Option<Tenant>, ServiceError> {
        Ok(self.entries.get(key).await)
    }

    async fn put(&self, key: &str, tenant: &Tenant) -> Result<(), ServiceError> {
        // entry first, then index: a racing evict_tenant cannot orphan the key
        self.entries.insert(key.to_string(), tenant.clone()).await;
        self.keys_by_tenant.entry(tenant.id).or_default().insert(key.to_string());
        Ok(())
    }

    async fn evict_key(&self, key: &str) -> Result<(), ServiceError> {
        self.entries.invalidate(key).await;
        Ok(())
    }

    async fn evict_tenant(&self, tenant_id: Uuid) -> Result<(), ServiceError> {
        // no DashMap guard across .await
        let keys = self.keys_by_tenant.remove(&tenant_id).map(|(_, keys)| keys).unwrap_or_default();
        for key in keys {
            self.entries.invalidate(&key).await;
        }
        Ok(())
    }
}

pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Wraps a working cache and can be switched to fail every call.
    pub struct FlakyCache {
        inner: MokaTenantCache,
        down: AtomicBool,
    }

    impl Default for FlakyCache {
        fn default() -> Self {
            Self { inner: MokaTenantCache::new(Duration::from_secs(900), 1_000), down: AtomicBool::new(false) }
        }
    }

    impl FlakyCache {
        pub fn set_down(&self, down: bool) { self.down.store(down, Ordering::SeqCst) }

        fn check(&self) -> Result<(), ServiceError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(ServiceError::Cache("cache unavailable".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl TenantCache for FlakyCache {
        async fn get(&self, key: &str) -> Result<Option<Tenant>, ServiceError> {
            self.check()?;
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, tenant: &Tenant) -> Result<(), ServiceError> {
            self.check()?;
            self.inner.put(key, tenant).await
        }

        async fn evict_key(&self, key: &str) -> Result<(), ServiceError> {
            self.check()?;
            self.inner.evict_key(key).await
        }

        async fn evict_tenant(&self, tenant_id: Uuid) -> Result<(), ServiceError> {
            self.check()?;
            self.inner.evict_tenant(tenant_id).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::domain::TenantStatus;

    fn tenant(subdomain: &str) -> Tenant {
        Tenant {
            id: Uuid::new_v4(),
            name: subdomain.to_uppercase(),
            slug: subdomain.into(),
            subdomain: subdomain.into(),
            status: TenantStatus::Active,
            settings: serde_json::json!({}),
            custom_domains: vec![],
        }
    }

    #[test]
    fn key_namespace() {
        assert_eq!(CacheKey::Subdomain("acme".into()).render(), "tenant:subdomain:acme");
        assert_eq!(CacheKey::Domain("shop.acme.com".into()).render(), "tenant:domain:shop.acme.com");
    }

    #[tokio::test]
    async fn evict_tenant_drops_all_its_keys() {
        let cache = MokaTenantCache::new(Duration::from_secs(60), 100);
        let (a, b) = (tenant("acme"), tenant("globex"));
        cache.put("tenant:subdomain:acme", &a).await.unwrap();
        cache.put("tenant:domain:acme.com", &a).await.unwrap();
        cache.put("tenant:subdomain:globex", &b).await.unwrap();

        cache.evict_tenant(a.id).await.unwrap();
        assert!(cache.get("tenant:subdomain:acme").await.unwrap().is_none());
        assert!(cache.get("tenant:domain:acme.com").await.unwrap().is_none());
        assert_eq!(cache.get("tenant:subdomain:globex").await.unwrap(), Some(b));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_puts_and_evictions_leave_no_unindexed_entry() {
        let cache = std::sync::Arc::new(MokaTenantCache::new(Duration::from_secs(60), 10_000));
        let a = tenant("acme");
        let id = a.id;
        let mut tasks = Vec::new();
        for i in 0..500 {
            let (c, t) = (cache.clone(), a.clone());
            tasks.push(tokio::spawn(async move { c.put(&format!("tenant:domain:d{i}.acme.com"), &t).await }));
            let c = cache.clone();
            tasks.push(tokio::spawn(async move { c.evict_tenant(id).await }));
        }
        for t in tasks {
            t.await.unwrap().unwrap();
        }
        cache.evict_tenant(a.id).await.unwrap();
        for i in 0..500 {
            assert!(cache.get(&format!("tenant:domain:d{i}.acme.com")).await.unwrap().is_none(), "d{i} survived");
        }
    }

    #[tokio::test]
    async fn entries_expire() {
        let cache = MokaTenantCache::new(Duration::from_millis(50), 100);
        let a = tenant("acme");
        cache.put("tenant:subdomain:acme", &a).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get("tenant:subdomain:acme").await.unwrap().is_none());
    }
}
