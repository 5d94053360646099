use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::domain::{DomainMapping, Tenant, TenantStatus};
use crate::errors::ServiceError;

/// Tenant and domain-mapping storage. Soft-deleted tenants are invisible.
#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, ServiceError>;
    /// Only verified mappings resolve.
    async fn find_by_verified_domain(&self, domain: &str) -> Result<Option<Tenant>, ServiceError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, ServiceError>;

    async fn update_status(&self, id: Uuid, status: TenantStatus) -> Result<Tenant, ServiceError>;
    async fn update_settings(&self, id: Uuid, settings: serde_json::Value) -> Result<Tenant, ServiceError>;

    async fn list_domains(&self, tenant_id: Uuid) -> Result<Vec<DomainMapping>, ServiceError>;
    async fn find_domain(&self, domain: &str) -> Result<Option<DomainMapping>, ServiceError>;
    /// Fails with Validation when the domain is already mapped.
    async fn insert_domain(&self, tenant_id: Uuid, domain: &str) -> Result<DomainMapping, ServiceError>;
    async fn mark_domain_verified(&self, domain: &str, at: DateTime<Utc>) -> Result<DomainMapping, ServiceError>;
    async fn delete_domain(&self, domain: &str) -> Result<Option<DomainMapping>, ServiceError>;
    /// Flag `domain` primary and clear the flag on the tenant's other mappings, atomically.
    async fn set_primary_domain(&self, tenant_id: Uuid, domain: &str) -> Result<(), ServiceError>;
}

/// Simple in-memory mock repository for tests and doc examples
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct State {
        tenants: HashMap<Uuid, (Tenant, bool)>, // (tenant, soft-deleted)
        domains: HashMap<String, DomainMapping>,
    }

    impl State {
        fn hydrate(&self, tenant: &Tenant) -> Tenant {
            let mut t = tenant.clone();
            t.custom_domains = self
                .domains
                .values()
                .filter(|d| d.tenant_id == t.id && d.is_verified())
                .map(|d| d.domain.clone())
                .collect();
            t.custom_domains.sort();
            t
        }

        fn live(&self, id: Uuid) -> Option<Tenant> {
            self.tenants.get(&id).filter(|(_, deleted)| !deleted).map(|(t, _)| self.hydrate(t))
        }
    }

    /// Counts storage lookups and can be slowed down or broken on demand.
    #[derive(Default)]
    pub struct MockTenantRepository {
        state: Mutex<State>,
        lookups: AtomicUsize,
        delay: Mutex<Option<Duration>>,
        failing: AtomicBool,
    }

    impl MockTenantRepository {
        pub fn insert_tenant(&self, name: &str, subdomain: &str, status: TenantStatus) -> Tenant {
            let t = Tenant {
                id: Uuid::new_v4(),
                name: name.to_string(),
                slug: subdomain.to_string(),
                subdomain: subdomain.to_string(),
                status,
                settings: serde_json::json!({}),
                custom_domains: Vec::new(),
            };
            self.state.lock().unwrap().tenants.insert(t.id, (t.clone(), false));
            t
        }

        pub fn soft_delete(&self, id: Uuid) {
            if let Some(entry) = self.state.lock().unwrap().tenants.get_mut(&id) {
                entry.1 = true;
            }
        }

        /// Number of lookup queries served so far.
        pub fn lookups(&self) -> usize { self.lookups.load(Ordering::SeqCst) }

        pub fn set_delay(&self, delay: Option<Duration>) { *self.delay.lock().unwrap() = delay; }

        pub fn set_failing(&self, failing: bool) { self.failing.store(failing, Ordering::SeqCst) }

        /// Rows are read before the delay, like a query whose snapshot
        /// predates a concurrent write.
        async fn lookup_gate(&self) -> Result<(), ServiceError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock().unwrap();
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(ServiceError::Db("connection refused".into()));
            }
            Ok(())
        }

        fn update<F>(&self, id: Uuid, f: F) -> Result<Tenant, ServiceError>
        where
            F: FnOnce(&mut Tenant),
        {
            let mut st = self.state.lock().unwrap();
            let (t, _) = st
                .tenants
                .get_mut(&id)
                .filter(|(_, deleted)| !deleted)
                .ok_or_else(|| ServiceError::not_found("tenant"))?;
            f(t);
            let t = t.clone();
            Ok(st.hydrate(&t))
        }
    }

    #[async_trait]
    impl TenantRepository for MockTenantRepository {
        async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, ServiceError> {
            let found = {
                let st = self.state.lock().unwrap();
                let id = st.tenants.values().find(|(t, d)| !d && t.subdomain == subdomain).map(|(t, _)| t.id);
                id.and_then(|id| st.live(id))
            };
            self.lookup_gate().await?;
            Ok(found)
        }

        async fn find_by_verified_domain(&self, domain: &str) -> Result<Option<Tenant>, ServiceError> {
            let found = {
                let st = self.state.lock().unwrap();
                st.domains.get(domain).filter(|d| d.is_verified()).and_then(|d| st.live(d.tenant_id))
            };
            self.lookup_gate().await?;
            Ok(found)
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, ServiceError> {
            let found = self.state.lock().unwrap().live(id);
            self.lookup_gate().await?;
            Ok(found)
        }

        async fn update_status(&self, id: Uuid, status: TenantStatus) -> Result<Tenant, ServiceError> {
            self.update(id, |t| t.status = status)
        }

        async fn update_settings(&self, id: Uuid, settings: serde_json::Value) -> Result<Tenant, ServiceError> {
            self.update(id, |t| t.settings = settings)
        }

        async fn list_domains(&self, tenant_id: Uuid) -> Result<Vec<DomainMapping>, ServiceError> {
            let st = self.state.lock().unwrap();
            let mut out: Vec<_> = st.domains.values().filter(|d| d.tenant_id == tenant_id).cloned().collect();
            out.sort_by(|a, b| a.domain.cmp(&b.domain));
            Ok(out)
        }

        async fn find_domain(&self, domain: &str) -> Result<Option<DomainMapping>, ServiceError> {
            Ok(self.state.lock().unwrap().domains.get(domain).cloned())
        }

        async fn insert_domain(&self, tenant_id: Uuid, domain: &str) -> Result<DomainMapping, ServiceError> {
            let mut st = self.state.lock().unwrap();
            if st.domains.contains_key(domain) {
                return Err(ServiceError::Validation(format!("domain {domain} is already mapped")));
            }
            let m = DomainMapping {
                id: Uuid::new_v4(),
                tenant_id,
                domain: domain.to_string(),
                is_primary: false,
                verified_at: None,
                created_at: Utc::now(),
            };
            st.domains.insert(m.domain.clone(), m.clone());
            Ok(m)
        }

        async fn mark_domain_verified(&self, domain: &str, at: DateTime<Utc>) -> Result<DomainMapping, ServiceError> {
            let mut st = self.state.lock().unwrap();
            let m = st.domains.get_mut(domain).ok_or_else(|| ServiceError::not_found("domain mapping"))?;
            m.verified_at.get_or_insert(at);
            Ok(m.clone())
        }

        async fn delete_domain(&self, domain: &str) -> Result<Option<DomainMapping>, ServiceError> {
            Ok(self.state.lock().unwrap().domains.remove(domain))
        }

        async fn set_primary_domain(&self, tenant_id: Uuid, domain: &str) -> Result<(), ServiceError> {
            let mut st = self.state.lock().unwrap();
            match st.domains.get(domain) {
                Some(m) if m.tenant_id == tenant_id => {}
                _ => return Err(ServiceError::not_found("domain mapping")),
            }
            for m in st.domains.values_mut().filter(|m| m.tenant_id == tenant_id) {
                m.is_primary = m.domain == domain;
            }
            Ok(())
        }
    }
}
