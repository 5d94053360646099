use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::deadline::bounded;
use crate::errors::ServiceError;
use crate::observability::{HANDLES_CREATED_TOTAL, HANDLES_EVICTED_TOTAL};

/// Builds and tears down tenant-scoped storage handles.
#[async_trait]
pub trait HandleFactory<H: Send + Sync + 'static>: Send + Sync {
    /// One-time side effects (schema creation) belong here.
    async fn create(&self, tenant_id: Uuid) -> Result<H, ServiceError>;

    /// Called once for a handle dropped from the router.
    async fn close(&self, tenant_id: Uuid, handle: Arc<H>) {
        debug!(tenant_id = %tenant_id, refs = Arc::strong_count(&handle), "tenant_handle_closed");
    }
}

struct Slot<H> {
    handle: Arc<H>,
    last_used: AtomicU64,
}

/// Lazily creates one handle per tenant and hands out shared references.
///
/// Lookups take the read lock. A miss takes the write lock, checks again
/// and only then constructs, so concurrent first requests for a tenant run
/// the factory once. With `max_handles` set, inserting past the bound
/// evicts the least recently used handle and closes it.
pub struct ConnectionRouter<H: Send + Sync + 'static> {
    factory: Arc<dyn HandleFactory<H>>,
    slots: RwLock<HashMap<Uuid, Slot<H>>>,
    clock: AtomicU64,
    max_handles: Option<usize>,
    timeout: Duration,
}

impl<H: Send + Sync + 'static> ConnectionRouter<H> {
    pub fn new(factory: Arc<dyn HandleFactory<H>>, max_handles: Option<usize>, timeout: Duration) -> Self {
        Self {
            factory,
            slots: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(0),
            max_handles: max_handles.filter(|&n| n > 0),
            timeout,
        }
    }

    fn tick(&self) -> u64 { self.clock.fetch_add(1, Ordering::Relaxed) + 1 }

    pub async fn get_handle(&self, tenant_id: Uuid) -> Result<Arc<H>, ServiceError> {
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(&tenant_id) {
                slot.last_used.store(self.tick(), Ordering::Relaxed);
                return Ok(slot.handle.clone());
            }
        }

        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.get(&tenant_id) {
            slot.last_used.store(self.tick(), Ordering::Relaxed);
            return Ok(slot.handle.clone());
        }

        let handle = Arc::new(bounded(self.timeout, "create tenant handle", self.factory.create(tenant_id)).await?);
        let evicted = match self.max_handles {
            Some(max) if slots.len() >= max => {
                let lru = slots
                    .iter()
                    .min_by_key(|(_, s)| s.last_used.load(Ordering::Relaxed))
                    .map(|(id, _)| *id);
                lru.and_then(|id| slots.remove(&id).map(|s| (id, s.handle)))
            }
            _ => None,
        };
        slots.insert(tenant_id, Slot { handle: handle.clone(), last_used: AtomicU64::new(self.tick()) });
        drop(slots);

        HANDLES_CREATED_TOTAL.inc();
        info!(tenant_id = %tenant_id, "tenant_handle_created");
        if let Some((id, old)) = evicted {
            HANDLES_EVICTED_TOTAL.inc();
            info!(tenant_id = %id, "tenant_handle_evicted");
            self.factory.close(id, old).await;
        }
        Ok(handle)
    }

    /// Drop and close a tenant's handle, e.g. after the tenant is retired.
    pub async fn evict(&self, tenant_id: Uuid) -> bool {
        let removed = self.slots.write().await.remove(&tenant_id);
        match removed {
            Some(slot) => {
                HANDLES_EVICTED_TOTAL.inc();
                self.factory.close(tenant_id, slot.handle).await;
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize { self.slots.read().await.len() }

    pub async fn is_empty(&self) -> bool { self.slots.read().await.is_empty() }

    pub async fn contains(&self, tenant_id: Uuid) -> bool { self.slots.read().await.contains_key(&tenant_id) }
}
