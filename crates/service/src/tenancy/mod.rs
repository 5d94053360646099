//! Tenant resolution from the request host, tenant lifecycle mutations
//! with cache invalidation, and per-tenant storage handle routing.

pub mod cache;
pub mod domain;
pub mod host;
pub mod lifecycle;
pub mod repository;
pub mod resolver;
pub mod router;
pub mod repo;

pub use domain::{DomainMapping, Tenant, TenantStatus};
pub use host::{HostRules, HostTarget};
pub use lifecycle::TenantLifecycle;
pub use resolver::{Resolved, ResolverConfig, TenantResolver};
pub use router::{ConnectionRouter, HandleFactory};
