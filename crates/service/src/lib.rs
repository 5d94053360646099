//! Multi-tenant core: tenant resolution from the request host, per-tenant
//! storage routing, wildcard RBAC and JWT session tokens.
//! - Repositories are traits with SeaORM and in-memory implementations.
//! - Components are plain instances meant to be shared through `Arc`.
//! - Errors surface as [`errors::ServiceError`].

pub mod errors;
pub mod deadline;
pub mod observability;
pub mod context;
pub mod rbac;
pub mod auth;
pub mod tenancy;
#[cfg(test)]
pub mod test_support;
