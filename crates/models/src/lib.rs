//! SeaORM entities backing tenant resolution, RBAC and session revocation.
//!
//! Global tables (`tenant`, `domain_mapping`, `role`, `permission`, `user`, ...)
//! live in the public schema; per-tenant business tables live in the
//! tenant's own schema and are outside this crate.

pub mod errors;
pub mod db;
pub mod tenant;
pub mod domain_mapping;
pub mod role;
pub mod permission;
pub mod role_permission;
pub mod user;
pub mod user_permission;
pub mod user_session;
