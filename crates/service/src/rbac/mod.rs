//! Role-based access control: the static permission catalog, the matcher
//! shared by the token fast path and the storage slow path, and the
//! role/permission graph service.

pub mod catalog;
pub mod domain;
pub mod matcher;
pub mod repository;
pub mod service;
pub mod repo;

pub use catalog::{PermissionCatalog, PermissionDef, PermissionScope, ADMINISTER_ANY_TENANT};
pub use matcher::authorize;
pub use service::PermissionEngine;
