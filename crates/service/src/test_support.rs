#![cfg(test)]
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::auth::service::TokenConfig;
use crate::rbac::domain::Role;
use crate::rbac::repository::mock::MockRbacRepository;
use crate::rbac::PermissionEngine;

pub struct Seeded {
    pub repo: Arc<MockRbacRepository>,
    pub engine: Arc<PermissionEngine>,
    pub system_roles: Vec<Role>,
}

/// Engine over a mock graph with the catalog and system roles seeded.
pub async fn seeded_engine() -> Seeded {
    let repo = Arc::new(MockRbacRepository::default());
    let engine = Arc::new(PermissionEngine::new(repo.clone(), Duration::from_secs(1)));
    let system_roles = engine.initialize_system_roles().await.expect("seed system roles");
    Seeded { repo, engine, system_roles }
}

pub fn role_id(roles: &[Role], name: &str) -> Uuid {
    roles.iter().find(|r| r.name == name).map(|r| r.id).expect("role present")
}

pub fn token_config(access_ttl: Duration) -> TokenConfig {
    TokenConfig {
        secret: "test-secret".into(),
        issuer: "tenancy-test".into(),
        access_ttl,
        refresh_ttl: Duration::from_secs(3600),
        timeout: Duration::from_secs(1),
    }
}
