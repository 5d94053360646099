use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::catalog::{normalize_permission, PermissionCatalog, PermissionDef, PermissionScope};
use super::domain::{NewRole, Permission, PrincipalGrants, PrincipalSnapshot, Role, RoleWithPermissions};
use super::matcher::{decide, Decision, Subject};
use super::repository::RbacRepository;
use crate::auth::token::Claims;
use crate::deadline::bounded;
use crate::errors::ServiceError;
use crate::observability::{CROSS_TENANT_OVERRIDES_TOTAL, PERMISSION_DENIALS_TOTAL};

/// Evaluates permissions from token claims (fast path) or the live role
/// graph (slow path), and owns mutations of that graph.
pub struct PermissionEngine {
    repo: Arc<dyn RbacRepository>,
    catalog: &'static PermissionCatalog,
    timeout: Duration,
}

impl PermissionEngine {
    pub fn new(repo: Arc<dyn RbacRepository>, timeout: Duration) -> Self {
        Self { repo, catalog: PermissionCatalog::global(), timeout }
    }

    pub fn catalog(&self) -> &'static PermissionCatalog { self.catalog }

    /// Required permissions must be canonical catalog names.
    fn required(&self, permission: &str) -> Result<&'static PermissionDef, ServiceError> {
        let name = normalize_permission(permission).map_err(|e| ServiceError::Validation(e.to_string()))?;
        if name != permission {
            return Err(ServiceError::Validation(format!("permission `{permission}` is not in <resource>:<action> form")));
        }
        self.catalog
            .lookup(&name)
            .ok_or_else(|| ServiceError::NotFound(format!("permission {name} is not in the catalog")))
    }

    fn record(&self, principal_id: Uuid, required: &PermissionDef, scope_tenant: Option<Uuid>, decision: Decision, path: &'static str) -> bool {
        match decision {
            Decision::Allow => {}
            Decision::AllowCrossTenant => {
                CROSS_TENANT_OVERRIDES_TOTAL.inc();
                info!(
                    target: "audit",
                    principal_id = %principal_id,
                    tenant_id = ?scope_tenant,
                    permission = %required.name,
                    path,
                    "cross_tenant_override"
                );
            }
            Decision::Deny(reason) => {
                PERMISSION_DENIALS_TOTAL.inc();
                debug!(principal_id = %principal_id, permission = %required.name, ?reason, path, "permission_denied");
            }
        }
        decision.is_allowed()
    }

    /// Fast path: decide from signed claims without touching storage.
    pub fn authorize_claims(&self, claims: &Claims, permission: &str, scope_tenant: Option<Uuid>) -> Result<bool, ServiceError> {
        let required = self.required(permission)?;
        let principal_id = claims.principal_id().ok_or(ServiceError::Unauthenticated)?;
        let subject = claims.subject().ok_or(ServiceError::Unauthenticated)?;
        let decision = decide(subject, &claims.permissions, required, scope_tenant);
        Ok(self.record(principal_id, required, scope_tenant, decision, "token"))
    }

    async fn grants(&self, principal_id: Uuid) -> Result<PrincipalGrants, ServiceError> {
        bounded(self.timeout, "load principal grants", self.repo.load_grants(principal_id))
            .await?
            .ok_or_else(|| ServiceError::not_found("principal"))
    }

    /// Slow path over the live role graph (role grants plus direct grants).
    ///
    /// # Examples
    /// ```
    /// use service::rbac::{PermissionEngine, repository::mock::MockRbacRepository};
    /// use std::{sync::Arc, time::Duration};
    /// let repo = Arc::new(MockRbacRepository::default());
    /// let engine = PermissionEngine::new(repo.clone(), Duration::from_secs(1));
    /// tokio_test::block_on(engine.initialize_system_roles()).unwrap();
    /// let tenant = uuid::Uuid::new_v4();
    /// let roles = tokio_test::block_on(engine.initialize_tenant_roles(tenant)).unwrap();
    /// let admin = roles.iter().find(|r| r.name == "TENANT_ADMIN").unwrap();
    /// let user = repo.add_principal(Some(tenant), admin.id, "a@acme.test");
    /// assert!(tokio_test::block_on(engine.check_user_permission(user.id, "customer:create", Some(tenant))).unwrap());
    /// assert!(!tokio_test::block_on(engine.check_user_permission(user.id, "tenant:create", Some(tenant))).unwrap());
    /// ```
    #[instrument(skip(self))]
    pub async fn check_user_permission(&self, principal_id: Uuid, permission: &str, scope_tenant: Option<Uuid>) -> Result<bool, ServiceError> {
        let required = self.required(permission)?;
        let grants = self.grants(principal_id).await?;
        if !grants.principal.active {
            debug!("principal inactive");
            PERMISSION_DENIALS_TOTAL.inc();
            return Ok(false);
        }
        let held = grants.permission_names();
        let subject = Subject::from_tenant(grants.principal.tenant_id);
        let decision = decide(subject, &held, required, scope_tenant);
        Ok(self.record(principal_id, required, scope_tenant, decision, "storage"))
    }

    /// Role and flattened permissions for token issuance.
    #[instrument(skip(self))]
    pub async fn principal_snapshot(&self, principal_id: Uuid) -> Result<PrincipalSnapshot, ServiceError> {
        let grants = self.grants(principal_id).await?;
        Ok(PrincipalSnapshot {
            permissions: grants.permission_names(),
            principal_id,
            tenant_id: grants.principal.tenant_id,
            role: grants.role.name,
            is_system: grants.principal.is_system(),
            active: grants.principal.active,
        })
    }

    pub async fn user_permissions(&self, principal_id: Uuid) -> Result<Vec<String>, ServiceError> {
        Ok(self.grants(principal_id).await?.permission_names())
    }

    pub async fn roles_by_tenant(&self, tenant_id: Option<Uuid>) -> Result<Vec<RoleWithPermissions>, ServiceError> {
        bounded(self.timeout, "list roles", self.repo.list_roles(tenant_id)).await
    }

    /// Normalise, dedupe and check names against the catalog, then map them
    /// to persisted permission rows.
    async fn resolve_grants(&self, names: &[String], allow_system_scope: bool) -> Result<Vec<Permission>, ServiceError> {
        let mut canonical = Vec::with_capacity(names.len());
        for raw in names {
            let name = normalize_permission(raw).map_err(|e| ServiceError::Validation(e.to_string()))?;
            let def = self
                .catalog
                .lookup(&name)
                .ok_or_else(|| ServiceError::Validation(format!("unknown permission {name}")))?;
            if def.scope == PermissionScope::System && !allow_system_scope {
                return Err(ServiceError::Validation(format!("system permission {name} cannot be granted to a tenant role")));
            }
            if !canonical.contains(&name) {
                canonical.push(name);
            }
        }
        let found = bounded(self.timeout, "find permissions", self.repo.find_permissions(&canonical)).await?;
        if found.len() != canonical.len() {
            return Err(ServiceError::InvalidState("permission catalog is not seeded".into()));
        }
        Ok(found)
    }

    /// Replace the role's grant set.
    #[instrument(skip(self, names), fields(count = names.len()))]
    pub async fn assign_permissions_to_role(&self, role_id: Uuid, names: &[String]) -> Result<(), ServiceError> {
        let role = bounded(self.timeout, "find role", self.repo.find_role(role_id))
            .await?
            .ok_or_else(|| ServiceError::not_found("role"))?;
        let perms = self.resolve_grants(names, role.is_system_role).await?;
        let ids: Vec<Uuid> = perms.iter().map(|p| p.id).collect();
        bounded(self.timeout, "replace role permissions", self.repo.replace_role_permissions(role_id, &ids)).await?;
        info!(role_id = %role_id, role = %role.name, "role_permissions_replaced");
        Ok(())
    }

    /// Create a role in a tenant (`Some`) or at system level (`None`).
    #[instrument(skip(self, description, names))]
    pub async fn create_custom_role(
        &self,
        tenant_id: Option<Uuid>,
        name: &str,
        description: Option<String>,
        names: &[String],
    ) -> Result<Role, ServiceError> {
        let name = name.trim();
        if name.is_empty() || name.len() > 64 {
            return Err(ServiceError::Validation("role name must be 1-64 characters".into()));
        }
        if bounded(self.timeout, "find role by name", self.repo.find_role_by_name(tenant_id, name)).await?.is_some() {
            return Err(ServiceError::Validation(format!("role {name} already exists in this scope")));
        }
        let is_system_role = tenant_id.is_none();
        let perms = self.resolve_grants(names, is_system_role).await?;
        let ids: Vec<Uuid> = perms.iter().map(|p| p.id).collect();
        let role = NewRole { tenant_id, name: name.to_string(), description, is_system_role, is_default: false };
        let role = bounded(self.timeout, "create role", self.repo.create_role(role, &ids)).await?;
        info!(role_id = %role.id, role = %role.name, "custom_role_created");
        Ok(role)
    }

    /// Assign a role, enforcing that the role's scope matches the principal.
    #[instrument(skip(self))]
    pub async fn assign_role_to_user(&self, principal_id: Uuid, role_id: Uuid) -> Result<(), ServiceError> {
        let principal = bounded(self.timeout, "find principal", self.repo.find_principal(principal_id))
            .await?
            .ok_or_else(|| ServiceError::not_found("principal"))?;
        let role = bounded(self.timeout, "find role", self.repo.find_role(role_id))
            .await?
            .ok_or_else(|| ServiceError::not_found("role"))?;

        match (principal.tenant_id, role.tenant_id) {
            (None, Some(_)) => {
                return Err(ServiceError::Validation("tenant role cannot be assigned to a system principal".into()))
            }
            (None, None) if !role.is_system_role => {
                return Err(ServiceError::Validation("system principals require a system role".into()))
            }
            (Some(_), None) if role.is_system_role => {
                return Err(ServiceError::Validation("system role cannot be assigned to a tenant principal".into()))
            }
            (Some(own), Some(other)) if own != other => {
                warn!(tenant_id = %own, role_tenant_id = %other, "cross_tenant_role_assignment_rejected");
                return Err(ServiceError::Validation("role belongs to another tenant".into()));
            }
            _ => {}
        }

        bounded(self.timeout, "set principal role", self.repo.set_principal_role(principal_id, role_id)).await?;
        info!(role = %role.name, "role_assigned");
        Ok(())
    }

    /// Seed the catalog and the system roles. Idempotent; existing system
    /// roles are brought back to their default grants.
    #[instrument(skip(self))]
    pub async fn initialize_system_roles(&self) -> Result<Vec<Role>, ServiceError> {
        let mut ids = HashMap::with_capacity(self.catalog.permissions().len());
        for def in self.catalog.permissions() {
            let p = bounded(self.timeout, "seed permission", self.repo.upsert_permission(def)).await?;
            ids.insert(p.name, p.id);
        }

        let mut roles = Vec::new();
        for defaults in self.catalog.role_permission_defaults().iter().filter(|r| r.is_system_role) {
            let grant: Vec<Uuid> = defaults.permissions.iter().filter_map(|n| ids.get(n).copied()).collect();
            let existing = bounded(self.timeout, "find role by name", self.repo.find_role_by_name(None, defaults.role)).await?;
            let role = match existing {
                Some(role) => {
                    bounded(self.timeout, "replace role permissions", self.repo.replace_role_permissions(role.id, &grant)).await?;
                    role
                }
                None => {
                    let new = NewRole {
                        tenant_id: None,
                        name: defaults.role.to_string(),
                        description: Some(defaults.description.to_string()),
                        is_system_role: true,
                        is_default: defaults.is_default,
                    };
                    bounded(self.timeout, "create role", self.repo.create_role(new, &grant)).await?
                }
            };
            roles.push(role);
        }
        info!(permissions = ids.len(), roles = roles.len(), "system_roles_initialized");
        Ok(roles)
    }

    /// Create the tenant's copies of the default tenant roles. Idempotent.
    #[instrument(skip(self))]
    pub async fn initialize_tenant_roles(&self, tenant_id: Uuid) -> Result<Vec<Role>, ServiceError> {
        let mut roles = Vec::new();
        for defaults in self.catalog.role_permission_defaults().iter().filter(|r| !r.is_system_role) {
            if let Some(role) = bounded(self.timeout, "find role by name", self.repo.find_role_by_name(Some(tenant_id), defaults.role)).await? {
                roles.push(role);
                continue;
            }
            let perms = self.resolve_grants(&defaults.permissions, false).await?;
            let ids: Vec<Uuid> = perms.iter().map(|p| p.id).collect();
            let new = NewRole {
                tenant_id: Some(tenant_id),
                name: defaults.role.to_string(),
                description: Some(defaults.description.to_string()),
                is_system_role: false,
                is_default: defaults.is_default,
            };
            roles.push(bounded(self.timeout, "create role", self.repo.create_role(new, &ids)).await?);
        }
        info!(tenant_id = %tenant_id, roles = roles.len(), "tenant_roles_initialized");
        Ok(roles)
    }
}
