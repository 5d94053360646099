use async_trait::async_trait;
use uuid::Uuid;

use super::catalog::PermissionDef;
use super::domain::{NewRole, Permission, Principal, PrincipalGrants, Role, RoleWithPermissions};
use crate::errors::ServiceError;

/// Persistence for the role/permission graph.
///
/// Multi-row writes (`create_role`, `replace_role_permissions`) must be
/// atomic: a reader sees either the old or the new grant set.
#[async_trait]
pub trait RbacRepository: Send + Sync {
    async fn load_grants(&self, principal_id: Uuid) -> Result<Option<PrincipalGrants>, ServiceError>;
    async fn find_principal(&self, principal_id: Uuid) -> Result<Option<Principal>, ServiceError>;

    async fn find_role(&self, role_id: Uuid) -> Result<Option<Role>, ServiceError>;
    async fn find_role_by_name(&self, tenant_id: Option<Uuid>, name: &str) -> Result<Option<Role>, ServiceError>;
    async fn list_roles(&self, tenant_id: Option<Uuid>) -> Result<Vec<RoleWithPermissions>, ServiceError>;

    async fn find_permissions(&self, names: &[String]) -> Result<Vec<Permission>, ServiceError>;
    async fn upsert_permission(&self, def: &PermissionDef) -> Result<Permission, ServiceError>;

    async fn create_role(&self, role: NewRole, permission_ids: &[Uuid]) -> Result<Role, ServiceError>;
    async fn replace_role_permissions(&self, role_id: Uuid, permission_ids: &[Uuid]) -> Result<(), ServiceError>;
    async fn set_principal_role(&self, principal_id: Uuid, role_id: Uuid) -> Result<(), ServiceError>;
}

/// Simple in-memory mock repository for tests and doc examples
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct State {
        permissions: HashMap<Uuid, Permission>,
        roles: HashMap<Uuid, Role>,
        role_permissions: HashMap<Uuid, Vec<Uuid>>, // key: role_id
        principals: HashMap<Uuid, Principal>,
        direct: HashMap<Uuid, Vec<Uuid>>, // key: principal_id
    }

    impl State {
        fn resolve(&self, ids: &[Uuid]) -> Vec<Permission> {
            ids.iter().filter_map(|id| self.permissions.get(id).cloned()).collect()
        }
    }

    #[derive(Default)]
    pub struct MockRbacRepository {
        state: Mutex<State>,
    }

    impl MockRbacRepository {
        pub fn add_principal(&self, tenant_id: Option<Uuid>, role_id: Uuid, email: &str) -> Principal {
            let p = Principal { id: Uuid::new_v4(), tenant_id, role_id, email: email.to_string(), active: true };
            self.state.lock().unwrap().principals.insert(p.id, p.clone());
            p
        }

        pub fn set_active(&self, principal_id: Uuid, active: bool) {
            if let Some(p) = self.state.lock().unwrap().principals.get_mut(&principal_id) {
                p.active = active;
            }
        }

        pub fn remove_principal(&self, principal_id: Uuid) {
            self.state.lock().unwrap().principals.remove(&principal_id);
        }

        /// Grant a seeded permission directly to a principal.
        pub fn grant_direct(&self, principal_id: Uuid, name: &str) -> Result<(), ServiceError> {
            let mut st = self.state.lock().unwrap();
            let id = st
                .permissions
                .values()
                .find(|p| p.name == name)
                .map(|p| p.id)
                .ok_or_else(|| ServiceError::not_found("permission"))?;
            st.direct.entry(principal_id).or_default().push(id);
            Ok(())
        }
    }

    #[async_trait]
    impl RbacRepository for MockRbacRepository {
        async fn load_grants(&self, principal_id: Uuid) -> Result<Option<PrincipalGrants>, ServiceError> {
            let st = self.state.lock().unwrap();
            let Some(principal) = st.principals.get(&principal_id).cloned() else { return Ok(None) };
            let role = st
                .roles
                .get(&principal.role_id)
                .cloned()
                .ok_or_else(|| ServiceError::InvalidState(format!("principal {principal_id} has no role")))?;
            let role_permissions = st.resolve(st.role_permissions.get(&role.id).map(Vec::as_slice).unwrap_or_default());
            let direct_permissions = st.resolve(st.direct.get(&principal_id).map(Vec::as_slice).unwrap_or_default());
            Ok(Some(PrincipalGrants { principal, role, role_permissions, direct_permissions }))
        }

        async fn find_principal(&self, principal_id: Uuid) -> Result<Option<Principal>, ServiceError> {
            Ok(self.state.lock().unwrap().principals.get(&principal_id).cloned())
        }

        async fn find_role(&self, role_id: Uuid) -> Result<Option<Role>, ServiceError> {
            Ok(self.state.lock().unwrap().roles.get(&role_id).cloned())
        }

        async fn find_role_by_name(&self, tenant_id: Option<Uuid>, name: &str) -> Result<Option<Role>, ServiceError> {
            let st = self.state.lock().unwrap();
            Ok(st.roles.values().find(|r| r.tenant_id == tenant_id && r.name == name).cloned())
        }

        async fn list_roles(&self, tenant_id: Option<Uuid>) -> Result<Vec<RoleWithPermissions>, ServiceError> {
            let st = self.state.lock().unwrap();
            let mut out: Vec<RoleWithPermissions> = st
                .roles
                .values()
                .filter(|r| r.tenant_id == tenant_id)
                .map(|r| {
                    let mut permissions: Vec<String> = st
                        .resolve(st.role_permissions.get(&r.id).map(Vec::as_slice).unwrap_or_default())
                        .into_iter()
                        .map(|p| p.name)
                        .collect();
                    permissions.sort();
                    RoleWithPermissions { role: r.clone(), permissions }
                })
                .collect();
            out.sort_by(|a, b| a.role.name.cmp(&b.role.name));
            Ok(out)
        }

        async fn find_permissions(&self, names: &[String]) -> Result<Vec<Permission>, ServiceError> {
            let st = self.state.lock().unwrap();
            Ok(st.permissions.values().filter(|p| names.contains(&p.name)).cloned().collect())
        }

        async fn upsert_permission(&self, def: &PermissionDef) -> Result<Permission, ServiceError> {
            let mut st = self.state.lock().unwrap();
            if let Some(existing) = st.permissions.values().find(|p| p.name == def.name) {
                return Ok(existing.clone());
            }
            let p = Permission {
                id: Uuid::new_v4(),
                name: def.name.clone(),
                resource: def.resource.clone(),
                action: def.action.clone(),
                scope: def.scope,
                description: Some(def.description.to_string()),
            };
            st.permissions.insert(p.id, p.clone());
            Ok(p)
        }

        async fn create_role(&self, role: NewRole, permission_ids: &[Uuid]) -> Result<Role, ServiceError> {
            let mut st = self.state.lock().unwrap();
            if st.roles.values().any(|r| r.tenant_id == role.tenant_id && r.name == role.name) {
                return Err(ServiceError::Validation(format!("role {} already exists", role.name)));
            }
            let r = Role {
                id: Uuid::new_v4(),
                tenant_id: role.tenant_id,
                name: role.name,
                description: role.description,
                is_system_role: role.is_system_role,
                is_default: role.is_default,
            };
            st.roles.insert(r.id, r.clone());
            st.role_permissions.insert(r.id, permission_ids.to_vec());
            Ok(r)
        }

        async fn replace_role_permissions(&self, role_id: Uuid, permission_ids: &[Uuid]) -> Result<(), ServiceError> {
            let mut st = self.state.lock().unwrap();
            if !st.roles.contains_key(&role_id) {
                return Err(ServiceError::not_found("role"));
            }
            st.role_permissions.insert(role_id, permission_ids.to_vec());
            Ok(())
        }

        async fn set_principal_role(&self, principal_id: Uuid, role_id: Uuid) -> Result<(), ServiceError> {
            let mut st = self.state.lock().unwrap();
            let p = st.principals.get_mut(&principal_id).ok_or_else(|| ServiceError::not_found("principal"))?;
            p.role_id = role_id;
            Ok(())
        }
    }
}
