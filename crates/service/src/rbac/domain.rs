use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::catalog::PermissionScope;

/// Persisted permission row, scope resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub resource: String,
    pub action: String,
    pub scope: PermissionScope,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    /// `None` for roles shared across tenants or held by system principals.
    pub tenant_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub is_system_role: bool,
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRole {
    pub tenant_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub is_system_role: bool,
    pub is_default: bool,
}

/// A role together with the canonical names it grants.
#[derive(Debug, Clone, Serialize)]
pub struct RoleWithPermissions {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub role_id: Uuid,
    pub email: String,
    pub active: bool,
}

impl Principal {
    pub fn is_system(&self) -> bool { self.tenant_id.is_none() }
}

/// Everything the slow path needs for one principal.
#[derive(Debug, Clone)]
pub struct PrincipalGrants {
    pub principal: Principal,
    pub role: Role,
    pub role_permissions: Vec<Permission>,
    pub direct_permissions: Vec<Permission>,
}

impl PrincipalGrants {
    /// Union of role and direct grants, sorted and deduplicated.
    pub fn permission_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .role_permissions
            .iter()
            .chain(self.direct_permissions.iter())
            .map(|p| p.name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// Role and permissions to embed in a fresh access token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrincipalSnapshot {
    pub principal_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub role: String,
    pub permissions: Vec<String>,
    pub is_system: bool,
    pub active: bool,
}
