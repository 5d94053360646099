use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lets a system principal pass tenant-scope checks for any tenant.
pub const ADMINISTER_ANY_TENANT: &str = "tenant:manage";

pub const SUPER_ADMIN: &str = "SUPER_ADMIN";
pub const SYSTEM_ADMIN: &str = "SYSTEM_ADMIN";
pub const SYSTEM_MANAGER: &str = "SYSTEM_MANAGER";
pub const SYSTEM_SUPPORT: &str = "SYSTEM_SUPPORT";
pub const TENANT_ADMIN: &str = "TENANT_ADMIN";
pub const TENANT_MANAGER: &str = "TENANT_MANAGER";
pub const TENANT_USER: &str = "TENANT_USER";
pub const CUSTOMER: &str = "CUSTOMER";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionScope {
    /// Platform-level; only system principals may hold it.
    System,
    /// Exercised inside exactly one tenant.
    Tenant,
    /// Acts on the principal's own record.
    Own,
}

impl PermissionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionScope::System => "system",
            PermissionScope::Tenant => "tenant",
            PermissionScope::Own => "own",
        }
    }
}

impl fmt::Display for PermissionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PermissionDef {
    pub name: String,
    pub resource: String,
    pub action: String,
    pub scope: PermissionScope,
    pub description: &'static str,
}

impl PermissionDef {
    pub fn is_system_scope(&self) -> bool { self.scope == PermissionScope::System }
}

#[derive(Clone, Debug, Serialize)]
pub struct RoleDefaults {
    pub role: &'static str,
    pub description: &'static str,
    pub is_system_role: bool,
    pub is_default: bool,
    pub permissions: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PermissionNameError {
    #[error("permission name is empty")]
    Empty,
    #[error("permission `{0}` must be <resource>:<action>")]
    Shape(String),
    #[error("permission `{0}` contains invalid characters")]
    Charset(String),
}

/// Canonicalise a permission name to `<resource>:<action>`.
///
/// Accepts the dotted form used by older seed data (`tenant_user.read`).
/// Segments are lower-cased; `*` is allowed as the action, and as the
/// resource only together with a `*` action.
///
/// ```
/// use service::rbac::catalog::normalize_permission;
/// assert_eq!(normalize_permission("Tenant_User.Read").unwrap(), "tenant_user:read");
/// assert_eq!(normalize_permission("report:*").unwrap(), "report:*");
/// assert!(normalize_permission("*:read").is_err());
/// ```
pub fn normalize_permission(raw: &str) -> Result<String, PermissionNameError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(PermissionNameError::Empty);
    }
    let (resource, action) = raw
        .split_once(':')
        .or_else(|| raw.split_once('.'))
        .ok_or_else(|| PermissionNameError::Shape(raw.to_string()))?;
    let resource = resource.to_ascii_lowercase();
    let action = action.to_ascii_lowercase();
    if resource.is_empty() || action.is_empty() {
        return Err(PermissionNameError::Shape(raw.to_string()));
    }
    let segment_ok = |s: &str| s == "*" || s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !segment_ok(&resource) || !segment_ok(&action) {
        return Err(PermissionNameError::Charset(raw.to_string()));
    }
    if resource == "*" && action != "*" {
        return Err(PermissionNameError::Shape(raw.to_string()));
    }
    Ok(format!("{resource}:{action}"))
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid permission name: {0}")]
    Name(#[from] PermissionNameError),
    #[error("duplicate permission `{0}`")]
    Duplicate(String),
    #[error("role {role} references unknown permission `{permission}`")]
    UnknownInRole { role: &'static str, permission: String },
    #[error("wildcard `{0}` cannot be a catalog entry")]
    Wildcard(String),
}

/// The closed set of permissions plus the default grants per well-known role.
#[derive(Debug)]
pub struct PermissionCatalog {
    permissions: Vec<PermissionDef>,
    index: HashMap<String, usize>,
    roles: Vec<RoleDefaults>,
}

pub type RawPermission = (&'static str, PermissionScope, &'static str);
pub type RawRole = (&'static str, &'static str, bool, bool, &'static [&'static str]);

static GLOBAL: Lazy<PermissionCatalog> = Lazy::new(|| {
    PermissionCatalog::build(RAW_PERMISSIONS, RAW_ROLES)
        .unwrap_or_else(|e| panic!("permission catalog is inconsistent: {e}"))
});

impl PermissionCatalog {
    /// Process-wide catalog. Built and validated on first use.
    pub fn global() -> &'static PermissionCatalog { &GLOBAL }

    pub fn build(raw_permissions: &[RawPermission], raw_roles: &[RawRole]) -> Result<Self, CatalogError> {
        let mut permissions = Vec::with_capacity(raw_permissions.len());
        let mut index = HashMap::with_capacity(raw_permissions.len());
        for (raw, scope, description) in raw_permissions {
            let name = normalize_permission(raw)?;
            if name.contains('*') {
                return Err(CatalogError::Wildcard(name));
            }
            if index.contains_key(&name) {
                return Err(CatalogError::Duplicate(name));
            }
            let (resource, action) = name.split_once(':').unwrap_or_default();
            let def = PermissionDef {
                resource: resource.to_string(),
                action: action.to_string(),
                name: name.clone(),
                scope: *scope,
                description: *description,
            };
            index.insert(name, permissions.len());
            permissions.push(def);
        }

        let mut roles = Vec::with_capacity(raw_roles.len());
        for (role, description, is_system_role, is_default, names) in raw_roles {
            let mut granted = Vec::with_capacity(names.len());
            for raw in names.iter() {
                let name = normalize_permission(raw)?;
                if !index.contains_key(&name) {
                    return Err(CatalogError::UnknownInRole { role: *role, permission: name });
                }
                granted.push(name);
            }
            roles.push(RoleDefaults {
                role: *role,
                description: *description,
                is_system_role: *is_system_role,
                is_default: *is_default,
                permissions: granted,
            });
        }
        Ok(Self { permissions, index, roles })
    }

    pub fn permissions(&self) -> &[PermissionDef] { &self.permissions }

    pub fn role_permission_defaults(&self) -> &[RoleDefaults] { &self.roles }

    pub fn role_defaults(&self, role: &str) -> Option<&RoleDefaults> {
        self.roles.iter().find(|r| r.role == role)
    }

    pub fn lookup(&self, name: &str) -> Option<&PermissionDef> {
        self.index.get(name).map(|&i| &self.permissions[i])
    }

    pub fn contains(&self, name: &str) -> bool { self.index.contains_key(name) }

    pub fn scope_of(&self, name: &str) -> Option<PermissionScope> { self.lookup(name).map(|p| p.scope) }
}

use PermissionScope::{Own, System, Tenant};

static RAW_PERMISSIONS: &[RawPermission] = &[
    ("system.manage", System, "Full system management"),
    ("system.view", System, "View system information"),
    ("tenant.create", System, "Create new tenants"),
    ("tenant.read", System, "View tenant details"),
    ("tenant.update", System, "Update tenant information"),
    ("tenant.delete", System, "Delete tenants"),
    ("tenant.list", System, "List all tenants"),
    ("tenant.manage", System, "Act inside any tenant"),
    ("plan.create", System, "Create subscription plans"),
    ("plan.read", System, "View plan details"),
    ("plan.update", System, "Update plans"),
    ("plan.delete", System, "Delete plans"),
    ("plan.list", System, "List all plans"),
    ("module.create", System, "Create system modules"),
    ("module.read", System, "View module details"),
    ("module.update", System, "Update modules"),
    ("module.delete", System, "Delete modules"),
    ("module.list", System, "List all modules"),
    ("system_user.create", System, "Create system users"),
    ("system_user.read", System, "View system user details"),
    ("system_user.update", System, "Update system users"),
    ("system_user.delete", System, "Delete system users"),
    ("system_user.list", System, "List system users"),
    ("system_role.create", System, "Create system roles"),
    ("system_role.read", System, "View system role details"),
    ("system_role.update", System, "Update system roles"),
    ("system_role.delete", System, "Delete system roles"),
    ("system_role.list", System, "List system roles"),
    ("subscription.create", System, "Create subscriptions"),
    ("subscription.read", System, "View subscription details"),
    ("subscription.update", System, "Update subscriptions"),
    ("subscription.delete", System, "Delete subscriptions"),
    ("subscription.list", System, "List all subscriptions"),
    ("system_setting.create", System, "Create system settings"),
    ("system_setting.read", System, "View system settings"),
    ("system_setting.update", System, "Update system settings"),
    ("system_setting.delete", System, "Delete system settings"),
    ("audit_log.read", System, "View audit logs"),
    ("audit_log.list", System, "List audit logs"),
    ("tenant_user.create", Tenant, "Create tenant users"),
    ("tenant_user.read", Tenant, "View tenant user details"),
    ("tenant_user.update", Tenant, "Update tenant users"),
    ("tenant_user.delete", Tenant, "Delete tenant users"),
    ("tenant_user.list", Tenant, "List tenant users"),
    ("tenant_role.create", Tenant, "Create tenant roles"),
    ("tenant_role.read", Tenant, "View tenant role details"),
    ("tenant_role.update", Tenant, "Update tenant roles"),
    ("tenant_role.delete", Tenant, "Delete tenant roles"),
    ("tenant_role.list", Tenant, "List tenant roles"),
    ("tenant_setting.create", Tenant, "Create tenant settings"),
    ("tenant_setting.read", Tenant, "View tenant settings"),
    ("tenant_setting.update", Tenant, "Update tenant settings"),
    ("tenant_setting.delete", Tenant, "Delete tenant settings"),
    ("tenant_module.read", Tenant, "View tenant modules"),
    ("tenant_module.update", Tenant, "Configure tenant modules"),
    ("tenant_module.list", Tenant, "List tenant modules"),
    ("domain_mapping.create", Tenant, "Create domain mappings"),
    ("domain_mapping.read", Tenant, "View domain mappings"),
    ("domain_mapping.update", Tenant, "Update domain mappings"),
    ("domain_mapping.delete", Tenant, "Delete domain mappings"),
    ("customer.create", Tenant, "Create customers"),
    ("customer.read", Tenant, "View customer details"),
    ("customer.update", Tenant, "Update customers"),
    ("customer.delete", Tenant, "Delete customers"),
    ("customer.list", Tenant, "List customers"),
    ("tenant_data.create", Tenant, "Create tenant data"),
    ("tenant_data.read", Tenant, "View tenant data"),
    ("tenant_data.update", Tenant, "Update tenant data"),
    ("tenant_data.delete", Tenant, "Delete tenant data"),
    ("tenant_data.export", Tenant, "Export tenant data"),
    ("tenant_data.import", Tenant, "Import tenant data"),
    ("report.create", Tenant, "Create reports"),
    ("report.read", Tenant, "View reports"),
    ("report.update", Tenant, "Update reports"),
    ("report.delete", Tenant, "Delete reports"),
    ("report.export", Tenant, "Export reports"),
    ("dashboard.read", Tenant, "View dashboard"),
    ("dashboard.update", Tenant, "Customize dashboard"),
    ("profile.read", Own, "View own profile"),
    ("profile.update", Own, "Update own profile"),
];

static RAW_ROLES: &[RawRole] = &[
    (SUPER_ADMIN, "Full system access", true, false, &[
        "system.manage", "tenant.manage",
        "tenant.create", "tenant.read", "tenant.update", "tenant.delete", "tenant.list",
        "plan.create", "plan.read", "plan.update", "plan.delete", "plan.list",
        "module.create", "module.read", "module.update", "module.delete", "module.list",
        "system_user.create", "system_user.read", "system_user.update", "system_user.delete", "system_user.list",
        "system_role.create", "system_role.read", "system_role.update", "system_role.delete", "system_role.list",
        "subscription.create", "subscription.read", "subscription.update", "subscription.delete", "subscription.list",
        "system_setting.create", "system_setting.read", "system_setting.update", "system_setting.delete",
        "audit_log.read", "audit_log.list",
        "profile.read", "profile.update",
    ]),
    (SYSTEM_ADMIN, "System management", true, false, &[
        "system.view",
        "tenant.create", "tenant.read", "tenant.update", "tenant.list",
        "plan.read", "plan.list",
        "module.read", "module.update", "module.list",
        "system_user.create", "system_user.read", "system_user.update", "system_user.list",
        "system_role.read", "system_role.list",
        "subscription.create", "subscription.read", "subscription.update", "subscription.list",
        "system_setting.read", "system_setting.update",
        "audit_log.read", "audit_log.list",
        "profile.read", "profile.update",
    ]),
    (SYSTEM_MANAGER, "Limited system access", true, false, &[
        "system.view",
        "tenant.read", "tenant.list",
        "plan.read", "plan.list",
        "module.read", "module.list",
        "system_user.read", "system_user.list",
        "subscription.read", "subscription.list",
        "audit_log.read", "audit_log.list",
        "profile.read", "profile.update",
    ]),
    (SYSTEM_SUPPORT, "Support operations", true, false, &[
        "tenant.read", "tenant.list",
        "system_user.read", "system_user.list",
        "subscription.read", "subscription.list",
        "audit_log.read", "audit_log.list",
        "profile.read", "profile.update",
    ]),
    (TENANT_ADMIN, "Full tenant access", false, false, &[
        "tenant_user.create", "tenant_user.read", "tenant_user.update", "tenant_user.delete", "tenant_user.list",
        "tenant_role.create", "tenant_role.read", "tenant_role.update", "tenant_role.delete", "tenant_role.list",
        "tenant_setting.create", "tenant_setting.read", "tenant_setting.update", "tenant_setting.delete",
        "tenant_module.read", "tenant_module.update", "tenant_module.list",
        "domain_mapping.create", "domain_mapping.read", "domain_mapping.update", "domain_mapping.delete",
        "customer.create", "customer.read", "customer.update", "customer.delete", "customer.list",
        "tenant_data.create", "tenant_data.read", "tenant_data.update", "tenant_data.delete",
        "tenant_data.export", "tenant_data.import",
        "report.create", "report.read", "report.update", "report.delete", "report.export",
        "dashboard.read", "dashboard.update",
        "profile.read", "profile.update",
    ]),
    (TENANT_MANAGER, "Tenant management", false, false, &[
        "tenant_user.read", "tenant_user.update", "tenant_user.list",
        "tenant_role.read", "tenant_role.list",
        "tenant_setting.read", "tenant_setting.update",
        "tenant_module.read", "tenant_module.list",
        "domain_mapping.read",
        "customer.create", "customer.read", "customer.update", "customer.list",
        "tenant_data.create", "tenant_data.read", "tenant_data.update", "tenant_data.export",
        "report.create", "report.read", "report.update", "report.export",
        "dashboard.read", "dashboard.update",
        "profile.read", "profile.update",
    ]),
    (TENANT_USER, "Regular tenant user", false, true, &[
        "tenant_user.read",
        "customer.read", "customer.list",
        "tenant_data.read",
        "report.read", "report.export",
        "dashboard.read",
        "profile.read", "profile.update",
    ]),
    (CUSTOMER, "End customer", false, false, &[
        "dashboard.read",
        "profile.read", "profile.update",
    ]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_catalog_is_consistent() {
        let c = PermissionCatalog::global();
        assert!(c.contains("tenant_user:read"));
        assert!(!c.contains("tenant_user.read"));
        assert_eq!(c.scope_of(ADMINISTER_ANY_TENANT), Some(PermissionScope::System));
        assert_eq!(c.scope_of("report:export"), Some(PermissionScope::Tenant));
        assert_eq!(c.role_permission_defaults().len(), 8);
    }

    #[test]
    fn only_super_admin_administers_any_tenant() {
        let c = PermissionCatalog::global();
        for role in c.role_permission_defaults() {
            let has = role.permissions.iter().any(|p| p == ADMINISTER_ANY_TENANT);
            assert_eq!(has, role.role == SUPER_ADMIN, "{}", role.role);
        }
    }

    #[test]
    fn tenant_roles_only_grant_tenant_or_own_scope() {
        let c = PermissionCatalog::global();
        for role in c.role_permission_defaults().iter().filter(|r| !r.is_system_role) {
            for p in &role.permissions {
                assert_ne!(c.scope_of(p), Some(PermissionScope::System), "{} grants {}", role.role, p);
            }
        }
    }

    #[test]
    fn build_rejects_duplicates_and_unknown_role_grants() {
        let dup: &[RawPermission] = &[("a.read", Tenant, ""), ("a:read", Tenant, "")];
        assert!(matches!(PermissionCatalog::build(dup, &[]), Err(CatalogError::Duplicate(_))));

        let perms: &[RawPermission] = &[("a.read", Tenant, "")];
        let roles: &[RawRole] = &[("R", "", false, false, &["a.write"])];
        assert!(matches!(PermissionCatalog::build(perms, roles), Err(CatalogError::UnknownInRole { .. })));

        let wild: &[RawPermission] = &[("a.*", Tenant, "")];
        assert!(matches!(PermissionCatalog::build(wild, &[]), Err(CatalogError::Wildcard(_))));
    }

    #[test]
    fn normalize_rejects_malformed() {
        for bad in ["", "read", ":read", "tenant:", "ten ant:read", "tenant-user:read", "*:read"] {
            assert!(normalize_permission(bad).is_err(), "{bad:?}");
        }
        assert_eq!(normalize_permission(" *:* ").unwrap(), "*:*");
    }
}
