use uuid::Uuid;

use super::catalog::{PermissionDef, PermissionScope, ADMINISTER_ANY_TENANT};

/// Does any held permission satisfy `required`?
///
/// Exact match, the global wildcard `*:*`, or `<resource>:*` for the same
/// resource. Nothing else: no prefix matching, no normalisation.
pub fn authorize<I>(held: I, required: &str) -> bool
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let required_resource = required.split_once(':').map(|(r, _)| r);
    held.into_iter().any(|h| {
        let h = h.as_ref();
        if h == required || h == "*:*" {
            return true;
        }
        match (h.strip_suffix(":*"), required_resource) {
            (Some(res), Some(req)) => res == req,
            _ => false,
        }
    })
}

/// Who is asking, as far as scope is concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Subject {
    System,
    Tenant(Uuid),
}

impl Subject {
    pub fn from_tenant(tenant_id: Option<Uuid>) -> Self {
        match tenant_id {
            Some(t) => Subject::Tenant(t),
            None => Subject::System,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenyReason {
    NotHeld,
    SystemOnly,
    WrongTenant,
    NoTenantScope,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// System principal acting inside a tenant via `tenant:manage`.
    AllowCrossTenant,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool { !matches!(self, Decision::Deny(_)) }
}

/// Scope rule shared by the token fast path and the storage slow path.
/// Keyed on the catalog scope of the required permission.
pub fn decide<I>(subject: Subject, held: I, required: &PermissionDef, scope_tenant: Option<Uuid>) -> Decision
where
    I: IntoIterator + Copy,
    I::Item: AsRef<str>,
{
    let holds = |name: &str| authorize(held, name);
    match (required.scope, subject) {
        (PermissionScope::System, Subject::Tenant(_)) => Decision::Deny(DenyReason::SystemOnly),
        (PermissionScope::System, Subject::System) => allow_if(holds(&required.name)),

        (PermissionScope::Tenant, _) if scope_tenant.is_none() => Decision::Deny(DenyReason::NoTenantScope),
        (PermissionScope::Tenant, Subject::System) => {
            // wildcards never imply the override
            if held.into_iter().any(|h| h.as_ref() == ADMINISTER_ANY_TENANT) {
                Decision::AllowCrossTenant
            } else {
                Decision::Deny(DenyReason::NotHeld)
            }
        }
        (PermissionScope::Tenant, Subject::Tenant(own)) => {
            if scope_tenant != Some(own) {
                Decision::Deny(DenyReason::WrongTenant)
            } else {
                allow_if(holds(&required.name))
            }
        }

        (PermissionScope::Own, Subject::Tenant(own)) if scope_tenant.is_some_and(|s| s != own) => {
            Decision::Deny(DenyReason::WrongTenant)
        }
        (PermissionScope::Own, _) => allow_if(holds(&required.name)),
    }
}

fn allow_if(held: bool) -> Decision {
    if held { Decision::Allow } else { Decision::Deny(DenyReason::NotHeld) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::catalog::PermissionCatalog;

    #[test]
    fn matcher_table() {
        let cases: &[(&[&str], &str, bool)] = &[
            (&["tenants:*"], "tenants:create", true),
            (&["users:read"], "users:create", false),
            (&["*:*"], "tenants:create", true),
            (&["*:*"], "anything:at_all", true),
            (&[], "users:read", false),
            (&["tenant:*"], "user:create", false),
            (&["tenant:create"], "tenant:create", true),
            (&[], "tenant:create", false),
            (&["tenant"], "tenant:create", false),
            (&["tenant_user:*"], "tenant:read", false),
            (&["tenant:"], "tenant:create", false),
        ];
        for (held, required, expected) in cases {
            assert_eq!(authorize(held.iter(), required), *expected, "{held:?} vs {required}");
        }
    }

    #[test]
    fn works_over_owned_sets() {
        let held: std::collections::HashSet<String> = ["report:*".to_string()].into_iter().collect();
        assert!(authorize(&held, "report:export"));
        assert!(!authorize(&held, "customer:read"));
    }

    fn def(name: &str) -> &'static PermissionDef {
        PermissionCatalog::global().lookup(name).expect("catalog entry")
    }

    #[test]
    fn tenant_scope_requires_matching_tenant() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let held = ["tenant_user:read"];
        let required = def("tenant_user:read");
        assert_eq!(decide(Subject::Tenant(a), &held, required, Some(a)), Decision::Allow);
        assert_eq!(decide(Subject::Tenant(a), &held, required, Some(b)), Decision::Deny(DenyReason::WrongTenant));
        assert_eq!(decide(Subject::Tenant(a), &held, required, None), Decision::Deny(DenyReason::NoTenantScope));
    }

    #[test]
    fn tenant_principal_never_gets_system_scope() {
        let a = Uuid::new_v4();
        assert_eq!(
            decide(Subject::Tenant(a), &["*:*"], def("tenant:create"), Some(a)),
            Decision::Deny(DenyReason::SystemOnly)
        );
        assert_eq!(decide(Subject::System, &["*:*"], def("tenant:create"), None), Decision::Allow);
    }

    #[test]
    fn cross_tenant_needs_explicit_override() {
        let t = Uuid::new_v4();
        let required = def("tenant_data:read");
        assert_eq!(decide(Subject::System, &["*:*"], required, Some(t)), Decision::Deny(DenyReason::NotHeld));
        assert_eq!(decide(Subject::System, &["tenant_data:read"], required, Some(t)), Decision::Deny(DenyReason::NotHeld));
        assert_eq!(decide(Subject::System, &[ADMINISTER_ANY_TENANT], required, Some(t)), Decision::AllowCrossTenant);
    }

    #[test]
    fn own_scope_follows_the_principal() {
        let a = Uuid::new_v4();
        let required = def("profile:read");
        assert!(decide(Subject::Tenant(a), &["profile:read"], required, None).is_allowed());
        assert!(decide(Subject::Tenant(a), &["profile:read"], required, Some(a)).is_allowed());
        assert!(!decide(Subject::Tenant(a), &["profile:read"], required, Some(Uuid::new_v4())).is_allowed());
        assert!(decide(Subject::System, &["profile:read"], required, None).is_allowed());
    }
}
