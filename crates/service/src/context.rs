use uuid::Uuid;

use crate::auth::token::Claims;
use crate::errors::ServiceError;
use crate::tenancy::domain::Tenant;

/// Per-request view filled in by middleware: the tenant resolved from the
/// host and the claims of the bearer token, each once.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub tenant: Option<Tenant>,
    pub claims: Option<Claims>,
}

impl RequestContext {
    pub fn tenant_id(&self) -> Option<Uuid> { self.tenant.as_ref().map(|t| t.id) }

    /// The resolved tenant, or Validation on system hosts.
    pub fn require_tenant(&self) -> Result<&Tenant, ServiceError> {
        self.tenant
            .as_ref()
            .ok_or_else(|| ServiceError::Validation("request is not bound to a tenant".into()))
    }

    pub fn require_claims(&self) -> Result<&Claims, ServiceError> {
        self.claims.as_ref().ok_or(ServiceError::Unauthenticated)
    }

    pub fn principal_id(&self) -> Result<Uuid, ServiceError> {
        self.require_claims()?.principal_id().ok_or(ServiceError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::TokenKind;
    use crate::tenancy::domain::TenantStatus;

    fn claims(sub: &str) -> Claims {
        Claims {
            sub: sub.into(),
            tenant_id: String::new(),
            role: "SUPER_ADMIN".into(),
            permissions: vec!["*:*".into()],
            is_system: true,
            iss: "tenancy-test".into(),
            iat: 0,
            exp: 0,
            jti: "j".into(),
            typ: TokenKind::Access,
        }
    }

    #[test]
    fn empty_context_rejects() {
        let ctx = RequestContext::default();
        assert!(ctx.tenant_id().is_none());
        assert!(matches!(ctx.require_tenant(), Err(ServiceError::Validation(_))));
        assert!(matches!(ctx.require_claims(), Err(ServiceError::Unauthenticated)));
        assert!(matches!(ctx.principal_id(), Err(ServiceError::Unauthenticated)));
    }

    #[test]
    fn populated_context_exposes_ids() {
        let pid = Uuid::new_v4();
        let tenant = Tenant {
            id: Uuid::new_v4(),
            name: "Acme".into(),
            slug: "acme".into(),
            subdomain: "acme".into(),
            status: TenantStatus::Active,
            settings: serde_json::json!({}),
            custom_domains: vec![],
        };
        let ctx = RequestContext { tenant: Some(tenant.clone()), claims: Some(claims(&pid.to_string())) };
        assert_eq!(ctx.tenant_id(), Some(tenant.id));
        assert_eq!(ctx.principal_id().unwrap(), pid);

        let garbled = RequestContext { tenant: None, claims: Some(claims("not-a-uuid")) };
        assert!(matches!(garbled.principal_id(), Err(ServiceError::Unauthenticated)));
    }
}
