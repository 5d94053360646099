use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::domain::{NewSession, TokenPair};
use super::errors::TokenError;
use super::repository::SessionRepository;
use super::token::{Claims, TokenCodec, TokenKind};
use crate::deadline::bounded;
use crate::errors::ServiceError;
use crate::observability::TOKEN_REFRESHES_TOTAL;
use crate::rbac::domain::PrincipalSnapshot;
use crate::rbac::PermissionEngine;

/// Token authority configuration
#[derive(Clone, Debug)]
pub struct TokenConfig {
    pub secret: String,
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub timeout: Duration,
}

/// Issues, validates, refreshes and revokes tokens. Refresh tokens are
/// single-use and backed by a session record.
pub struct TokenAuthority {
    codec: TokenCodec,
    engine: Arc<PermissionEngine>,
    sessions: Arc<dyn SessionRepository>,
    timeout: Duration,
}

fn encode_failed(e: TokenError) -> ServiceError {
    ServiceError::InvalidState(format!("token encoding failed: {e}"))
}

impl TokenAuthority {
    pub fn new(cfg: TokenConfig, engine: Arc<PermissionEngine>, sessions: Arc<dyn SessionRepository>) -> Result<Self, ServiceError> {
        if cfg.secret.is_empty() {
            return Err(ServiceError::Validation("token secret must not be empty".into()));
        }
        if cfg.access_ttl.is_zero() || cfg.refresh_ttl.is_zero() {
            return Err(ServiceError::Validation("token lifetimes must be positive".into()));
        }
        Ok(Self {
            codec: TokenCodec::new(&cfg.secret, &cfg.issuer, cfg.access_ttl, cfg.refresh_ttl),
            engine,
            sessions,
            timeout: cfg.timeout,
        })
    }

    /// Sign an access token for the given principal.
    #[instrument(skip(self, permissions))]
    pub fn issue(
        &self,
        principal_id: Uuid,
        tenant_id: Option<Uuid>,
        role: &str,
        permissions: &[String],
        is_system: bool,
    ) -> Result<String, ServiceError> {
        if is_system != tenant_id.is_none() {
            return Err(ServiceError::Validation("system principals have no tenant; tenant principals need one".into()));
        }
        let (token, _) = self
            .codec
            .encode_access(principal_id, tenant_id, role, permissions.to_vec(), Utc::now().timestamp())
            .map_err(encode_failed)?;
        Ok(token)
    }

    /// Verify an access token. Pure: no storage involved.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        self.codec.decode(token, TokenKind::Access)
    }

    /// Validate an `Authorization` header value. Every failure is the same
    /// `Unauthenticated` to the caller; the reason is only logged.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<Claims, ServiceError> {
        let token = authorization
            .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ServiceError::Unauthenticated)?;
        self.validate(token).map_err(|e| {
            debug!(reason = %e, code = e.code(), "access_token_rejected");
            ServiceError::from(e)
        })
    }

    fn mint(&self, snapshot: &PrincipalSnapshot, now: DateTime<Utc>) -> Result<(TokenPair, NewSession), ServiceError> {
        let ts = now.timestamp();
        let (access_token, access) = self
            .codec
            .encode_access(snapshot.principal_id, snapshot.tenant_id, &snapshot.role, snapshot.permissions.clone(), ts)
            .map_err(encode_failed)?;
        let (refresh_token, refresh) = self
            .codec
            .encode_refresh(snapshot.principal_id, snapshot.tenant_id, ts)
            .map_err(encode_failed)?;
        let session = NewSession {
            principal_id: snapshot.principal_id,
            tenant_id: snapshot.tenant_id,
            token_ref: refresh.jti.clone(),
            issued_at: now,
            expires_at: now + chrono::Duration::seconds(refresh.exp - refresh.iat),
        };
        let pair = TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".into(),
            access_expires_at: access.exp,
            refresh_expires_at: refresh.exp,
        };
        Ok((pair, session))
    }

    /// Issue an access/refresh pair after the caller has authenticated the
    /// principal, recording the refresh session.
    ///
    /// # Examples
    /// ```
    /// use service::auth::{TokenAuthority, service::TokenConfig, repository::mock::MockSessionRepository};
    /// use service::rbac::{PermissionEngine, repository::mock::MockRbacRepository};
    /// use std::{sync::Arc, time::Duration};
    /// let repo = Arc::new(MockRbacRepository::default());
    /// let engine = Arc::new(PermissionEngine::new(repo.clone(), Duration::from_secs(1)));
    /// let roles = tokio_test::block_on(engine.initialize_system_roles()).unwrap();
    /// let admin = repo.add_principal(None, roles[0].id, "root@platform.test");
    /// let cfg = TokenConfig {
    ///     secret: "secret".into(),
    ///     issuer: "tenancy-gate".into(),
    ///     access_ttl: Duration::from_secs(900),
    ///     refresh_ttl: Duration::from_secs(3600),
    ///     timeout: Duration::from_secs(1),
    /// };
    /// let tokens = TokenAuthority::new(cfg, engine, Arc::new(MockSessionRepository::default())).unwrap();
    /// let pair = tokio_test::block_on(tokens.issue_session(admin.id)).unwrap();
    /// let claims = tokens.validate(&pair.access_token).unwrap();
    /// assert!(claims.is_system);
    /// ```
    #[instrument(skip(self))]
    pub async fn issue_session(&self, principal_id: Uuid) -> Result<TokenPair, ServiceError> {
        let snapshot = self.engine.principal_snapshot(principal_id).await?;
        if !snapshot.active {
            return Err(ServiceError::Forbidden("principal is inactive".into()));
        }
        let (pair, session) = self.mint(&snapshot, Utc::now())?;
        bounded(self.timeout, "create session", self.sessions.create(session)).await?;
        info!(role = %snapshot.role, "session_issued");
        Ok(pair)
    }

    /// Exchange a live refresh token for a new pair. Role and permissions
    /// are re-read from storage; the presented token is spent.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ServiceError> {
        let claims = self.codec.decode(refresh_token, TokenKind::Refresh).map_err(|e| {
            debug!(reason = %e, "refresh_token_rejected");
            ServiceError::Unauthenticated
        })?;
        let principal_id = claims.principal_id().ok_or(ServiceError::Unauthenticated)?;
        let now = Utc::now();

        let session = bounded(self.timeout, "find session", self.sessions.find_by_ref(&claims.jti))
            .await?
            .ok_or_else(|| {
                warn!(principal_id = %principal_id, "refresh_session_missing");
                ServiceError::Unauthenticated
            })?;
        if session.principal_id != principal_id {
            warn!(principal_id = %principal_id, "refresh_session_principal_mismatch");
            return Err(ServiceError::Unauthenticated);
        }
        if !session.is_live(now) {
            warn!(principal_id = %principal_id, revoked = session.revoked_at.is_some(), "refresh_session_not_live");
            return Err(ServiceError::Unauthenticated);
        }

        let snapshot = match self.engine.principal_snapshot(principal_id).await {
            Ok(s) => s,
            Err(ServiceError::NotFound(_)) => return Err(ServiceError::Unauthenticated),
            Err(e) => return Err(e),
        };
        if !snapshot.active || snapshot.tenant_id != claims.tenant() {
            warn!(principal_id = %principal_id, "refresh_principal_no_longer_eligible");
            return Err(ServiceError::Unauthenticated);
        }

        let (pair, next) = self.mint(&snapshot, now)?;
        let rotated = bounded(self.timeout, "rotate session", self.sessions.rotate(&claims.jti, next, now)).await?;
        if !rotated {
            warn!(principal_id = %principal_id, "refresh_rotation_lost_race");
            return Err(ServiceError::Unauthenticated);
        }
        TOKEN_REFRESHES_TOTAL.inc();
        info!(principal_id = %principal_id, "token_refreshed");
        Ok(pair)
    }

    /// Logout: spend the refresh token. Revoking an already spent token is
    /// not an error.
    #[instrument(skip(self, refresh_token))]
    pub async fn revoke(&self, refresh_token: &str) -> Result<(), ServiceError> {
        let claims = self.codec.decode(refresh_token, TokenKind::Refresh)?;
        let revoked = bounded(self.timeout, "revoke session", self.sessions.revoke(&claims.jti, Utc::now())).await?;
        debug!(revoked, "session_revoke");
        Ok(())
    }

    /// Revoke every live session of the principal, e.g. after a role change.
    #[instrument(skip(self))]
    pub async fn revoke_all_for_principal(&self, principal_id: Uuid) -> Result<u64, ServiceError> {
        let n = bounded(self.timeout, "revoke sessions", self.sessions.revoke_all(principal_id, Utc::now())).await?;
        info!(revoked = n, "sessions_revoked");
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repository::mock::MockSessionRepository;
    use crate::rbac::catalog::{SUPER_ADMIN, TENANT_ADMIN, TENANT_USER};
    use crate::test_support::{role_id, seeded_engine, token_config};

    fn authority(engine: Arc<PermissionEngine>, sessions: Arc<MockSessionRepository>, access_ttl: Duration) -> TokenAuthority {
        TokenAuthority::new(token_config(access_ttl), engine, sessions).unwrap()
    }

    #[tokio::test]
    async fn issue_validate_roundtrip() {
        let s = seeded_engine().await;
        let tokens = authority(s.engine.clone(), Arc::default(), Duration::from_secs(900));
        let (uid, tid) = (Uuid::new_v4(), Uuid::new_v4());
        let perms = vec!["report:read".to_string()];
        let token = tokens.issue(uid, Some(tid), TENANT_USER, &perms, false).unwrap();
        let claims = tokens.validate(&token).unwrap();
        assert_eq!(claims.sub, uid.to_string());
        assert_eq!(claims.tenant_id, tid.to_string());
        assert_eq!(claims.permissions, perms);
        assert!(!claims.is_system);

        let err = tokens.issue(uid, Some(tid), TENANT_USER, &perms, true).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn access_token_expires() {
        let s = seeded_engine().await;
        let tokens = authority(s.engine.clone(), Arc::default(), Duration::from_secs(1));
        let token = tokens.issue(Uuid::new_v4(), None, SUPER_ADMIN, &[], true).unwrap();
        assert!(tokens.validate(&token).is_ok());
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(tokens.validate(&token), Err(TokenError::Expired));
    }

    #[tokio::test]
    async fn authenticate_collapses_reasons() {
        let s = seeded_engine().await;
        let tokens = authority(s.engine.clone(), Arc::default(), Duration::from_secs(900));
        let token = tokens.issue(Uuid::new_v4(), None, SUPER_ADMIN, &[], true).unwrap();
        assert!(tokens.authenticate(Some(&format!("Bearer {token}"))).is_ok());
        for bad in [None, Some(""), Some("Bearer "), Some("Basic abc"), Some("Bearer garbage")] {
            assert!(matches!(tokens.authenticate(bad), Err(ServiceError::Unauthenticated)), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn refresh_is_single_use() {
        let s = seeded_engine().await;
        let sessions = Arc::new(MockSessionRepository::default());
        let tokens = authority(s.engine.clone(), sessions.clone(), Duration::from_secs(900));
        let admin = s.repo.add_principal(None, role_id(&s.system_roles, SUPER_ADMIN), "root@platform.test");

        let pair = tokens.issue_session(admin.id).await.unwrap();
        let next = tokens.refresh(&pair.refresh_token).await.unwrap();
        assert!(matches!(tokens.refresh(&pair.refresh_token).await, Err(ServiceError::Unauthenticated)));
        assert!(tokens.refresh(&next.refresh_token).await.is_ok());
        assert_eq!(sessions.live_count(admin.id), 1);
    }

    #[tokio::test]
    async fn concurrent_refresh_has_one_winner() {
        let s = seeded_engine().await;
        let tokens = Arc::new(authority(s.engine.clone(), Arc::default(), Duration::from_secs(900)));
        let admin = s.repo.add_principal(None, role_id(&s.system_roles, SUPER_ADMIN), "root@platform.test");
        let pair = tokens.issue_session(admin.id).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let tokens = tokens.clone();
            let token = pair.refresh_token.clone();
            handles.push(tokio::spawn(async move { tokens.refresh(&token).await.is_ok() }));
        }
        let mut wins = 0;
        for h in handles {
            if h.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn refresh_rederives_permissions() {
        let s = seeded_engine().await;
        let tokens = authority(s.engine.clone(), Arc::default(), Duration::from_secs(900));
        let t = Uuid::new_v4();
        let roles = s.engine.initialize_tenant_roles(t).await.unwrap();
        let user = s.repo.add_principal(Some(t), role_id(&roles, TENANT_USER), "u@t.test");

        let pair = tokens.issue_session(user.id).await.unwrap();
        let before = tokens.validate(&pair.access_token).unwrap();
        assert!(!before.permissions.contains(&"tenant_user:delete".to_string()));

        s.engine.assign_role_to_user(user.id, role_id(&roles, TENANT_ADMIN)).await.unwrap();
        let after = tokens.refresh(&pair.refresh_token).await.unwrap();
        let claims = tokens.validate(&after.access_token).unwrap();
        assert_eq!(claims.role, TENANT_ADMIN);
        assert!(claims.permissions.contains(&"tenant_user:delete".to_string()));
    }

    #[tokio::test]
    async fn revocation_blocks_refresh() {
        let s = seeded_engine().await;
        let tokens = authority(s.engine.clone(), Arc::default(), Duration::from_secs(900));
        let admin = s.repo.add_principal(None, role_id(&s.system_roles, SUPER_ADMIN), "root@platform.test");

        let a = tokens.issue_session(admin.id).await.unwrap();
        tokens.revoke(&a.refresh_token).await.unwrap();
        tokens.revoke(&a.refresh_token).await.unwrap();
        assert!(tokens.refresh(&a.refresh_token).await.is_err());

        let b = tokens.issue_session(admin.id).await.unwrap();
        let c = tokens.issue_session(admin.id).await.unwrap();
        assert_eq!(tokens.revoke_all_for_principal(admin.id).await.unwrap(), 2);
        assert!(tokens.refresh(&b.refresh_token).await.is_err());
        assert!(tokens.refresh(&c.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn ineligible_principals() {
        let s = seeded_engine().await;
        let tokens = authority(s.engine.clone(), Arc::default(), Duration::from_secs(900));
        let admin = s.repo.add_principal(None, role_id(&s.system_roles, SUPER_ADMIN), "root@platform.test");
        let pair = tokens.issue_session(admin.id).await.unwrap();

        s.repo.set_active(admin.id, false);
        assert!(matches!(tokens.issue_session(admin.id).await, Err(ServiceError::Forbidden(_))));
        assert!(matches!(tokens.refresh(&pair.refresh_token).await, Err(ServiceError::Unauthenticated)));

        let gone = s.repo.add_principal(None, role_id(&s.system_roles, SUPER_ADMIN), "gone@platform.test");
        let pair = tokens.issue_session(gone.id).await.unwrap();
        s.repo.remove_principal(gone.id);
        assert!(matches!(tokens.refresh(&pair.refresh_token).await, Err(ServiceError::Unauthenticated)));
    }

    #[tokio::test]
    async fn access_token_is_not_a_refresh_token() {
        let s = seeded_engine().await;
        let tokens = authority(s.engine.clone(), Arc::default(), Duration::from_secs(900));
        let admin = s.repo.add_principal(None, role_id(&s.system_roles, SUPER_ADMIN), "root@platform.test");
        let pair = tokens.issue_session(admin.id).await.unwrap();
        assert!(matches!(tokens.refresh(&pair.access_token).await, Err(ServiceError::Unauthenticated)));
    }
}
