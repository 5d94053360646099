use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::domain::{NewSession, Session};
use crate::errors::ServiceError;

/// Persistence for refresh-token sessions.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: NewSession) -> Result<Session, ServiceError>;
    async fn find_by_ref(&self, token_ref: &str) -> Result<Option<Session>, ServiceError>;
    /// Revoke `old_ref` if it is still live and record `next`, atomically.
    /// Returns `false` when `old_ref` was not live.
    async fn rotate(&self, old_ref: &str, next: NewSession, now: DateTime<Utc>) -> Result<bool, ServiceError>;
    /// Returns `false` when there was nothing live to revoke.
    async fn revoke(&self, token_ref: &str, now: DateTime<Utc>) -> Result<bool, ServiceError>;
    async fn revoke_all(&self, principal_id: Uuid, now: DateTime<Utc>) -> Result<u64, ServiceError>;
}

/// Simple in-memory mock repository for tests and doc examples
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MockSessionRepository {
        sessions: Mutex<HashMap<String, Session>>, // key: token_ref
    }

    impl MockSessionRepository {
        pub fn live_count(&self, principal_id: Uuid) -> usize {
            let now = Utc::now();
            self.sessions
                .lock()
                .unwrap()
                .values()
                .filter(|s| s.principal_id == principal_id && s.is_live(now))
                .count()
        }
    }

    fn materialize(new: NewSession) -> Session {
        Session {
            id: Uuid::new_v4(),
            principal_id: new.principal_id,
            tenant_id: new.tenant_id,
            token_ref: new.token_ref,
            issued_at: new.issued_at,
            expires_at: new.expires_at,
            revoked_at: None,
        }
    }

    #[async_trait]
    impl SessionRepository for MockSessionRepository {
        async fn create(&self, session: NewSession) -> Result<Session, ServiceError> {
            let mut sessions = self.sessions.lock().unwrap();
            if sessions.contains_key(&session.token_ref) {
                return Err(ServiceError::Validation("session reference already exists".into()));
            }
            let s = materialize(session);
            sessions.insert(s.token_ref.clone(), s.clone());
            Ok(s)
        }

        async fn find_by_ref(&self, token_ref: &str) -> Result<Option<Session>, ServiceError> {
            Ok(self.sessions.lock().unwrap().get(token_ref).cloned())
        }

        async fn rotate(&self, old_ref: &str, next: NewSession, now: DateTime<Utc>) -> Result<bool, ServiceError> {
            let mut sessions = self.sessions.lock().unwrap();
            match sessions.get_mut(old_ref) {
                Some(old) if old.is_live(now) => old.revoked_at = Some(now),
                _ => return Ok(false),
            }
            let s = materialize(next);
            sessions.insert(s.token_ref.clone(), s);
            Ok(true)
        }

        async fn revoke(&self, token_ref: &str, now: DateTime<Utc>) -> Result<bool, ServiceError> {
            let mut sessions = self.sessions.lock().unwrap();
            match sessions.get_mut(token_ref) {
                Some(s) if s.is_live(now) => {
                    s.revoked_at = Some(now);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn revoke_all(&self, principal_id: Uuid, now: DateTime<Utc>) -> Result<u64, ServiceError> {
            let mut sessions = self.sessions.lock().unwrap();
            let mut n = 0;
            for s in sessions.values_mut().filter(|s| s.principal_id == principal_id && s.is_live(now)) {
                s.revoked_at = Some(now);
                n += 1;
            }
            Ok(n)
        }
    }
}
