use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionTrait};
use uuid::Uuid;

use crate::auth::domain::{NewSession, Session};
use crate::auth::repository::SessionRepository;
use crate::errors::ServiceError;
use models::user_session;

pub struct SeaOrmSessionRepository {
    pub db: DatabaseConnection,
}

fn to_domain(m: user_session::Model) -> Session {
    Session {
        id: m.id,
        principal_id: m.user_id,
        tenant_id: m.tenant_id,
        token_ref: m.token_ref,
        issued_at: m.issued_at.with_timezone(&Utc),
        expires_at: m.expires_at.with_timezone(&Utc),
        revoked_at: m.revoked_at.map(|t| t.with_timezone(&Utc)),
    }
}

fn to_active(s: NewSession) -> user_session::ActiveModel {
    user_session::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(s.principal_id),
        tenant_id: Set(s.tenant_id),
        token_ref: Set(s.token_ref),
        issued_at: Set(s.issued_at.into()),
        expires_at: Set(s.expires_at.into()),
        revoked_at: Set(None),
    }
}

/// `UPDATE user_session SET revoked_at = now WHERE <live> AND <filter>`
fn revoke_live<C>(now: DateTime<Utc>, filter: C) -> sea_orm::UpdateMany<user_session::Entity>
where
    C: sea_orm::sea_query::IntoCondition,
{
    user_session::Entity::update_many()
        .col_expr(user_session::Column::RevokedAt, Expr::value(Some(now.fixed_offset())))
        .filter(user_session::Column::RevokedAt.is_null())
        .filter(user_session::Column::ExpiresAt.gt(now.fixed_offset()))
        .filter(filter)
}

#[async_trait::async_trait]
impl SessionRepository for SeaOrmSessionRepository {
    async fn create(&self, session: NewSession) -> Result<Session, ServiceError> {
        let m = to_active(session).insert(&self.db).await?;
        Ok(to_domain(m))
    }

    async fn find_by_ref(&self, token_ref: &str) -> Result<Option<Session>, ServiceError> {
        let res = user_session::Entity::find()
            .filter(user_session::Column::TokenRef.eq(token_ref))
            .one(&self.db)
            .await?;
        Ok(res.map(to_domain))
    }

    async fn rotate(&self, old_ref: &str, next: NewSession, now: DateTime<Utc>) -> Result<bool, ServiceError> {
        let txn = self.db.begin().await?;
        let res = revoke_live(now, user_session::Column::TokenRef.eq(old_ref)).exec(&txn).await?;
        if res.rows_affected != 1 {
            txn.rollback().await?;
            return Ok(false);
        }
        to_active(next).insert(&txn).await?;
        txn.commit().await?;
        Ok(true)
    }

    async fn revoke(&self, token_ref: &str, now: DateTime<Utc>) -> Result<bool, ServiceError> {
        let res = revoke_live(now, user_session::Column::TokenRef.eq(token_ref)).exec(&self.db).await?;
        Ok(res.rows_affected > 0)
    }

    async fn revoke_all(&self, principal_id: Uuid, now: DateTime<Utc>) -> Result<u64, ServiceError> {
        let res = revoke_live(now, user_session::Column::UserId.eq(principal_id)).exec(&self.db).await?;
        Ok(res.rows_affected)
    }
}
