use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::rbac::catalog::{PermissionCatalog, PermissionDef, PermissionScope};
use crate::rbac::domain::{NewRole, Permission, Principal, PrincipalGrants, Role, RoleWithPermissions};
use crate::rbac::repository::RbacRepository;
use models::{permission, role, role_permission, user, user_permission};

const ACTIVE: &str = "ACTIVE";

pub struct SeaOrmRbacRepository {
    pub db: DatabaseConnection,
}

fn permission_to_domain(m: permission::Model) -> Permission {
    let scope = PermissionCatalog::global().scope_of(&m.name).unwrap_or(if m.is_system_permission {
        PermissionScope::System
    } else {
        PermissionScope::Tenant
    });
    Permission { id: m.id, name: m.name, resource: m.resource, action: m.action, scope, description: m.description }
}

fn role_to_domain(m: role::Model) -> Role {
    Role {
        id: m.id,
        tenant_id: m.tenant_id,
        name: m.name,
        description: m.description,
        is_system_role: m.is_system_role,
        is_default: m.is_default,
    }
}

fn user_to_principal(m: user::Model) -> Principal {
    Principal { active: m.status.eq_ignore_ascii_case(ACTIVE), id: m.id, tenant_id: m.tenant_id, role_id: m.role_id, email: m.email }
}

async fn permissions_by_ids<C: ConnectionTrait>(db: &C, ids: Vec<Uuid>) -> Result<Vec<Permission>, ServiceError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = permission::Entity::find()
        .filter(permission::Column::Id.is_in(ids))
        .order_by_asc(permission::Column::Name)
        .all(db)
        .await?;
    Ok(rows.into_iter().map(permission_to_domain).collect())
}

async fn role_permissions<C: ConnectionTrait>(db: &C, role_id: Uuid) -> Result<Vec<Permission>, ServiceError> {
    let ids = role_permission::Entity::find()
        .filter(role_permission::Column::RoleId.eq(role_id))
        .all(db)
        .await?
        .into_iter()
        .map(|rp| rp.permission_id)
        .collect();
    permissions_by_ids(db, ids).await
}

async fn insert_role_permissions<C: ConnectionTrait>(db: &C, role_id: Uuid, permission_ids: &[Uuid]) -> Result<(), ServiceError> {
    if permission_ids.is_empty() {
        return Ok(());
    }
    let rows = permission_ids
        .iter()
        .map(|&permission_id| role_permission::ActiveModel { role_id: Set(role_id), permission_id: Set(permission_id) });
    role_permission::Entity::insert_many(rows).exec(db).await?;
    Ok(())
}

fn scope_filter(tenant_id: Option<Uuid>) -> sea_orm::sea_query::SimpleExpr {
    match tenant_id {
        Some(t) => role::Column::TenantId.eq(t),
        None => role::Column::TenantId.is_null(),
    }
}

#[async_trait::async_trait]
impl RbacRepository for SeaOrmRbacRepository {
    async fn load_grants(&self, principal_id: Uuid) -> Result<Option<PrincipalGrants>, ServiceError> {
        let Some(principal) = self.find_principal(principal_id).await? else { return Ok(None) };
        let role = role::Entity::find_by_id(principal.role_id)
            .one(&self.db)
            .await?
            .map(role_to_domain)
            .ok_or_else(|| ServiceError::InvalidState(format!("principal {principal_id} references a missing role")))?;
        let role_permissions = role_permissions(&self.db, role.id).await?;
        let direct_ids = user_permission::Entity::find()
            .filter(user_permission::Column::UserId.eq(principal_id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|up| up.permission_id)
            .collect();
        let direct_permissions = permissions_by_ids(&self.db, direct_ids).await?;
        Ok(Some(PrincipalGrants { principal, role, role_permissions, direct_permissions }))
    }

    async fn find_principal(&self, principal_id: Uuid) -> Result<Option<Principal>, ServiceError> {
        let res = user::Entity::find_by_id(principal_id)
            .filter(user::Column::DeletedAt.is_null())
            .one(&self.db)
            .await?;
        Ok(res.map(user_to_principal))
    }

    async fn find_role(&self, role_id: Uuid) -> Result<Option<Role>, ServiceError> {
        Ok(role::Entity::find_by_id(role_id).one(&self.db).await?.map(role_to_domain))
    }

    async fn find_role_by_name(&self, tenant_id: Option<Uuid>, name: &str) -> Result<Option<Role>, ServiceError> {
        let res = role::Entity::find()
            .filter(scope_filter(tenant_id))
            .filter(role::Column::Name.eq(name))
            .one(&self.db)
            .await?;
        Ok(res.map(role_to_domain))
    }

    async fn list_roles(&self, tenant_id: Option<Uuid>) -> Result<Vec<RoleWithPermissions>, ServiceError> {
        let roles = role::Entity::find()
            .filter(scope_filter(tenant_id))
            .order_by_asc(role::Column::Name)
            .all(&self.db)
            .await?;
        let mut out = Vec::with_capacity(roles.len());
        for r in roles {
            let permissions = role_permissions(&self.db, r.id).await?.into_iter().map(|p| p.name).collect();
            out.push(RoleWithPermissions { role: role_to_domain(r), permissions });
        }
        Ok(out)
    }

    async fn find_permissions(&self, names: &[String]) -> Result<Vec<Permission>, ServiceError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let rows = permission::Entity::find()
            .filter(permission::Column::Name.is_in(names.iter().cloned()))
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(permission_to_domain).collect())
    }

    async fn upsert_permission(&self, def: &PermissionDef) -> Result<Permission, ServiceError> {
        if let Some(existing) = permission::Entity::find()
            .filter(permission::Column::Name.eq(def.name.as_str()))
            .one(&self.db)
            .await?
        {
            return Ok(permission_to_domain(existing));
        }
        let am = permission::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(def.name.clone()),
            resource: Set(def.resource.clone()),
            action: Set(def.action.clone()),
            description: Set(Some(def.description.to_string())),
            is_system_permission: Set(def.is_system_scope()),
        };
        Ok(permission_to_domain(am.insert(&self.db).await?))
    }

    async fn create_role(&self, new: NewRole, permission_ids: &[Uuid]) -> Result<Role, ServiceError> {
        let txn = self.db.begin().await?;
        let am = role::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(new.tenant_id),
            name: Set(new.name),
            description: Set(new.description),
            is_system_role: Set(new.is_system_role),
            is_default: Set(new.is_default),
            created_at: Set(Utc::now().into()),
        };
        let created = am.insert(&txn).await?;
        insert_role_permissions(&txn, created.id, permission_ids).await?;
        txn.commit().await?;
        Ok(role_to_domain(created))
    }

    async fn replace_role_permissions(&self, role_id: Uuid, permission_ids: &[Uuid]) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        if role::Entity::find_by_id(role_id).one(&txn).await?.is_none() {
            txn.rollback().await?;
            return Err(ServiceError::not_found("role"));
        }
        role_permission::Entity::delete_many()
            .filter(role_permission::Column::RoleId.eq(role_id))
            .exec(&txn)
            .await?;
        insert_role_permissions(&txn, role_id, permission_ids).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn set_principal_role(&self, principal_id: Uuid, role_id: Uuid) -> Result<(), ServiceError> {
        let res = user::Entity::update_many()
            .col_expr(user::Column::RoleId, sea_orm::sea_query::Expr::value(role_id))
            .col_expr(user::Column::UpdatedAt, sea_orm::sea_query::Expr::value(Utc::now().fixed_offset()))
            .filter(user::Column::Id.eq(principal_id))
            .filter(user::Column::DeletedAt.is_null())
            .exec(&self.db)
            .await?;
        if res.rows_affected == 0 {
            return Err(ServiceError::not_found("principal"));
        }
        Ok(())
    }
}
