use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use service::context::RequestContext;
use service::errors::ServiceError;

use crate::errors::ApiError;
use crate::startup::AppState;

/// Public view of the tenant behind a host. Settings and domains stay private.
#[derive(Debug, Serialize)]
pub struct TenantContextOutput {
    pub tenant_id: Uuid,
    pub slug: String,
    pub name: String,
    pub schema: String,
}

/// The tenant behind this host and its storage schema.
pub async fn context(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<TenantContextOutput>, ApiError> {
    let tenant = ctx.require_tenant()?;
    let handle = state.handles.get_handle(tenant.id).await?;
    Ok(Json(TenantContextOutput {
        tenant_id: tenant.id,
        slug: tenant.slug.clone(),
        name: tenant.name.clone(),
        schema: handle.schema().to_string(),
    }))
}

#[derive(Debug, Serialize)]
pub struct MeOutput {
    pub principal_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub role: String,
    pub permissions: Vec<String>,
    pub is_system: bool,
    pub request_tenant_id: Option<Uuid>,
}

pub async fn me(Extension(ctx): Extension<RequestContext>) -> Result<Json<MeOutput>, ApiError> {
    let claims = ctx.require_claims()?;
    Ok(Json(MeOutput {
        principal_id: ctx.principal_id()?,
        tenant_id: claims.tenant(),
        role: claims.role.clone(),
        permissions: claims.permissions.clone(),
        is_system: claims.is_system,
        request_tenant_id: ctx.tenant_id(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct AssignRoleInput {
    pub role_id: Uuid,
}

/// Move a user of this tenant to another role and end their sessions so
/// the next token carries the new permissions.
pub async fn assign_role(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(user_id): Path<Uuid>,
    Json(input): Json<AssignRoleInput>,
) -> Result<StatusCode, ApiError> {
    let tenant_id = ctx.require_tenant()?.id;
    let actor = ctx.principal_id()?;
    if !state.engine.check_user_permission(actor, "tenant_user:update", Some(tenant_id)).await? {
        return Err(ServiceError::Forbidden("missing permission tenant_user:update".into()).into());
    }
    let target = state.engine.principal_snapshot(user_id).await?;
    if target.tenant_id != Some(tenant_id) {
        return Err(ServiceError::not_found("principal").into());
    }
    state.engine.assign_role_to_user(user_id, input.role_id).await?;
    let revoked = state.tokens.revoke_all_for_principal(user_id).await?;
    info!(target: "audit", actor = %actor, principal_id = %user_id, role_id = %input.role_id, revoked, "role_assigned");
    Ok(StatusCode::NO_CONTENT)
}
