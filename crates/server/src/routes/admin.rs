use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use service::context::RequestContext;
use service::errors::ServiceError;
use service::tenancy::{Tenant, TenantStatus};

use crate::errors::ApiError;
use crate::startup::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusInput {
    pub status: TenantStatus,
}

/// Change a tenant's lifecycle state. Takes effect on the next resolve.
pub async fn set_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(tenant_id): Path<Uuid>,
    Json(input): Json<StatusInput>,
) -> Result<Json<Tenant>, ApiError> {
    let actor = ctx.principal_id()?;
    // live grants, not the token snapshot
    if !state.engine.check_user_permission(actor, "tenant:update", Some(tenant_id)).await? {
        return Err(ServiceError::Forbidden("missing permission tenant:update".into()).into());
    }
    let tenant = state.lifecycle.set_status(tenant_id, input.status).await?;
    info!(target: "audit", actor = %actor, tenant_id = %tenant_id, status = %input.status, "tenant_status_changed");
    Ok(Json(tenant))
}
