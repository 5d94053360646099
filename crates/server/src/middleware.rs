use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, HOST};
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use service::context::RequestContext;
use service::errors::ServiceError;
use service::tenancy::Resolved;

use crate::errors::ApiError;
use crate::startup::AppState;

fn context_mut(req: &mut Request) -> &mut RequestContext {
    req.extensions_mut().get_or_insert_default::<RequestContext>()
}

/// Resolve the tenant from `Host` once and stash it in the request context.
/// Platform hosts pass through with no tenant.
pub async fn tenant_context(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().host())
        .ok_or_else(|| ServiceError::Validation("missing Host header".into()))?
        .to_string();
    let tenant = match state.resolver.resolve_host(&host).await? {
        Resolved::System => None,
        Resolved::Tenant(t) => Some(t),
    };
    debug!(host = %host, tenant_id = ?tenant.as_ref().map(|t| t.id), "request_tenant");
    context_mut(&mut req).tenant = tenant;
    Ok(next.run(req).await)
}

/// Require a valid access token in `Authorization: Bearer <token>`.
pub async fn bearer_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let header = req.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let claims = state.tokens.authenticate(header)?;
    context_mut(&mut req).claims = Some(claims);
    Ok(next.run(req).await)
}

/// Fast-path check against the token's permissions, scoped to the
/// request's tenant. Runs after [`tenant_context`] and [`bearer_auth`].
pub async fn require_permission(
    State(state): State<AppState>,
    req: Request,
    next: Next,
    permission: &'static str,
) -> Result<Response, ApiError> {
    let ctx = req.extensions().get::<RequestContext>().ok_or(ServiceError::Unauthenticated)?;
    if !state.engine.authorize_claims(ctx.require_claims()?, permission, ctx.tenant_id())? {
        return Err(ServiceError::Forbidden(format!("missing permission {permission}")).into());
    }
    Ok(next.run(req).await)
}
