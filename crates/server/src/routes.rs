use std::time::Duration;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use common::metrics::encode_metrics;
use common::types::Health;

use crate::middleware::{bearer_auth, require_permission, tenant_context};
use crate::startup::AppState;

pub mod admin;
pub mod auth;
pub mod tenant;

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

pub async fn metrics() -> (axum::http::StatusCode, String) {
    encode_metrics()
}

/// Public, tenant-scoped, authenticated and permission-gated routes.
///
/// Middleware order per request: tenant context, bearer auth, then the
/// route's fast-path permission check.
pub fn build_router(state: AppState, cors: CorsLayer, request_timeout: Duration) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout));

    let user_role = Router::new()
        .route("/tenant/users/:id/role", put(tenant::assign_role))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            |s: State<AppState>, req: Request, next: Next| require_permission(s, req, next, "tenant_user:update"),
        ));

    let tenant_status = Router::new()
        .route("/system/tenants/:id/status", put(admin::set_status))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            |s: State<AppState>, req: Request, next: Next| require_permission(s, req, next, "tenant:update"),
        ));

    let authenticated = Router::new()
        .route("/me", get(tenant::me))
        .merge(user_role)
        .merge(tenant_status)
        .route_layer(middleware::from_fn_with_state(state.clone(), bearer_auth));

    let scoped = Router::new()
        .route("/tenant/context", get(tenant::context))
        .merge(authenticated)
        .route_layer(middleware::from_fn_with_state(state.clone(), tenant_context));

    public
        .merge(scoped)
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO).include_headers(false))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO).include_headers(false))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}
