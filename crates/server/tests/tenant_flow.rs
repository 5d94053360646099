use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use configs::AppConfig;
use server::routes::build_router;
use server::{AppState, Backends};
use service::auth::repository::mock::MockSessionRepository;
use service::errors::ServiceError;
use service::rbac::domain::Role;
use service::rbac::repository::mock::MockRbacRepository;
use service::tenancy::cache::MokaTenantCache;
use service::tenancy::repo::seaorm::{schema_name, TenantDb};
use service::tenancy::repository::mock::MockTenantRepository;
use service::tenancy::{HandleFactory, Tenant, TenantStatus};

struct OfflineSchemas;

#[async_trait::async_trait]
impl HandleFactory<TenantDb> for OfflineSchemas {
    async fn create(&self, tenant_id: Uuid) -> Result<TenantDb, ServiceError> {
        Ok(TenantDb::new(tenant_id, schema_name("tenant_", tenant_id), DatabaseConnection::Disconnected))
    }
}

struct World {
    app: Router,
    state: AppState,
    rbac: Arc<MockRbacRepository>,
    acme: Tenant,
    initech: Tenant,
    acme_roles: Vec<Role>,
    root: Uuid,
    acme_admin: Uuid,
    acme_user: Uuid,
}

fn role(roles: &[Role], name: &str) -> Uuid {
    roles.iter().find(|r| r.name == name).map(|r| r.id).expect("role seeded")
}

async fn world() -> anyhow::Result<World> {
    let mut cfg = AppConfig::default();
    cfg.auth.jwt_secret = "integration-secret".into();
    cfg.tenancy.platform_domain = "example.com".into();

    let tenants = Arc::new(MockTenantRepository::default());
    let acme = tenants.insert_tenant("Acme", "acme", TenantStatus::Active);
    let initech = tenants.insert_tenant("Initech", "initech", TenantStatus::Active);
    tenants.insert_tenant("Globex", "globex", TenantStatus::Suspended);

    let rbac = Arc::new(MockRbacRepository::default());
    let state = AppState::build(
        &cfg,
        Backends {
            tenants,
            rbac: rbac.clone(),
            sessions: Arc::new(MockSessionRepository::default()),
            cache: Arc::new(MokaTenantCache::new(Duration::from_secs(60), 1_000)),
            handle_factory: Arc::new(OfflineSchemas),
        },
    )?;

    let system_roles = state.engine.initialize_system_roles().await?;
    let acme_roles = state.engine.initialize_tenant_roles(acme.id).await?;
    state.engine.initialize_tenant_roles(initech.id).await?;

    let root = rbac.add_principal(None, role(&system_roles, "SUPER_ADMIN"), "root@platform.test").id;
    let acme_admin = rbac.add_principal(Some(acme.id), role(&acme_roles, "TENANT_ADMIN"), "admin@acme.test").id;
    let acme_user = rbac.add_principal(Some(acme.id), role(&acme_roles, "TENANT_USER"), "user@acme.test").id;

    let app = build_router(state.clone(), tower_http::cors::CorsLayer::very_permissive(), Duration::from_secs(5));
    Ok(World { app, state, rbac, acme, initech, acme_roles, root, acme_admin, acme_user })
}

async fn send(app: &Router, req: Request<Body>) -> anyhow::Result<(StatusCode, Value)> {
    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await?;
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
    Ok((status, body))
}

fn get(host: &str, uri: &str, token: Option<&str>) -> anyhow::Result<Request<Body>> {
    let mut b = Request::builder().method("GET").uri(uri).header("host", host);
    if let Some(t) = token {
        b = b.header("authorization", format!("Bearer {t}"));
    }
    Ok(b.body(Body::empty())?)
}

fn put_json(host: &str, uri: &str, token: &str, body: Value) -> anyhow::Result<Request<Body>> {
    Ok(Request::builder()
        .method("PUT")
        .uri(uri)
        .header("host", host)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body)?))?)
}

fn post_json(uri: &str, body: Value) -> anyhow::Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri(uri)
        .header("host", "example.com")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body)?))?)
}

#[tokio::test]
async fn health_and_metrics_are_public() -> anyhow::Result<()> {
    let w = world().await?;
    let (status, body) = send(&w.app, get("unknown.example.com", "/health", None)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let resp = w.app.clone().oneshot(get("example.com", "/metrics", None)?).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn tenant_context_follows_the_host() -> anyhow::Result<()> {
    let w = world().await?;

    let (status, body) = send(&w.app, get("acme.example.com", "/tenant/context", None)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant_id"], json!(w.acme.id));
    assert_eq!(body["slug"], "acme");
    assert_eq!(body["schema"], json!(schema_name("tenant_", w.acme.id)));
    // settings and custom domains are not exposed on this public route
    assert!(body.get("settings").is_none());
    assert!(body.get("tenant").is_none());
    assert!(body.get("custom_domains").is_none());

    let (status, body) = send(&w.app, get("nobody.example.com", "/tenant/context", None)?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = send(&w.app, get("globex.example.com", "/tenant/context", None)?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&w.app, get("www.example.com", "/tenant/context", None)?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    Ok(())
}

#[tokio::test]
async fn me_requires_a_valid_bearer_token() -> anyhow::Result<()> {
    let w = world().await?;
    let (status, body) = send(&w.app, get("acme.example.com", "/me", None)?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");

    let (status, _) = send(&w.app, get("acme.example.com", "/me", Some("garbage"))?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let pair = w.state.tokens.issue_session(w.acme_user).await?;
    let (status, body) = send(&w.app, get("acme.example.com", "/me", Some(&pair.access_token))?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["principal_id"], json!(w.acme_user));
    assert_eq!(body["tenant_id"], json!(w.acme.id));
    assert_eq!(body["request_tenant_id"], json!(w.acme.id));
    assert_eq!(body["role"], "TENANT_USER");
    Ok(())
}

#[tokio::test]
async fn suspension_applies_to_the_next_request() -> anyhow::Result<()> {
    let w = world().await?;
    let root = w.state.tokens.issue_session(w.root).await?;

    let (status, _) = send(&w.app, get("acme.example.com", "/tenant/context", None)?).await?;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/system/tenants/{}/status", w.acme.id);
    let (status, body) = send(&w.app, put_json("example.com", &uri, &root.access_token, json!({"status": "SUSPENDED"}))?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "SUSPENDED");

    let (status, _) = send(&w.app, get("acme.example.com", "/tenant/context", None)?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn tenant_admins_cannot_change_tenant_status() -> anyhow::Result<()> {
    let w = world().await?;
    let admin = w.state.tokens.issue_session(w.acme_admin).await?;
    let uri = format!("/system/tenants/{}/status", w.acme.id);
    let (status, body) = send(&w.app, put_json("acme.example.com", &uri, &admin.access_token, json!({"status": "INACTIVE"}))?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
    Ok(())
}

#[tokio::test]
async fn role_change_revokes_sessions_of_the_target() -> anyhow::Result<()> {
    let w = world().await?;
    let admin = w.state.tokens.issue_session(w.acme_admin).await?;
    let user = w.state.tokens.issue_session(w.acme_user).await?;

    let uri = format!("/tenant/users/{}/role", w.acme_user);
    let manager = role(&w.acme_roles, "TENANT_MANAGER");
    let (status, _) = send(&w.app, put_json("acme.example.com", &uri, &admin.access_token, json!({"role_id": manager}))?).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&w.app, post_json("/auth/refresh", json!({"refresh_token": user.refresh_token}))?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let fresh = w.state.tokens.issue_session(w.acme_user).await?;
    let claims = w.state.tokens.validate(&fresh.access_token)?;
    assert_eq!(claims.role, "TENANT_MANAGER");
    Ok(())
}

#[tokio::test]
async fn tenant_admin_token_does_not_work_on_another_tenant() -> anyhow::Result<()> {
    let w = world().await?;
    let admin = w.state.tokens.issue_session(w.acme_admin).await?;
    let uri = format!("/tenant/users/{}/role", w.acme_user);
    let user_role = role(&w.acme_roles, "TENANT_USER");
    let (status, _) = send(&w.app, put_json("initech.example.com", &uri, &admin.access_token, json!({"role_id": user_role}))?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_ne!(w.initech.id, w.acme.id);
    Ok(())
}

#[tokio::test]
async fn stale_token_is_caught_by_the_storage_check() -> anyhow::Result<()> {
    let w = world().await?;
    let admin = w.state.tokens.issue_session(w.acme_admin).await?;
    // deactivated after the token was minted
    w.rbac.set_active(w.acme_admin, false);

    let uri = format!("/tenant/users/{}/role", w.acme_user);
    let manager = role(&w.acme_roles, "TENANT_MANAGER");
    let (status, _) = send(&w.app, put_json("acme.example.com", &uri, &admin.access_token, json!({"role_id": manager}))?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn refresh_is_single_use_and_logout_is_idempotent() -> anyhow::Result<()> {
    let w = world().await?;
    let pair = w.state.tokens.issue_session(w.acme_user).await?;

    let (status, body) = send(&w.app, post_json("/auth/refresh", json!({"refresh_token": pair.refresh_token}))?).await?;
    assert_eq!(status, StatusCode::OK);
    let next_refresh = body["refresh_token"].as_str().unwrap_or_default().to_string();
    assert!(!next_refresh.is_empty());

    let (status, _) = send(&w.app, post_json("/auth/refresh", json!({"refresh_token": pair.refresh_token}))?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    for _ in 0..2 {
        let (status, _) = send(&w.app, post_json("/auth/logout", json!({"refresh_token": next_refresh}))?).await?;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
    let (status, _) = send(&w.app, post_json("/auth/refresh", json!({"refresh_token": next_refresh}))?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}
