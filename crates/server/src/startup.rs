use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use configs::AppConfig;
use dotenvy::dotenv;
use migration::MigratorTrait;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use service::auth::repo::seaorm::SeaOrmSessionRepository;
use service::auth::repository::SessionRepository;
use service::auth::service::TokenConfig;
use service::auth::TokenAuthority;
use service::rbac::repo::seaorm::SeaOrmRbacRepository;
use service::rbac::repository::RbacRepository;
use service::rbac::{PermissionCatalog, PermissionEngine};
use service::tenancy::cache::{MokaTenantCache, TenantCache};
use service::tenancy::repo::seaorm::{SchemaHandleFactory, SeaOrmTenantRepository, TenantDb};
use service::tenancy::repository::TenantRepository;
use service::tenancy::{ConnectionRouter, HandleFactory, ResolverConfig, TenantLifecycle, TenantResolver};

use crate::errors::StartupError;
use crate::routes;

/// Shared components, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<TenantResolver>,
    pub lifecycle: Arc<TenantLifecycle>,
    pub handles: Arc<ConnectionRouter<TenantDb>>,
    pub engine: Arc<PermissionEngine>,
    pub tokens: Arc<TokenAuthority>,
}

/// Storage seams; SeaORM in production, in-memory mocks in tests.
pub struct Backends {
    pub tenants: Arc<dyn TenantRepository>,
    pub rbac: Arc<dyn RbacRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub cache: Arc<dyn TenantCache>,
    pub handle_factory: Arc<dyn HandleFactory<TenantDb>>,
}

impl AppState {
    pub fn build(cfg: &AppConfig, backends: Backends) -> Result<Self, StartupError> {
        let lookup_timeout = Duration::from_millis(cfg.tenancy.lookup_timeout_ms);
        let resolver = Arc::new(TenantResolver::new(
            backends.tenants.clone(),
            backends.cache,
            ResolverConfig {
                platform_domain: cfg.tenancy.platform_domain.clone(),
                dev_base_domains: cfg.tenancy.dev_base_domains.clone(),
                reserved_prefixes: cfg.tenancy.reserved_prefixes.clone(),
                lookup_timeout,
            },
        ));
        let lifecycle = Arc::new(TenantLifecycle::new(backends.tenants, resolver.clone(), lookup_timeout));
        let handles = Arc::new(ConnectionRouter::new(backends.handle_factory, cfg.tenancy.max_tenant_handles, lookup_timeout));
        let engine = Arc::new(PermissionEngine::new(backends.rbac, lookup_timeout));
        let tokens = TokenAuthority::new(
            TokenConfig {
                secret: cfg.auth.jwt_secret.clone(),
                issuer: cfg.auth.issuer.clone(),
                access_ttl: Duration::from_secs(cfg.auth.access_token_ttl_secs),
                refresh_ttl: Duration::from_secs(cfg.auth.refresh_token_ttl_secs),
                timeout: lookup_timeout,
            },
            engine.clone(),
            backends.sessions,
        )
        .map_err(|e| StartupError::InvalidConfig(e.to_string()))?;
        Ok(Self { resolver, lifecycle, handles, engine, tokens: Arc::new(tokens) })
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::very_permissive()
}

fn bind_addr(cfg: &AppConfig) -> Result<SocketAddr, StartupError> {
    format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .map_err(|e| StartupError::InvalidConfig(format!("bind address: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

/// Public entry: load config, wire storage and serve until Ctrl+C.
pub async fn run() -> anyhow::Result<()> {
    dotenv().ok();
    let cfg = AppConfig::load_or_default().map_err(|e| StartupError::InvalidConfig(e.to_string()))?;

    // Panics on an inconsistent catalog before any traffic is accepted.
    let catalog = PermissionCatalog::global();
    info!(permissions = catalog.permissions().len(), roles = catalog.role_permission_defaults().len(), "permission catalog loaded");

    let db = models::db::connect_with_config(&cfg.database)
        .await
        .map_err(|e| StartupError::Database(e.to_string()))?;
    migration::Migrator::up(&db, None)
        .await
        .map_err(|e| StartupError::Database(format!("migrations: {e}")))?;
    info!("database migrations applied");

    let backends = Backends {
        tenants: Arc::new(SeaOrmTenantRepository { db: db.clone() }),
        rbac: Arc::new(SeaOrmRbacRepository { db: db.clone() }),
        sessions: Arc::new(SeaOrmSessionRepository { db: db.clone() }),
        cache: Arc::new(MokaTenantCache::new(
            Duration::from_secs(cfg.tenancy.cache_ttl_secs),
            cfg.tenancy.cache_capacity,
        )),
        handle_factory: Arc::new(SchemaHandleFactory { db, prefix: cfg.tenancy.schema_prefix.clone() }),
    };
    let state = AppState::build(&cfg, backends)?;

    let system_roles = state.engine.initialize_system_roles().await.map_err(StartupError::Seed)?;
    info!(roles = system_roles.len(), "system roles seeded");

    let app: Router = routes::build_router(state, build_cors(), Duration::from_secs(cfg.server.request_timeout_secs));

    let addr = bind_addr(&cfg)?;
    info!(%addr, platform_domain = %cfg.tenancy.platform_domain, "starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}
