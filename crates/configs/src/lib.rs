use anyhow::anyhow;
use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub tenancy: TenancyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub worker_threads: Option<usize>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            worker_threads: Some(4),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
    #[serde(default)]
    pub sqlx_logging: bool,
}

/// Token signing settings. The secret is process-wide; rotation is not supported.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_secs: u64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: default_issuer(),
            access_token_ttl_secs: default_access_ttl(),
            refresh_token_ttl_secs: default_refresh_ttl(),
        }
    }
}

/// Host resolution, cache and per-tenant storage settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TenancyConfig {
    /// Apex domain of the platform itself, e.g. `example.com`.
    #[serde(default = "default_platform_domain")]
    pub platform_domain: String,
    /// Two-label hosts under these bases are treated as `<subdomain>.<base>`.
    #[serde(default = "default_dev_bases")]
    pub dev_base_domains: Vec<String>,
    #[serde(default = "default_reserved_prefixes")]
    pub reserved_prefixes: Vec<String>,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_ms: u64,
    /// `None` keeps every tenant handle for the process lifetime.
    #[serde(default)]
    pub max_tenant_handles: Option<usize>,
    #[serde(default = "default_schema_prefix")]
    pub schema_prefix: String,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            platform_domain: default_platform_domain(),
            dev_base_domains: default_dev_bases(),
            reserved_prefixes: default_reserved_prefixes(),
            cache_ttl_secs: default_cache_ttl(),
            cache_capacity: default_cache_capacity(),
            lookup_timeout_ms: default_lookup_timeout(),
            max_tenant_handles: None,
            schema_prefix: default_schema_prefix(),
        }
    }
}

fn default_request_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 30 }
fn default_acquire_timeout() -> u64 { 30 }
fn default_issuer() -> String { "tenancy-gate".into() }
fn default_access_ttl() -> u64 { 15 * 60 }
fn default_refresh_ttl() -> u64 { 7 * 24 * 3600 }
fn default_platform_domain() -> String { "localhost".into() }
fn default_dev_bases() -> Vec<String> { vec!["localhost".into()] }
fn default_reserved_prefixes() -> Vec<String> { vec!["www".into(), "api".into()] }
fn default_cache_ttl() -> u64 { 15 * 60 }
fn default_cache_capacity() -> u64 { 10_000 }
fn default_lookup_timeout() -> u64 { 3_000 }
fn default_schema_prefix() -> String { "tenant_".into() }

/// Longest cache TTL accepted; stale tenant state must age out within minutes.
pub const MAX_CACHE_TTL_SECS: u64 = 3600;

pub fn load_default() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    load_from_file(&path)
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    load_from_str(&content)
}

pub fn load_from_str(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

impl AppConfig {
    pub fn load_and_validate() -> Result<Self> {
        let mut cfg = load_default()?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    /// Like [`AppConfig::load_and_validate`], but a missing config file falls
    /// back to defaults plus environment variables.
    pub fn load_or_default() -> Result<Self> {
        let mut cfg = match load_default() {
            Ok(cfg) => cfg,
            Err(e) if is_not_found(&e) => AppConfig::default(),
            Err(e) => return Err(e),
        };
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.server.normalize()?;
        // DATABASE_URL fills an empty url
        self.database.normalize_from_env();
        self.database.validate()?;
        self.auth.normalize_from_env();
        self.auth.validate()?;
        self.tenancy.normalize_from_env();
        self.tenancy.validate()?;
        Ok(())
    }
}

fn is_not_found(e: &anyhow::Error) -> bool {
    e.downcast_ref::<std::io::Error>()
        .map(|io| io.kind() == std::io::ErrorKind::NotFound)
        .unwrap_or(false)
}

impl ServerConfig {
    fn normalize(&mut self) -> Result<()> {
        if self.host.trim().is_empty() {
            self.host = "127.0.0.1".to_string();
        }
        if self.port == 0 {
            return Err(anyhow!("server.port must be in 1..=65535"));
        }
        match self.worker_threads {
            Some(0) | None => self.worker_threads = Some(4),
            Some(_) => {}
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_request_timeout();
        }
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn normalize_from_env(&mut self) {
        if self.url.trim().is_empty() {
            if let Ok(url) = std::env::var("DATABASE_URL") {
                self.url = url;
            }
        }
    }

    /// An empty URL is allowed here; the server refuses to start without one.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Ok(());
        }
        let lower = self.url.to_lowercase();
        if !(lower.starts_with("postgresql://") || lower.starts_with("postgres://")) {
            return Err(anyhow!("database.url must start with postgresql:// or postgres://"));
        }
        if self.min_connections == 0 {
            return Err(anyhow!("database.min_connections must be >= 1"));
        }
        if self.max_connections < self.min_connections {
            return Err(anyhow!("database.max_connections must be >= min_connections"));
        }
        if self.connect_timeout_secs == 0 || self.acquire_timeout_secs == 0 {
            return Err(anyhow!("database timeouts must be positive seconds"));
        }
        Ok(())
    }
}

impl AuthConfig {
    pub fn normalize_from_env(&mut self) {
        if self.jwt_secret.trim().is_empty() {
            if let Ok(secret) = std::env::var("JWT_SECRET") {
                self.jwt_secret = secret;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.trim().is_empty() {
            return Err(anyhow!("auth.jwt_secret is empty; set it in config.toml or JWT_SECRET"));
        }
        if self.access_token_ttl_secs == 0 || self.refresh_token_ttl_secs == 0 {
            return Err(anyhow!("auth token lifetimes must be positive"));
        }
        if self.refresh_token_ttl_secs < self.access_token_ttl_secs {
            return Err(anyhow!("auth.refresh_token_ttl_secs must be >= access_token_ttl_secs"));
        }
        Ok(())
    }
}

impl TenancyConfig {
    pub fn normalize_from_env(&mut self) {
        if let Ok(domain) = std::env::var("PLATFORM_DOMAIN") {
            if !domain.trim().is_empty() {
                self.platform_domain = domain;
            }
        }
        self.platform_domain = self.platform_domain.trim().trim_end_matches('.').to_lowercase();
        for list in [&mut self.dev_base_domains, &mut self.reserved_prefixes] {
            for item in list.iter_mut() {
                *item = item.trim().to_lowercase();
            }
            list.retain(|s| !s.is_empty());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.platform_domain.is_empty() {
            return Err(anyhow!("tenancy.platform_domain is empty"));
        }
        if self.cache_ttl_secs == 0 || self.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(anyhow!("tenancy.cache_ttl_secs must be in 1..={MAX_CACHE_TTL_SECS}"));
        }
        if self.lookup_timeout_ms == 0 {
            return Err(anyhow!("tenancy.lookup_timeout_ms must be positive"));
        }
        if matches!(self.max_tenant_handles, Some(0)) {
            return Err(anyhow!("tenancy.max_tenant_handles must be >= 1 when set"));
        }
        let prefix_ok = !self.schema_prefix.is_empty()
            && self.schema_prefix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            && self.schema_prefix.starts_with(|c: char| c.is_ascii_lowercase());
        if !prefix_ok {
            return Err(anyhow!("tenancy.schema_prefix must match [a-z][a-z0-9_]*"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file_with_defaults() {
        let cfg = load_from_str(
            r#"
            [server]
            host = "0.0.0.0"
            port = 9000

            [auth]
            jwt_secret = "s3cret"

            [tenancy]
            platform_domain = "Example.COM."
            max_tenant_handles = 64
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.auth.issuer, "tenancy-gate");
        assert_eq!(cfg.tenancy.cache_ttl_secs, 900);
        assert_eq!(cfg.tenancy.reserved_prefixes, vec!["www", "api"]);
        assert_eq!(cfg.tenancy.max_tenant_handles, Some(64));
    }

    #[test]
    fn tenancy_normalizes_domain() {
        let mut t = TenancyConfig {
            platform_domain: " Example.COM. ".into(),
            reserved_prefixes: vec!["WWW".into(), " ".into()],
            ..TenancyConfig::default()
        };
        // PLATFORM_DOMAIN may be set in the environment; only check shape.
        t.normalize_from_env();
        assert_eq!(t.platform_domain, t.platform_domain.to_lowercase());
        assert!(!t.platform_domain.ends_with('.'));
        assert_eq!(t.reserved_prefixes, vec!["www"]);
    }

    #[test]
    fn rejects_unbounded_cache_ttl() {
        let t = TenancyConfig { cache_ttl_secs: MAX_CACHE_TTL_SECS + 1, ..TenancyConfig::default() };
        assert!(t.validate().is_err());
        let t = TenancyConfig { cache_ttl_secs: 60, ..TenancyConfig::default() };
        assert!(t.validate().is_ok());
    }

    #[test]
    fn rejects_unsafe_schema_prefix() {
        let t = TenancyConfig { schema_prefix: "tenant\";drop".into(), ..TenancyConfig::default() };
        assert!(t.validate().is_err());
    }

    #[test]
    fn auth_requires_secret_and_ordered_ttls() {
        let a = AuthConfig { jwt_secret: "x".into(), ..AuthConfig::default() };
        assert!(a.validate().is_ok());
        let a = AuthConfig {
            jwt_secret: "x".into(),
            access_token_ttl_secs: 100,
            refresh_token_ttl_secs: 10,
            ..AuthConfig::default()
        };
        assert!(a.validate().is_err());
    }

    #[test]
    fn database_url_scheme_checked() {
        let d = DatabaseConfig { url: "mysql://x".into(), min_connections: 1, max_connections: 2, connect_timeout_secs: 1, acquire_timeout_secs: 1, sqlx_logging: false };
        assert!(d.validate().is_err());
        let d = DatabaseConfig { url: "postgres://u@h/db".into(), ..d };
        assert!(d.validate().is_ok());
    }
}
