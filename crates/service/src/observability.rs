use once_cell::sync::Lazy;
use prometheus::{register_int_counter, IntCounter};

// Prometheus metrics (default registry)
pub static TENANT_CACHE_HITS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tenancy_tenant_cache_hits_total",
        "Tenant lookups answered from cache"
    )
    .expect("register tenant_cache_hits_total")
});

pub static TENANT_CACHE_MISSES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tenancy_tenant_cache_misses_total",
        "Tenant lookups that went to storage"
    )
    .expect("register tenant_cache_misses_total")
});

pub static TENANT_CACHE_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tenancy_tenant_cache_errors_total",
        "Cache failures degraded to storage lookups"
    )
    .expect("register tenant_cache_errors_total")
});

pub static RESOLUTION_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tenancy_resolution_failures_total",
        "Hosts that did not resolve to an active tenant"
    )
    .expect("register resolution_failures_total")
});

pub static HANDLES_CREATED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tenancy_handles_created_total",
        "Tenant storage handles constructed"
    )
    .expect("register handles_created_total")
});

pub static HANDLES_EVICTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tenancy_handles_evicted_total",
        "Tenant storage handles evicted and closed"
    )
    .expect("register handles_evicted_total")
});

pub static PERMISSION_DENIALS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tenancy_permission_denials_total",
        "Permission checks that were denied"
    )
    .expect("register permission_denials_total")
});

pub static CROSS_TENANT_OVERRIDES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tenancy_cross_tenant_overrides_total",
        "Tenant-scope checks passed through the administer-any-tenant override"
    )
    .expect("register cross_tenant_overrides_total")
});

pub static TOKEN_REFRESHES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tenancy_token_refreshes_total",
        "Refresh tokens successfully rotated"
    )
    .expect("register token_refreshes_total")
});
