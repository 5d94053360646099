use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use models::tenant::TenantStatus;

use crate::errors::ServiceError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub subdomain: String,
    pub status: TenantStatus,
    pub settings: serde_json::Value,
    /// Verified custom domains.
    pub custom_domains: Vec<String>,
}

impl Tenant {
    pub fn is_active(&self) -> bool { self.status == TenantStatus::Active }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainMapping {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub domain: String,
    pub is_primary: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DomainMapping {
    pub fn is_verified(&self) -> bool { self.verified_at.is_some() }
}

/// Lower-case a custom domain and check it is a plausible DNS name with at
/// least two labels.
pub fn normalize_domain(raw: &str) -> Result<String, ServiceError> {
    let domain = raw.trim().trim_end_matches('.').to_ascii_lowercase();
    if domain.is_empty() || domain.len() > 253 {
        return Err(ServiceError::Validation("domain must be 1-253 characters".into()));
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(ServiceError::Validation(format!("domain {domain} needs at least two labels")));
    }
    for label in labels {
        let ok = !label.is_empty()
            && label.len() <= 63
            && label.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-');
        if !ok {
            return Err(ServiceError::Validation(format!("domain {domain} has an invalid label")));
        }
    }
    Ok(domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domains_are_normalized() {
        assert_eq!(normalize_domain(" Shop.Customer.COM. ").unwrap(), "shop.customer.com");
        for bad in ["", "localhost", "a..b", "-a.com", "a_b.com", "exa mple.com"] {
            assert!(normalize_domain(bad).is_err(), "{bad:?}");
        }
    }
}
