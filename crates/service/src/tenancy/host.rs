use std::net::IpAddr;

use crate::errors::ServiceError;

/// Where a host points before any storage lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostTarget {
    /// Platform traffic: the platform domain, a reserved prefix of it, a
    /// bare development base, or an IP literal.
    System,
    /// First label is a subdomain candidate. `host` is kept for the
    /// custom-domain fallback.
    Subdomain { label: String, host: String },
    /// Full host must match a verified domain mapping.
    Domain(String),
}

#[derive(Debug, Clone)]
pub struct HostRules {
    platform_domain: String,
    dev_bases: Vec<String>,
    reserved: Vec<String>,
}

fn lower_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.trim().to_ascii_lowercase()).collect()
}

/// Strip the port, a trailing dot and IPv6 brackets; lower-case.
pub fn normalize_host(raw: &str) -> Result<String, ServiceError> {
    let raw = raw.trim().to_ascii_lowercase();
    let host = if let Some(rest) = raw.strip_prefix('[') {
        rest.split_once(']').map(|(h, _)| h.to_string()).unwrap_or_default()
    } else if raw.matches(':').count() > 1 {
        raw
    } else {
        match raw.rsplit_once(':') {
            Some((h, port)) if port.chars().all(|c| c.is_ascii_digit()) => h.to_string(),
            Some(_) => return Err(ServiceError::Validation("host has an invalid port".into())),
            None => raw,
        }
    };
    let host = host.trim_end_matches('.').to_string();
    if host.is_empty() {
        return Err(ServiceError::Validation("host is empty".into()));
    }
    Ok(host)
}

impl HostRules {
    pub fn new(platform_domain: &str, dev_bases: &[String], reserved: &[String]) -> Self {
        Self {
            platform_domain: platform_domain.trim().to_ascii_lowercase(),
            dev_bases: lower_all(dev_bases),
            reserved: lower_all(reserved),
        }
    }

    fn is_base(&self, host: &str) -> bool {
        host == self.platform_domain || self.dev_bases.iter().any(|b| b == host)
    }

    /// Classify a raw `Host` header value.
    ///
    /// ```
    /// use service::tenancy::host::{HostRules, HostTarget};
    /// let rules = HostRules::new("example.com", &["localhost".into()], &["www".into(), "api".into()]);
    /// assert_eq!(rules.classify("www.example.com").unwrap(), HostTarget::System);
    /// assert_eq!(
    ///     rules.classify("acme.localhost:3000").unwrap(),
    ///     HostTarget::Subdomain { label: "acme".into(), host: "acme.localhost".into() }
    /// );
    /// assert_eq!(rules.classify("customer.com").unwrap(), HostTarget::Domain("customer.com".into()));
    /// ```
    pub fn classify(&self, raw: &str) -> Result<HostTarget, ServiceError> {
        let host = normalize_host(raw)?;
        if host.parse::<IpAddr>().is_ok() || self.is_base(&host) {
            return Ok(HostTarget::System);
        }
        if host.split('.').any(str::is_empty) {
            return Err(ServiceError::Validation(format!("malformed host {host}")));
        }
        let Some((first, rest)) = host.split_once('.') else {
            return Ok(HostTarget::Domain(host));
        };
        if self.reserved.iter().any(|r| r == first) {
            return Ok(if self.is_base(rest) { HostTarget::System } else { HostTarget::Domain(host) });
        }
        let label_count = host.split('.').count();
        if label_count == 2 && !self.dev_bases.iter().any(|b| b == rest) {
            return Ok(HostTarget::Domain(host));
        }
        Ok(HostTarget::Subdomain { label: first.to_string(), host: host.clone() })
    }
}
