use std::fmt;
use std::str::FromStr;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::ModelError;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tenant")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub slug: String,
    #[sea_orm(unique)]
    pub subdomain: String,
    pub status: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub settings: Json,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
    pub deleted_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::domain_mapping::Entity")]
    DomainMapping,
}

impl Related<super::domain_mapping::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DomainMapping.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Lifecycle state of a tenant. Only `Active` tenants are served.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantStatus {
    Active,
    Inactive,
    Suspended,
    Pending,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "ACTIVE",
            TenantStatus::Inactive => "INACTIVE",
            TenantStatus::Suspended => "SUSPENDED",
            TenantStatus::Pending => "PENDING",
        }
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(TenantStatus::Active),
            "INACTIVE" => Ok(TenantStatus::Inactive),
            "SUSPENDED" => Ok(TenantStatus::Suspended),
            "PENDING" => Ok(TenantStatus::Pending),
            other => Err(ModelError::Validation(format!("unknown tenant status: {other}"))),
        }
    }
}

/// Slugs and subdomains: 3–30 chars of `a-z` and `-`, letter at both ends, no `--`.
pub fn validate_slug(slug: &str) -> Result<(), ModelError> {
    let len = slug.chars().count();
    if !(3..=30).contains(&len) {
        return Err(ModelError::Validation("slug must be 3-30 characters".into()));
    }
    if !slug.chars().all(|c| c.is_ascii_lowercase() || c == '-') {
        return Err(ModelError::Validation("slug may only contain lowercase letters and hyphens".into()));
    }
    let starts = slug.starts_with(|c: char| c.is_ascii_lowercase());
    let ends = slug.ends_with(|c: char| c.is_ascii_lowercase());
    if !starts || !ends {
        return Err(ModelError::Validation("slug must start and end with a letter".into()));
    }
    if slug.contains("--") {
        return Err(ModelError::Validation("slug must not contain consecutive hyphens".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_rules() {
        for ok in ["acme", "acme-corp", "abc"] {
            assert!(validate_slug(ok).is_ok(), "{ok}");
        }
        for bad in ["ab", "Acme", "acme-", "-acme", "ac--me", "acme1", "a".repeat(31).as_str()] {
            assert!(validate_slug(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn status_parse_roundtrip() {
        for s in [TenantStatus::Active, TenantStatus::Inactive, TenantStatus::Suspended, TenantStatus::Pending] {
            assert_eq!(s.as_str().parse::<TenantStatus>().unwrap(), s);
        }
        assert_eq!("active".parse::<TenantStatus>().unwrap(), TenantStatus::Active);
        assert!("deleted".parse::<TenantStatus>().is_err());
    }
}
