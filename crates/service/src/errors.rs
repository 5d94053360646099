use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("authentication required")]
    Unauthenticated,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("database error: {0}")]
    Db(String),
    #[error("cache error: {0}")]
    Cache(String),
    #[error("model error: {0}")]
    Model(#[from] models::errors::ModelError),
}

impl ServiceError {
    pub fn not_found(entity: &str) -> Self { Self::NotFound(format!("{} not found", entity)) }

    /// Prefix storage and cache errors with the operation that failed.
    pub fn context(self, what: &str) -> Self {
        match self {
            ServiceError::Db(msg) => ServiceError::Db(format!("{what}: {msg}")),
            ServiceError::Cache(msg) => ServiceError::Cache(format!("{what}: {msg}")),
            other => other,
        }
    }

    /// Stable numeric code for external mapping/logging
    pub fn code(&self) -> u16 {
        match self {
            ServiceError::Validation(_) => 1001,
            ServiceError::NotFound(_) => 1003,
            ServiceError::InvalidState(_) => 1005,
            ServiceError::Unauthenticated => 1004,
            ServiceError::Forbidden(_) => 1006,
            ServiceError::Timeout(_) => 1300,
            ServiceError::Db(_) => 1200,
            ServiceError::Cache(_) => 1201,
            ServiceError::Model(_) => 1002,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) | ServiceError::Model(_) => "VALIDATION_ERROR",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::InvalidState(_) => "INVALID_STATE",
            ServiceError::Unauthenticated => "UNAUTHENTICATED",
            ServiceError::Forbidden(_) => "FORBIDDEN",
            ServiceError::Timeout(_) => "TIMEOUT",
            ServiceError::Db(_) | ServiceError::Cache(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<sea_orm::DbErr> for ServiceError {
    fn from(e: sea_orm::DbErr) -> Self { ServiceError::Db(e.to_string()) }
}
