use thiserror::Error;

use crate::errors::ServiceError;

/// Why a token was rejected. Internal only: callers outside the service
/// layer see a single `Unauthenticated`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is malformed: {0}")]
    Malformed(String),
}

impl TokenError {
    pub fn code(&self) -> u16 {
        match self {
            TokenError::InvalidSignature => 1102,
            TokenError::Expired => 1103,
            TokenError::Malformed(_) => 1104,
        }
    }
}

impl From<TokenError> for ServiceError {
    fn from(_: TokenError) -> Self { ServiceError::Unauthenticated }
}
