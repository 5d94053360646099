//! HS256 JWT encoding and verification for access and refresh tokens.

use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::TokenError;
use crate::rbac::matcher::Subject;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried by every token. Refresh tokens leave `role` and
/// `permissions` empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Principal id (UUID string).
    pub sub: String,
    /// Tenant id, empty for system principals.
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub is_system: bool,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub typ: TokenKind,
}

impl Claims {
    pub fn principal_id(&self) -> Option<Uuid> { Uuid::parse_str(&self.sub).ok() }

    pub fn tenant(&self) -> Option<Uuid> {
        if self.tenant_id.is_empty() { None } else { Uuid::parse_str(&self.tenant_id).ok() }
    }

    /// `None` when `is_system` and `tenant_id` disagree.
    pub fn subject(&self) -> Option<Subject> {
        match (self.is_system, self.tenant_id.is_empty()) {
            (true, true) => Some(Subject::System),
            (false, false) => self.tenant().map(Subject::Tenant),
            _ => None,
        }
    }
}

pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    access_ttl: i64,
    refresh_ttl: i64,
}

impl TokenCodec {
    pub fn new(secret: &str, issuer: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_string(),
            access_ttl: access_ttl.as_secs() as i64,
            refresh_ttl: refresh_ttl.as_secs() as i64,
        }
    }

    pub fn issuer(&self) -> &str { &self.issuer }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Malformed(format!("encode: {e}")))
    }

    fn envelope(&self, principal_id: Uuid, tenant_id: Option<Uuid>, typ: TokenKind, ttl: i64, now: i64) -> Claims {
        Claims {
            sub: principal_id.to_string(),
            tenant_id: tenant_id.map(|t| t.to_string()).unwrap_or_default(),
            role: String::new(),
            permissions: Vec::new(),
            is_system: tenant_id.is_none(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + ttl,
            jti: Uuid::new_v4().to_string(),
            typ,
        }
    }

    pub fn encode_access(
        &self,
        principal_id: Uuid,
        tenant_id: Option<Uuid>,
        role: &str,
        permissions: Vec<String>,
        now: i64,
    ) -> Result<(String, Claims), TokenError> {
        let mut claims = self.envelope(principal_id, tenant_id, TokenKind::Access, self.access_ttl, now);
        claims.role = role.to_string();
        claims.permissions = permissions;
        Ok((self.sign(&claims)?, claims))
    }

    pub fn encode_refresh(&self, principal_id: Uuid, tenant_id: Option<Uuid>, now: i64) -> Result<(String, Claims), TokenError> {
        let claims = self.envelope(principal_id, tenant_id, TokenKind::Refresh, self.refresh_ttl, now);
        Ok((self.sign(&claims)?, claims))
    }

    /// Verify signature, issuer and expiry (no leeway), then the token type
    /// and tenant binding.
    pub fn decode(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss"]);
        validation.leeway = 0;

        let claims = jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
                _ => TokenError::Malformed(e.to_string()),
            })?;

        if claims.typ != expected {
            return Err(TokenError::Malformed("unexpected token type".into()));
        }
        if claims.principal_id().is_none() {
            return Err(TokenError::Malformed("subject is not a principal id".into()));
        }
        if claims.subject().is_none() {
            return Err(TokenError::Malformed("tenant binding is inconsistent".into()));
        }
        Ok(claims)
    }
}
