use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Registered claims of a service assertion (RFC 7519 names, seconds since epoch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    /// Subject: the user id.
    pub sub: String,

    /// Issuer: this service's canonical external URL.
    pub iss: String,

    /// Audience: the downstream data service.
    pub aud: String,

    /// Issued-at.
    pub iat: i64,

    /// Expiration.
    pub exp: i64,
}

impl AssertionClaims {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.iat, 0).single()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,

    #[error("issuer mismatch")]
    IssuerMismatch,

    #[error("audience mismatch")]
    AudienceMismatch,

    #[error("missing subject")]
    MissingSubject,
}

/// Deterministically validate assertion claims.
///
/// Signature verification happens before this, in `AssertionVerifier`. The token is
/// valid for `iat <= now <= exp`, with no leeway.
pub fn validate_claims(
    claims: &AssertionClaims,
    issuer: &str,
    audience: &str,
    now: DateTime<Utc>,
) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if claims.iss != issuer {
        return Err(TokenValidationError::IssuerMismatch);
    }
    if claims.aud != audience {
        return Err(TokenValidationError::AudienceMismatch);
    }
    if claims.sub.trim().is_empty() {
        return Err(TokenValidationError::MissingSubject);
    }

    let now = now.timestamp();
    if now < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now > claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
