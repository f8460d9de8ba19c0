//! Short-lived service assertions for the downstream data service.
//!
//! The downstream never sees the password or the session. It trusts an RS256-signed
//! assertion minted here on every session materialization and verifies issuer,
//! audience, signature and expiry itself.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use tracing::{error, warn};

use keyward_core::UserId;

use crate::AuthError;
use crate::claims::{AssertionClaims, TokenValidationError, validate_claims};

/// Fixed validity window of an assertion.
pub fn assertion_lifetime() -> Duration {
    Duration::hours(1)
}

/// Multi-line secrets stored in flat environment variables arrive with literal `\n`
/// escapes (and sometimes wrapping quotes).
pub fn normalize_pem(raw: &str) -> String {
    raw.trim().trim_matches('"').replace("\\n", "\n")
}

/// A freshly minted assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAssertion {
    pub token: String,
    pub claims: AssertionClaims,
}

impl ServiceAssertion {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims.expires_at()
    }
}

/// Mints assertions. A signer without a usable key returns `None` from `sign`.
pub struct ServiceAssertionSigner {
    key: Option<EncodingKey>,
    issuer: String,
    audience: String,
}

impl core::fmt::Debug for ServiceAssertionSigner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServiceAssertionSigner")
            .field("configured", &self.key.is_some())
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}

impl ServiceAssertionSigner {
    /// Strict constructor: fails on missing or malformed key material.
    pub fn try_from_pem(
        raw_private_key: &str,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let pem = normalize_pem(raw_private_key);
        if pem.is_empty() {
            return Err(AuthError::Configuration("assertion private key is empty".into()));
        }
        let key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::Configuration(format!("assertion private key: {e}")))?;
        Ok(Self {
            key: Some(key),
            issuer: issuer.into(),
            audience: audience.into(),
        })
    }

    /// Lenient constructor used at startup: a missing or broken key is logged and
    /// yields a signer that never signs, so login keeps working.
    pub fn from_secret(
        raw_private_key: Option<&str>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        let issuer = issuer.into();
        let audience = audience.into();
        match raw_private_key {
            Some(raw) => match Self::try_from_pem(raw, issuer.clone(), audience.clone()) {
                Ok(signer) => signer,
                Err(e) => {
                    error!(error = %e, "service assertions disabled");
                    Self::disabled(issuer, audience)
                }
            },
            None => {
                warn!("no assertion private key configured; service assertions disabled");
                Self::disabled(issuer, audience)
            }
        }
    }

    pub fn disabled(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            key: None,
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.key.is_some()
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Mint an assertion for `user_id`, valid for one hour from `now`.
    ///
    /// `None` means "the downstream cannot be called this request"; it is never a
    /// session error.
    pub fn sign(&self, user_id: Option<&UserId>, now: DateTime<Utc>) -> Option<ServiceAssertion> {
        let key = self.key.as_ref()?;
        let user_id = user_id?;

        let claims = AssertionClaims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: (now + assertion_lifetime()).timestamp(),
        };

        match jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, key) {
            Ok(token) => Some(ServiceAssertion { token, claims }),
            Err(e) => {
                error!(error = %e, "failed to sign service assertion");
                None
            }
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssertionError {
    #[error("assertion signature or encoding invalid: {0}")]
    Signature(String),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

/// Downstream-side verification of assertions.
pub struct AssertionVerifier {
    key: DecodingKey,
    issuer: String,
    audience: String,
}

impl AssertionVerifier {
    pub fn from_public_pem(
        raw_public_key: &str,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let key = DecodingKey::from_rsa_pem(normalize_pem(raw_public_key).as_bytes())
            .map_err(|e| AuthError::Configuration(format!("assertion public key: {e}")))?;
        Ok(Self {
            key,
            issuer: issuer.into(),
            audience: audience.into(),
        })
    }

    /// Verify signature first, then issuer, audience and time window at `now`.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<AssertionClaims, AssertionError> {
        let mut validation = Validation::new(Algorithm::RS256);
        // Time and audience checks run in `validate_claims` against the caller's clock.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = jsonwebtoken::decode::<AssertionClaims>(token, &self.key, &validation)
            .map_err(|e| AssertionError::Signature(e.to_string()))?;

        validate_claims(&data.claims, &self.issuer, &self.audience, now)?;
        Ok(data.claims)
    }
}
