//! HMAC-SHA256 sealing of the client-held session.
//!
//! Token format: `v1.<base64url(json)>.<base64url(mac)>` where the MAC covers
//! `v1.<payload>`. The payload is signed, not encrypted: it carries no secrets.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::session::Session;

type HmacSha256 = Hmac<Sha256>;

const VERSION: &str = "v1";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SealError {
    #[error("malformed session token")]
    Malformed,

    #[error("session signature mismatch")]
    BadSignature,

    #[error("session expired")]
    Expired,

    #[error("failed to encode session: {0}")]
    Encode(String),
}

/// Seals and opens session tokens with a server-side secret.
#[derive(Clone)]
pub struct SessionSealer {
    key: Vec<u8>,
}

impl core::fmt::Debug for SessionSealer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SessionSealer(**redacted**)")
    }
}

impl SessionSealer {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> Result<HmacSha256, SealError> {
        // HMAC accepts keys of any length.
        HmacSha256::new_from_slice(&self.key).map_err(|e| SealError::Encode(e.to_string()))
    }

    pub fn seal(&self, session: &Session) -> Result<String, SealError> {
        let json = serde_json::to_vec(session).map_err(|e| SealError::Encode(e.to_string()))?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signed = format!("{VERSION}.{payload}");

        let mut mac = self.mac()?;
        mac.update(signed.as_bytes());
        let tag = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{signed}.{tag}"))
    }

    /// Verify and decode a token. Pure: no revalidation happens here.
    pub fn open(&self, token: &str, now: DateTime<Utc>) -> Result<Session, SealError> {
        let mut parts = token.trim().splitn(3, '.');
        let (Some(version), Some(payload), Some(tag)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(SealError::Malformed);
        };
        if version != VERSION {
            return Err(SealError::Malformed);
        }

        let tag = URL_SAFE_NO_PAD.decode(tag).map_err(|_| SealError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(version.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        mac.verify_slice(&tag).map_err(|_| SealError::BadSignature)?;

        let json = URL_SAFE_NO_PAD.decode(payload).map_err(|_| SealError::Malformed)?;
        let session: Session = serde_json::from_slice(&json).map_err(|_| SealError::Malformed)?;

        if session.is_expired(now) {
            return Err(SealError::Expired);
        }
        Ok(session)
    }
}
