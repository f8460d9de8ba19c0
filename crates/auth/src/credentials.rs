//! Credential store boundary.
//!
//! The credential store is an external collaborator (the hosted data backend). It owns
//! password hashes and the "password last changed" timestamp; this crate only reads them,
//! presenting a shared static secret on every call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use subtle::ConstantTimeEq;
use thiserror::Error;

use keyward_core::UserId;

use crate::Role;

/// A static secret shared across a trust boundary.
///
/// `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret(String);

impl SharedSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Constant-time comparison against a presented value. An empty configured secret
    /// never matches.
    pub fn matches(&self, presented: &str) -> bool {
        if self.0.is_empty() {
            return false;
        }
        self.0.as_bytes().ct_eq(presented.as_bytes()).into()
    }
}

impl core::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SharedSecret(**redacted**)")
    }
}

/// Credential record as returned by the store.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub user_id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub password_hash: String,
    pub password_changed_at: DateTime<Utc>,
    pub role: Role,
}

impl core::fmt::Debug for Credential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("name", &self.name)
            .field("password_changed_at", &self.password_changed_at)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialStoreError {
    /// The presented shared secret was rejected.
    #[error("unauthorized")]
    Unauthorized,

    /// Network, configuration or backend failure.
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

/// Read-side contract of the credential store.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a credential by (normalized) e-mail. `Ok(None)` when unknown.
    async fn get_credentials_by_email(
        &self,
        secret: &SharedSecret,
        email: &str,
    ) -> Result<Option<Credential>, CredentialStoreError>;

    /// When the password for `email` last changed. `Ok(None)` when unknown.
    async fn get_password_changed_at(
        &self,
        secret: &SharedSecret,
        email: &str,
    ) -> Result<Option<DateTime<Utc>>, CredentialStoreError>;
}

#[async_trait::async_trait]
impl<S> CredentialStore for Arc<S>
where
    S: CredentialStore + ?Sized,
{
    async fn get_credentials_by_email(
        &self,
        secret: &SharedSecret,
        email: &str,
    ) -> Result<Option<Credential>, CredentialStoreError> {
        (**self).get_credentials_by_email(secret, email).await
    }

    async fn get_password_changed_at(
        &self,
        secret: &SharedSecret,
        email: &str,
    ) -> Result<Option<DateTime<Utc>>, CredentialStoreError> {
        (**self).get_password_changed_at(secret, email).await
    }
}
