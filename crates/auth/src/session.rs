//! Stateless sessions: password verification and the client-held session record.
//!
//! There is no server-side session table. A `Session` is its own record; `seal` binds
//! it to the server secret and the client carries it between requests.

use std::sync::OnceLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use keyward_core::UserId;

use crate::credentials::{CredentialStore, SharedSecret};
use crate::password::{hash_password, verify_password};
use crate::principal::normalize_email;
use crate::{AuthError, Identity, Role};

/// Fixed session lifetime, counted from `issued_at`.
pub fn session_ttl() -> Duration {
    Duration::days(7)
}

/// The client-held session record.
///
/// `force_logout` is terminal: it can be set but never cleared. `last_checked_at`
/// never moves backwards. `email` is the display address and may be patched;
/// `credential_email` is the address the credential store knows and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub email: String,
    pub name: Option<String>,
    #[serde(default)]
    pub role: Role,
    credential_email: String,
    issued_at: DateTime<Utc>,
    last_checked_at: DateTime<Utc>,
    #[serde(default)]
    force_logout: bool,
}

/// Profile fields that may be patched onto a live session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Session {
    /// Seal a freshly verified identity into a new session.
    pub fn issue(identity: &Identity, now: DateTime<Utc>) -> Self {
        Self {
            user_id: identity.id,
            email: identity.email.clone(),
            name: identity.name.clone(),
            role: identity.role,
            credential_email: normalize_email(&identity.email),
            issued_at: now,
            last_checked_at: now,
            force_logout: false,
        }
    }

    pub fn identity(&self) -> Identity {
        Identity {
            id: self.user_id,
            email: self.email.clone(),
            name: self.name.clone(),
            role: self.role,
        }
    }

    /// Address used for revalidation and revocation lookups.
    pub fn credential_email(&self) -> &str {
        &self.credential_email
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn last_checked_at(&self) -> DateTime<Utc> {
        self.last_checked_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + session_ttl()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    pub fn force_logout(&self) -> bool {
        self.force_logout
    }

    /// Patch display name and/or e-mail without re-verifying the password.
    pub fn apply_profile_update(&mut self, update: ProfileUpdate) {
        if let Some(name) = update.name {
            let name = name.trim().to_string();
            self.name = if name.is_empty() { None } else { Some(name) };
        }
        if let Some(email) = update.email {
            let email = normalize_email(&email);
            if !email.is_empty() {
                self.email = email;
            }
        }
    }

    pub(crate) fn mark_force_logout(&mut self) {
        self.force_logout = true;
    }

    pub(crate) fn record_check(&mut self, now: DateTime<Utc>) {
        if now > self.last_checked_at {
            self.last_checked_at = now;
        }
    }
}

/// Verifies e-mail + password against the credential store.
pub struct SessionIssuer<S> {
    store: S,
    secret: SharedSecret,
}

impl<S: CredentialStore> SessionIssuer<S> {
    pub fn new(store: S, secret: SharedSecret) -> Self {
        Self { store, secret }
    }

    /// Verify credentials and return the identity.
    ///
    /// Unknown e-mail and wrong password return the same `InvalidCredentials` and cost
    /// the same single Argon2 verification.
    #[instrument(skip(self, password), fields(email = %normalize_email(email)))]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let email = normalize_email(email);

        let credential = if email.is_empty() {
            None
        } else {
            self.store
                .get_credentials_by_email(&self.secret, &email)
                .await
                .map_err(|e| {
                    warn!(error = %e, "credential lookup failed");
                    AuthError::from(e)
                })?
        };

        match credential {
            Some(c) if verify_password(&c.password_hash, password) => Ok(Identity {
                id: c.user_id,
                email: c.email,
                name: c.name,
                role: c.role,
            }),
            Some(_) => {
                info!("authentication failed");
                Err(AuthError::InvalidCredentials)
            }
            None => {
                if let Some(dummy) = dummy_hash() {
                    let _ = verify_password(dummy, password);
                }
                info!("authentication failed");
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// `authenticate` followed by issuing a session stamped `now`.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, AuthError> {
        let identity = self.authenticate(email, password).await?;
        info!(user_id = %identity.id, "session issued");
        Ok(Session::issue(&identity, now))
    }
}

/// Hash verified when the e-mail is unknown, so both failure paths do the same work.
fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| hash_password("keyward-timing-equalizer").ok())
        .as_deref()
}
