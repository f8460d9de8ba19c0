use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use keyward_auth::password::{PasswordHashError, hash_password};
use keyward_auth::{Credential, CredentialStore, CredentialStoreError, Role, SharedSecret, normalize_email};
use keyward_core::UserId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error("an account with this email already exists")]
    AlreadyRegistered,

    #[error("invalid email address")]
    InvalidEmail,

    #[error("password must not be empty")]
    EmptyPassword,

    #[error("unknown account")]
    UnknownAccount,

    #[error(transparent)]
    Hash(#[from] PasswordHashError),

    #[error("credential store lock poisoned")]
    Poisoned,
}

/// In-memory credential store keyed by normalized e-mail.
///
/// Every read checks the shared secret, like the hosted backend does.
#[derive(Debug)]
pub struct InMemoryCredentialStore {
    secret: SharedSecret,
    accounts: RwLock<HashMap<String, Credential>>,
}

impl InMemoryCredentialStore {
    pub fn new(secret: SharedSecret) -> Self {
        Self {
            secret,
            accounts: RwLock::new(HashMap::new()),
        }
    }

    fn authorize(&self, presented: &SharedSecret) -> Result<(), CredentialStoreError> {
        if self.secret.matches(presented.expose()) {
            Ok(())
        } else {
            Err(CredentialStoreError::Unauthorized)
        }
    }

    /// Create an account. The password is hashed with Argon2id before it is stored.
    pub fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<Credential, AccountError> {
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(AccountError::InvalidEmail);
        }
        if password.is_empty() {
            return Err(AccountError::EmptyPassword);
        }
        let password_hash = hash_password(password)?;

        let mut accounts = self.accounts.write().map_err(|_| AccountError::Poisoned)?;
        if accounts.contains_key(&email) {
            return Err(AccountError::AlreadyRegistered);
        }

        let credential = Credential {
            user_id: UserId::new(),
            email: email.clone(),
            name: name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
            password_hash,
            password_changed_at: now,
            role,
        };
        accounts.insert(email, credential.clone());
        info!(user_id = %credential.user_id, "account registered");
        Ok(credential)
    }

    /// Replace the password and stamp `password_changed_at = now`.
    pub fn change_password(
        &self,
        email: &str,
        new_password: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, AccountError> {
        if new_password.is_empty() {
            return Err(AccountError::EmptyPassword);
        }
        let password_hash = hash_password(new_password)?;

        let mut accounts = self.accounts.write().map_err(|_| AccountError::Poisoned)?;
        let credential = accounts
            .get_mut(&normalize_email(email))
            .ok_or(AccountError::UnknownAccount)?;
        credential.password_hash = password_hash;
        credential.password_changed_at = now;
        info!(user_id = %credential.user_id, "password changed");
        Ok(now)
    }

    pub fn set_role(&self, email: &str, role: Role) -> Result<(), AccountError> {
        let mut accounts = self.accounts.write().map_err(|_| AccountError::Poisoned)?;
        let credential = accounts
            .get_mut(&normalize_email(email))
            .ok_or(AccountError::UnknownAccount)?;
        credential.role = role;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.accounts.read().map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get_credentials_by_email(
        &self,
        secret: &SharedSecret,
        email: &str,
    ) -> Result<Option<Credential>, CredentialStoreError> {
        self.authorize(secret)?;
        let accounts = self
            .accounts
            .read()
            .map_err(|_| CredentialStoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(accounts.get(&normalize_email(email)).cloned())
    }

    async fn get_password_changed_at(
        &self,
        secret: &SharedSecret,
        email: &str,
    ) -> Result<Option<DateTime<Utc>>, CredentialStoreError> {
        self.authorize(secret)?;
        let accounts = self
            .accounts
            .read()
            .map_err(|_| CredentialStoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(accounts
            .get(&normalize_email(email))
            .map(|c| c.password_changed_at))
    }
}
