//! JSON client for the hosted credential backend.
//!
//! Endpoints (relative to the base URL), each authenticated with the shared secret in the
//! `x-keyward-secret` header:
//!
//! - `POST /credentials/lookup` `{email}` → credential record, `null`, or 404
//! - `POST /credentials/password-changed-at` `{email}` → `{changed_at}` (nullable)

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use keyward_auth::{Credential, CredentialStore, CredentialStoreError, Role, SharedSecret, normalize_email};
use keyward_core::UserId;

pub const SECRET_HEADER: &str = "x-keyward-secret";

/// Default per-request timeout.
pub fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

#[derive(Debug, Serialize)]
struct EmailQuery<'a> {
    email: &'a str,
}

#[derive(Debug, Deserialize)]
struct CredentialRecord {
    user_id: UserId,
    email: String,
    #[serde(default)]
    name: Option<String>,
    password_hash: String,
    password_changed_at: DateTime<Utc>,
    #[serde(default)]
    role: Role,
}

impl From<CredentialRecord> for Credential {
    fn from(r: CredentialRecord) -> Self {
        Credential {
            user_id: r.user_id,
            email: normalize_email(&r.email),
            name: r.name,
            password_hash: r.password_hash,
            password_changed_at: r.password_changed_at,
            role: r.role,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChangedAtRecord {
    changed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct HttpCredentialStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCredentialStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CredentialStoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CredentialStoreError::Unavailable(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `{email}` to `path`; `Ok(None)` on 404.
    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        secret: &SharedSecret,
        email: &str,
    ) -> Result<Option<T>, CredentialStoreError> {
        let email = normalize_email(email);
        let resp = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header(SECRET_HEADER, secret.expose())
            .json(&EmailQuery { email: &email })
            .send()
            .await
            .map_err(|e| CredentialStoreError::Unavailable(e.to_string()))?;

        match resp.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(CredentialStoreError::Unauthorized),
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => resp
                .json::<Option<T>>()
                .await
                .map_err(|e| CredentialStoreError::Unavailable(format!("invalid response body: {e}"))),
            status => {
                debug!(%status, path, "credential backend returned an error");
                Err(CredentialStoreError::Unavailable(format!(
                    "credential backend returned {status}"
                )))
            }
        }
    }
}

#[async_trait::async_trait]
impl CredentialStore for HttpCredentialStore {
    async fn get_credentials_by_email(
        &self,
        secret: &SharedSecret,
        email: &str,
    ) -> Result<Option<Credential>, CredentialStoreError> {
        let record: Option<CredentialRecord> = self.post("/credentials/lookup", secret, email).await?;
        Ok(record.map(Credential::from))
    }

    async fn get_password_changed_at(
        &self,
        secret: &SharedSecret,
        email: &str,
    ) -> Result<Option<DateTime<Utc>>, CredentialStoreError> {
        let record: Option<ChangedAtRecord> = self
            .post("/credentials/password-changed-at", secret, email)
            .await?;
        Ok(record.and_then(|r| r.changed_at))
    }
}
