//! Process configuration, read once from the environment at startup.

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use keyward_auth::SharedSecret;
use keyward_entitlements::ProductCatalog;

const DEV_SESSION_SECRET: &str = "keyward-dev-session-secret";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {message}")]
    Invalid { name: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub session_secret: SharedSecret,
    pub credential_store_secret: SharedSecret,
    /// Hosted credential backend. `None` runs the in-memory store.
    pub credential_store_url: Option<String>,
    pub credential_store_timeout: Duration,
    pub webhook_secret: SharedSecret,
    pub assertion_private_key: Option<SharedSecret>,
    pub public_url: String,
    pub assertion_audience: String,
    pub products: ProductCatalog,
    pub database_url: Option<String>,
    pub trial_on_registration: bool,
    /// `None` disables the background expiry sweep.
    pub sweep_interval: Option<Duration>,
    pub revalidation_interval: chrono::Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let session_secret = match get("KEYWARD_SESSION_SECRET") {
            Some(secret) => SharedSecret::new(secret),
            None if cfg!(debug_assertions) => {
                warn!("KEYWARD_SESSION_SECRET not set; using insecure dev default");
                SharedSecret::new(DEV_SESSION_SECRET)
            }
            None => return Err(ConfigError::Missing("KEYWARD_SESSION_SECRET")),
        };

        let products = match get("KEYWARD_PRODUCT_TIERS") {
            Some(raw) => ProductCatalog::parse(&raw).map_err(|e| ConfigError::Invalid {
                name: "KEYWARD_PRODUCT_TIERS",
                message: e.to_string(),
            })?,
            None => ProductCatalog::new(),
        };

        let sweep_secs = parse_u64(get("KEYWARD_SWEEP_INTERVAL_SECS"), "KEYWARD_SWEEP_INTERVAL_SECS", 300)?;
        let revalidation_interval = parse_seconds(
            get("KEYWARD_REVALIDATION_INTERVAL_SECS"),
            "KEYWARD_REVALIDATION_INTERVAL_SECS",
            600,
        )?;
        let timeout_ms = parse_u64(
            get("KEYWARD_CREDENTIAL_STORE_TIMEOUT_MS"),
            "KEYWARD_CREDENTIAL_STORE_TIMEOUT_MS",
            5_000,
        )?;

        let credential_store_secret = SharedSecret::new(get("KEYWARD_CREDENTIAL_STORE_SECRET").unwrap_or_default());
        if credential_store_secret.is_empty() {
            warn!("KEYWARD_CREDENTIAL_STORE_SECRET not set; credential lookups will be refused");
        }
        let webhook_secret = SharedSecret::new(get("KEYWARD_WEBHOOK_SECRET").unwrap_or_default());
        if webhook_secret.is_empty() {
            warn!("KEYWARD_WEBHOOK_SECRET not set; payment webhooks will be rejected");
        }

        Ok(Self {
            bind_addr: get("KEYWARD_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            session_secret,
            credential_store_secret,
            credential_store_url: get("KEYWARD_CREDENTIAL_STORE_URL"),
            credential_store_timeout: Duration::from_millis(timeout_ms),
            webhook_secret,
            assertion_private_key: get("KEYWARD_ASSERTION_PRIVATE_KEY").map(SharedSecret::new),
            public_url: get("KEYWARD_PUBLIC_URL").unwrap_or_else(|| "http://localhost:8080".to_string()),
            assertion_audience: get("KEYWARD_ASSERTION_AUDIENCE").unwrap_or_else(|| "convex".to_string()),
            products,
            database_url: get("DATABASE_URL"),
            trial_on_registration: parse_bool(get("KEYWARD_TRIAL_ON_REGISTRATION"), "KEYWARD_TRIAL_ON_REGISTRATION", true)?,
            sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
            revalidation_interval,
        })
    }
}

fn parse_u64(raw: Option<String>, name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match raw {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            name,
            message: format!("expected a non-negative integer, got '{raw}'"),
        }),
    }
}

/// Seconds as a `chrono::Duration`; values chrono cannot represent are rejected, not truncated.
fn parse_seconds(raw: Option<String>, name: &'static str, default: u64) -> Result<chrono::Duration, ConfigError> {
    let secs = parse_u64(raw, name, default)?;
    i64::try_from(secs)
        .ok()
        .and_then(chrono::TimeDelta::try_seconds)
        .ok_or_else(|| ConfigError::Invalid {
            name,
            message: format!("{secs} seconds is out of range"),
        })
}

fn parse_bool(raw: Option<String>, name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match raw.map(|r| r.to_ascii_lowercase()) {
        None => Ok(default),
        Some(r) if matches!(r.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(r) if matches!(r.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(r) => Err(ConfigError::Invalid {
            name,
            message: format!("expected a boolean, got '{r}'"),
        }),
    }
}
