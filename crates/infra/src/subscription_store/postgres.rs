//! Postgres-backed subscription store (`subscriptions` table).
//!
//! Optimistic concurrency is enforced in SQL: `New` is a plain insert (a concurrent insert
//! trips the primary key, `23505` → `Concurrency`), `Exact(v)` is an update guarded by
//! `version = v` (zero affected rows → `Concurrency`).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use keyward_auth::normalize_email;
use keyward_core::{ExpectedVersion, UserId};
use keyward_entitlements::Subscription;

use super::SubscriptionStore;
use crate::StoreError;
use crate::error::map_sqlx_error;

const COLUMNS: &str = "user_id, email, tier, status, started_at, expires_at, billing_period, \
     external_id, provider, cancel_at_period_end, trial_used, version";

#[derive(Debug, Clone)]
pub struct PostgresSubscriptionStore {
    pool: Arc<PgPool>,
}

impl PostgresSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Subscription, StoreError> {
        let decode = |e: sqlx::Error| StoreError::Backend(format!("failed to decode subscription row: {e}"));
        let parse = |e: keyward_core::DomainError| StoreError::Backend(format!("corrupt subscription row: {e}"));

        let tier: String = row.try_get("tier").map_err(decode)?;
        let status: String = row.try_get("status").map_err(decode)?;
        let billing_period: Option<String> = row.try_get("billing_period").map_err(decode)?;
        let version: i64 = row.try_get("version").map_err(decode)?;

        Ok(Subscription {
            user_id: UserId::from_uuid(row.try_get("user_id").map_err(decode)?),
            email: row.try_get("email").map_err(decode)?,
            tier: tier.parse().map_err(parse)?,
            status: status.parse().map_err(parse)?,
            started_at: row.try_get("started_at").map_err(decode)?,
            expires_at: row.try_get("expires_at").map_err(decode)?,
            billing_period: billing_period.map(|p| p.parse()).transpose().map_err(parse)?,
            external_id: row.try_get("external_id").map_err(decode)?,
            provider: row.try_get("provider").map_err(decode)?,
            cancel_at_period_end: row.try_get("cancel_at_period_end").map_err(decode)?,
            trial_used: row.try_get("trial_used").map_err(decode)?,
            version: u64::try_from(version).map_err(|_| StoreError::Backend(format!("negative version {version}")))?,
        })
    }

    fn version_param(version: u64) -> Result<i64, StoreError> {
        i64::try_from(version).map_err(|_| StoreError::Backend(format!("version overflow: {version}")))
    }
}

#[async_trait::async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    #[instrument(skip(self), err)]
    async fn load(&self, user_id: UserId) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM subscriptions WHERE user_id = $1"))
            .bind(user_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_subscription", e))?;
        row.as_ref().map(Self::from_row).transpose()
    }

    #[instrument(skip(self, email), err)]
    async fn find_by_email(&self, email: &str) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM subscriptions WHERE email = $1"))
            .bind(normalize_email(email))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_subscription_by_email", e))?;
        row.as_ref().map(Self::from_row).transpose()
    }

    #[instrument(
        skip(self, subscription),
        fields(user_id = %subscription.user_id, expected_version = ?expected),
        err
    )]
    async fn save(
        &self,
        subscription: &Subscription,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let s = subscription;
        let version = Self::version_param(s.version)?;
        let billing_period = s.billing_period.map(|p| p.as_str());

        let (sql, guard) = match expected {
            ExpectedVersion::New => (
                r#"
                INSERT INTO subscriptions (
                    user_id, email, tier, status, started_at, expires_at, billing_period,
                    external_id, provider, cancel_at_period_end, trial_used, version
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
                None,
            ),
            ExpectedVersion::Exact(v) => (
                r#"
                UPDATE subscriptions SET
                    email = $2, tier = $3, status = $4, started_at = $5, expires_at = $6,
                    billing_period = $7, external_id = $8, provider = $9,
                    cancel_at_period_end = $10, trial_used = $11, version = $12,
                    updated_at = NOW()
                WHERE user_id = $1 AND version = $13
                "#,
                Some(Self::version_param(v)?),
            ),
            ExpectedVersion::Any => (
                r#"
                INSERT INTO subscriptions (
                    user_id, email, tier, status, started_at, expires_at, billing_period,
                    external_id, provider, cancel_at_period_end, trial_used, version
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                ON CONFLICT (user_id) DO UPDATE SET
                    email = EXCLUDED.email,
                    tier = EXCLUDED.tier,
                    status = EXCLUDED.status,
                    started_at = EXCLUDED.started_at,
                    expires_at = EXCLUDED.expires_at,
                    billing_period = EXCLUDED.billing_period,
                    external_id = EXCLUDED.external_id,
                    provider = EXCLUDED.provider,
                    cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                    trial_used = EXCLUDED.trial_used,
                    version = EXCLUDED.version,
                    updated_at = NOW()
                "#,
                None,
            ),
        };

        let mut query = sqlx::query(sql)
            .bind(s.user_id.as_uuid())
            .bind(&s.email)
            .bind(s.tier.as_str())
            .bind(s.status.as_str())
            .bind(s.started_at)
            .bind(s.expires_at)
            .bind(billing_period)
            .bind(&s.external_id)
            .bind(&s.provider)
            .bind(s.cancel_at_period_end)
            .bind(s.trial_used)
            .bind(version);
        if let Some(expected_version) = guard {
            query = query.bind(expected_version);
        }

        let result = query
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("save_subscription", e))?;

        if guard.is_some() && result.rows_affected() == 0 {
            return Err(StoreError::Concurrency(format!(
                "subscription {} is no longer at {expected:?}",
                s.user_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list_expiry_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Subscription>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS} FROM subscriptions
            WHERE expires_at IS NOT NULL
              AND expires_at <= $1
              AND (tier = 'trial' OR cancel_at_period_end)
            ORDER BY expires_at ASC
            LIMIT $2
            "#
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_expiry_due", e))?;

        rows.iter().map(Self::from_row).collect()
    }
}
