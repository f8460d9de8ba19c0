//! Postgres-backed usage counters (`usage_counters` table).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use keyward_core::UserId;
use keyward_entitlements::{MonthKey, UsageCounter};

use super::UsageStore;
use crate::StoreError;
use crate::error::map_sqlx_error;

#[derive(Debug, Clone)]
pub struct PostgresUsageStore {
    pool: Arc<PgPool>,
}

impl PostgresUsageStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    fn from_row(
        user_id: UserId,
        month: MonthKey,
        row: &sqlx::postgres::PgRow,
    ) -> Result<UsageCounter, StoreError> {
        let decode = |e: sqlx::Error| StoreError::Backend(format!("failed to decode usage row: {e}"));
        let count: i32 = row.try_get("count").map_err(decode)?;
        Ok(UsageCounter {
            user_id,
            month,
            count: u32::try_from(count).unwrap_or(0),
            last_action_at: row.try_get("last_action_at").map_err(decode)?,
        })
    }
}

#[async_trait::async_trait]
impl UsageStore for PostgresUsageStore {
    #[instrument(skip(self), err)]
    async fn get(&self, user_id: UserId, month: MonthKey) -> Result<Option<UsageCounter>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT count, last_action_at
            FROM usage_counters
            WHERE user_id = $1 AND month_key = $2
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(month.to_string())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_usage", e))?;

        row.as_ref()
            .map(|r| Self::from_row(user_id, month, r))
            .transpose()
    }

    #[instrument(skip(self), err)]
    async fn increment(
        &self,
        user_id: UserId,
        month: MonthKey,
        now: DateTime<Utc>,
    ) -> Result<UsageCounter, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO usage_counters (user_id, month_key, count, last_action_at)
            VALUES ($1, $2, 1, $3)
            ON CONFLICT (user_id, month_key)
            DO UPDATE SET
                count = usage_counters.count + 1,
                last_action_at = GREATEST(usage_counters.last_action_at, EXCLUDED.last_action_at)
            RETURNING count, last_action_at
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(month.to_string())
        .bind(now)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("increment_usage", e))?;

        Self::from_row(user_id, month, &row)
    }

    #[instrument(skip(self), err)]
    async fn increment_below(
        &self,
        user_id: UserId,
        month: MonthKey,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<UsageCounter>, StoreError> {
        // A conflicting row at the limit fails the DO UPDATE guard and returns no row.
        let row = sqlx::query(
            r#"
            INSERT INTO usage_counters (user_id, month_key, count, last_action_at)
            SELECT $1, $2, 1, $3
            WHERE $4 > 0
            ON CONFLICT (user_id, month_key)
            DO UPDATE SET
                count = usage_counters.count + 1,
                last_action_at = GREATEST(usage_counters.last_action_at, EXCLUDED.last_action_at)
            WHERE usage_counters.count < $4
            RETURNING count, last_action_at
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(month.to_string())
        .bind(now)
        .bind(i32::try_from(limit).unwrap_or(i32::MAX))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("increment_usage_below", e))?;

        row.as_ref()
            .map(|r| Self::from_row(user_id, month, r))
            .transpose()
    }

    #[instrument(skip(self), err)]
    async fn reset(&self, user_id: UserId, month: MonthKey, now: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE usage_counters
            SET count = 0, last_action_at = $3
            WHERE user_id = $1 AND month_key = $2
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(month.to_string())
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("reset_usage", e))?;
        Ok(())
    }
}
