//! Monthly usage counter persistence.
//!
//! `increment` and `increment_below` must each be a single atomic upsert: concurrent callers
//! never lose an update, and never push a capped counter past its limit.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use keyward_core::UserId;
use keyward_entitlements::{MonthKey, UsageCounter};

use crate::StoreError;

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryUsageStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresUsageStore;

#[async_trait::async_trait]
pub trait UsageStore: Send + Sync {
    async fn get(&self, user_id: UserId, month: MonthKey) -> Result<Option<UsageCounter>, StoreError>;

    /// Create the row with `count = 1` or add one to it; returns the row after the write.
    async fn increment(
        &self,
        user_id: UserId,
        month: MonthKey,
        now: DateTime<Utc>,
    ) -> Result<UsageCounter, StoreError>;

    /// `increment`, but only while the count is below `limit`. `None` means the limit was
    /// already reached and nothing was written.
    async fn increment_below(
        &self,
        user_id: UserId,
        month: MonthKey,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<UsageCounter>, StoreError>;

    /// Set the month's count back to zero. No-op when no row exists.
    async fn reset(&self, user_id: UserId, month: MonthKey, now: DateTime<Utc>) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
impl<S> UsageStore for Arc<S>
where
    S: UsageStore + ?Sized,
{
    async fn get(&self, user_id: UserId, month: MonthKey) -> Result<Option<UsageCounter>, StoreError> {
        (**self).get(user_id, month).await
    }

    async fn increment(
        &self,
        user_id: UserId,
        month: MonthKey,
        now: DateTime<Utc>,
    ) -> Result<UsageCounter, StoreError> {
        (**self).increment(user_id, month, now).await
    }

    async fn increment_below(
        &self,
        user_id: UserId,
        month: MonthKey,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<UsageCounter>, StoreError> {
        (**self).increment_below(user_id, month, limit, now).await
    }

    async fn reset(&self, user_id: UserId, month: MonthKey, now: DateTime<Utc>) -> Result<(), StoreError> {
        (**self).reset(user_id, month, now).await
    }
}
