//! Usage metering: the call site where feature gating and quota math meet.
//!
//! Reads fail like any store read. Writes fail closed: an increment that cannot be persisted
//! after a bounded number of attempts is an error, never a silently uncounted conversation.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use keyward_auth::Identity;
use keyward_core::UserId;
use keyward_entitlements::{
    EntitlementResolver, FREE_MONTHLY_CONVERSATIONS, Feature, MonthKey, Subscription, UsageCounter, UsageReport,
};

use crate::StoreError;
use crate::usage_store::UsageStore;

const MAX_WRITE_ATTEMPTS: u32 = 3;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("monthly conversation limit reached")]
    QuotaExceeded(UsageReport),

    #[error("usage write failed after {attempts} attempts: {source}")]
    WriteFailed { attempts: u32, source: StoreError },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct UsageMeter<U> {
    store: U,
    retry_backoff: StdDuration,
}

impl<U: UsageStore> UsageMeter<U> {
    pub fn new(store: U) -> Self {
        Self {
            store,
            retry_backoff: StdDuration::from_millis(25),
        }
    }

    pub fn with_retry_backoff(mut self, backoff: StdDuration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Admins and anyone whose subscription grants `unlimited_conversations` are unlimited.
    pub fn is_unlimited(identity: &Identity, subscription: Option<&Subscription>, now: DateTime<Utc>) -> bool {
        EntitlementResolver::has_feature_access(identity, subscription, Feature::UnlimitedConversations, now)
    }

    /// Quota state for the month containing `now`.
    pub async fn get_usage(
        &self,
        identity: &Identity,
        subscription: Option<&Subscription>,
        now: DateTime<Utc>,
    ) -> Result<UsageReport, UsageError> {
        self.get_usage_for_month(identity, subscription, MonthKey::of(now), now)
            .await
    }

    pub async fn get_usage_for_month(
        &self,
        identity: &Identity,
        subscription: Option<&Subscription>,
        month: MonthKey,
        now: DateTime<Utc>,
    ) -> Result<UsageReport, UsageError> {
        let count = self
            .store
            .get(identity.id, month)
            .await?
            .map(|c| c.count)
            .unwrap_or(0);

        Ok(if Self::is_unlimited(identity, subscription, now) {
            UsageReport::unlimited(month, count)
        } else {
            UsageReport::limited(month, count)
        })
    }

    /// Count one conversation start. Admin activity is not counted (`Ok(None)`).
    #[instrument(skip(self, identity), fields(user_id = %identity.id), err)]
    pub async fn increment_usage(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<Option<UsageCounter>, UsageError> {
        if identity.is_admin() {
            return Ok(None);
        }
        let store = &self.store;
        let (user_id, month) = (identity.id, MonthKey::of(now));
        let counter = self
            .write_with_retry(move || store.increment(user_id, month, now))
            .await?;
        Ok(Some(counter))
    }

    /// Gate and count in one store write: refuses with `QuotaExceeded` when no conversation
    /// is left this month, even under concurrent starts.
    ///
    /// Unlimited users are still counted; only admins are skipped.
    #[instrument(skip(self, identity, subscription), fields(user_id = %identity.id))]
    pub async fn start_conversation(
        &self,
        identity: &Identity,
        subscription: Option<&Subscription>,
        now: DateTime<Utc>,
    ) -> Result<UsageReport, UsageError> {
        if identity.is_admin() {
            return self.get_usage(identity, subscription, now).await;
        }
        let month = MonthKey::of(now);

        if Self::is_unlimited(identity, subscription, now) {
            let counter = self.increment_usage(identity, now).await?;
            let count = counter.map(|c| c.count).unwrap_or(0);
            return Ok(UsageReport::unlimited(month, count));
        }

        let store = &self.store;
        let user_id = identity.id;
        let written = self
            .write_with_retry(move || store.increment_below(user_id, month, FREE_MONTHLY_CONVERSATIONS, now))
            .await?;
        match written {
            Some(counter) => Ok(UsageReport::limited(month, counter.count)),
            None => {
                let report = self.get_usage_for_month(identity, subscription, month, now).await?;
                info!(count = report.count, "conversation refused: quota exhausted");
                Err(UsageError::QuotaExceeded(report))
            }
        }
    }

    /// Runs a store write up to `MAX_WRITE_ATTEMPTS` times, then fails closed.
    async fn write_with_retry<T, F, Fut>(&self, mut write: F) -> Result<T, UsageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 1;
        loop {
            match write().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < MAX_WRITE_ATTEMPTS => {
                    warn!(attempt, error = %e, "usage write failed; retrying");
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(UsageError::WriteFailed {
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    /// Administrative reset of one user's month.
    pub async fn reset_usage(
        &self,
        user_id: UserId,
        month: MonthKey,
        now: DateTime<Utc>,
    ) -> Result<(), UsageError> {
        self.store.reset(user_id, month, now).await?;
        info!(user_id = %user_id, month = %month, "usage reset");
        Ok(())
    }
}
