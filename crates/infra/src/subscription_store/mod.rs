//! Subscription persistence boundary.
//!
//! Stores hold the latest aggregate state per user (no event history) and guard every write
//! with `ExpectedVersion`, so concurrent writers (webhook, lazy expiry, sweeper) cannot
//! silently overwrite each other.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use keyward_core::{ExpectedVersion, UserId};
use keyward_entitlements::Subscription;

use crate::StoreError;

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemorySubscriptionStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresSubscriptionStore;

#[async_trait::async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn load(&self, user_id: UserId) -> Result<Option<Subscription>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Subscription>, StoreError>;

    /// Persist `subscription` if the stored version satisfies `expected`.
    async fn save(
        &self,
        subscription: &Subscription,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    /// Rows whose trial or scheduled cancellation has lapsed at `now`.
    async fn list_expiry_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Subscription>, StoreError>;
}

#[async_trait::async_trait]
impl<S> SubscriptionStore for Arc<S>
where
    S: SubscriptionStore + ?Sized,
{
    async fn load(&self, user_id: UserId) -> Result<Option<Subscription>, StoreError> {
        (**self).load(user_id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Subscription>, StoreError> {
        (**self).find_by_email(email).await
    }

    async fn save(
        &self,
        subscription: &Subscription,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        (**self).save(subscription, expected).await
    }

    async fn list_expiry_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Subscription>, StoreError> {
        (**self).list_expiry_due(now, limit).await
    }
}
