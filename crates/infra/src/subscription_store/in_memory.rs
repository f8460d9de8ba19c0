use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use keyward_auth::normalize_email;
use keyward_core::{ExpectedVersion, UserId};
use keyward_entitlements::Subscription;

use super::SubscriptionStore;
use crate::StoreError;

/// In-memory subscription store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySubscriptionStore {
    rows: RwLock<HashMap<UserId, Subscription>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StoreError {
        StoreError::Backend("lock poisoned".to_string())
    }
}

#[async_trait::async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn load(&self, user_id: UserId) -> Result<Option<Subscription>, StoreError> {
        let rows = self.rows.read().map_err(|_| Self::poisoned())?;
        Ok(rows.get(&user_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Subscription>, StoreError> {
        let email = normalize_email(email);
        let rows = self.rows.read().map_err(|_| Self::poisoned())?;
        Ok(rows.values().find(|s| s.email == email).cloned())
    }

    async fn save(
        &self,
        subscription: &Subscription,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.write().map_err(|_| Self::poisoned())?;
        let stored = rows.get(&subscription.user_id).map(|s| s.version);
        if !expected.matches(stored) {
            return Err(StoreError::Concurrency(format!(
                "expected {expected:?}, found {stored:?}"
            )));
        }
        rows.insert(subscription.user_id, subscription.clone());
        Ok(())
    }

    async fn list_expiry_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Subscription>, StoreError> {
        let rows = self.rows.read().map_err(|_| Self::poisoned())?;
        Ok(rows
            .values()
            .filter(|s| s.is_expiry_due(now))
            .take(limit)
            .cloned()
            .collect())
    }
}
