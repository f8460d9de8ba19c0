use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use keyward_core::UserId;
use keyward_entitlements::{MonthKey, UsageCounter};

use super::UsageStore;
use crate::StoreError;

/// In-memory usage counters. Every operation is one critical section on a single mutex.
#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    counters: Mutex<HashMap<(UserId, MonthKey), UsageCounter>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StoreError {
        StoreError::Backend("lock poisoned".to_string())
    }
}

#[async_trait::async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn get(&self, user_id: UserId, month: MonthKey) -> Result<Option<UsageCounter>, StoreError> {
        let counters = self.counters.lock().map_err(|_| Self::poisoned())?;
        Ok(counters.get(&(user_id, month)).cloned())
    }

    async fn increment(
        &self,
        user_id: UserId,
        month: MonthKey,
        now: DateTime<Utc>,
    ) -> Result<UsageCounter, StoreError> {
        let mut counters = self.counters.lock().map_err(|_| Self::poisoned())?;
        let counter = counters
            .entry((user_id, month))
            .and_modify(|c| c.increment(now))
            .or_insert_with(|| UsageCounter::first(user_id, month, now));
        Ok(counter.clone())
    }

    async fn increment_below(
        &self,
        user_id: UserId,
        month: MonthKey,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<UsageCounter>, StoreError> {
        let mut counters = self.counters.lock().map_err(|_| Self::poisoned())?;
        match counters.get_mut(&(user_id, month)) {
            Some(counter) if counter.count >= limit => Ok(None),
            Some(counter) => {
                counter.increment(now);
                Ok(Some(counter.clone()))
            }
            None if limit == 0 => Ok(None),
            None => {
                let counter = UsageCounter::first(user_id, month, now);
                counters.insert((user_id, month), counter.clone());
                Ok(Some(counter))
            }
        }
    }

    async fn reset(&self, user_id: UserId, month: MonthKey, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut counters = self.counters.lock().map_err(|_| Self::poisoned())?;
        if let Some(counter) = counters.get_mut(&(user_id, month)) {
            counter.count = 0;
            counter.last_action_at = now;
        }
        Ok(())
    }
}
