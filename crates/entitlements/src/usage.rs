//! Monthly conversation quota arithmetic.
//!
//! Knows nothing about tiers or features: callers decide whether a user is unlimited.

use core::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use keyward_core::{DomainError, UserId};

/// Conversations a limited account may start per calendar month.
pub const FREE_MONTHLY_CONVERSATIONS: u32 = 10;

/// Calendar month in UTC, rendered `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Result<Self, DomainError> {
        if !(1..=12).contains(&month) {
            return Err(DomainError::validation(format!("month out of range: {month}")));
        }
        if !(0..=9999).contains(&year) {
            return Err(DomainError::validation(format!("year out of range: {year}")));
        }
        Ok(Self { year, month })
    }

    pub fn of(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }
}

impl core::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || DomainError::validation(format!("expected YYYY-MM, got '{s}'"));
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year = year.parse().map_err(|_| invalid())?;
        let month = month.parse().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for MonthKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthKey> for String {
    fn from(value: MonthKey) -> Self {
        value.to_string()
    }
}

/// Conversation starts for one user in one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    pub user_id: UserId,
    pub month: MonthKey,
    pub count: u32,
    pub last_action_at: DateTime<Utc>,
}

impl UsageCounter {
    /// The row an upsert creates.
    pub fn first(user_id: UserId, month: MonthKey, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            month,
            count: 1,
            last_action_at: now,
        }
    }

    /// The row an upsert updates to.
    pub fn increment(&mut self, now: DateTime<Utc>) {
        self.count = self.count.saturating_add(1);
        if now > self.last_action_at {
            self.last_action_at = now;
        }
    }
}

/// Quota state as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    pub month: MonthKey,
    pub count: u32,
    pub limit: Option<u32>,
    pub unlimited: bool,
}

impl UsageReport {
    pub fn limited(month: MonthKey, count: u32) -> Self {
        Self {
            month,
            count,
            limit: Some(FREE_MONTHLY_CONVERSATIONS),
            unlimited: false,
        }
    }

    pub fn unlimited(month: MonthKey, count: u32) -> Self {
        Self {
            month,
            count,
            limit: None,
            unlimited: true,
        }
    }

    /// Conversations left this month; `None` when unlimited.
    pub fn remaining(&self) -> Option<u32> {
        if self.unlimited {
            return None;
        }
        self.limit.map(|limit| limit.saturating_sub(self.count))
    }

    pub fn allows_new_conversation(&self) -> bool {
        self.unlimited || self.limit.is_some_and(|limit| self.count < limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn month_key_formats_in_utc() {
        let at = Utc.with_ymd_and_hms(2025, 2, 28, 23, 59, 59).unwrap();
        assert_eq!(MonthKey::of(at).to_string(), "2025-02");
        let next = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        assert_ne!(MonthKey::of(at), MonthKey::of(next));
    }

    #[test]
    fn month_key_parses() {
        let key: MonthKey = "2024-11".parse().unwrap();
        assert_eq!((key.year(), key.month()), (2024, 11));
        assert!("2024-13".parse::<MonthKey>().is_err());
        assert!("2024-1".parse::<MonthKey>().is_err());
        assert!("november".parse::<MonthKey>().is_err());
    }

    #[test]
    fn month_key_serializes_as_string() {
        let key = MonthKey::new(2025, 7).unwrap();
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"2025-07\"");
        let back: MonthKey = serde_json::from_str("\"2025-07\"").unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn free_user_at_limit_is_blocked() {
        let month = MonthKey::of(Utc::now());
        let at_limit = UsageReport::limited(month, 10);
        assert_eq!(at_limit.remaining(), Some(0));
        assert!(!at_limit.allows_new_conversation());

        let one_left = UsageReport::limited(month, 9);
        assert_eq!(one_left.remaining(), Some(1));
        assert!(one_left.allows_new_conversation());
    }

    #[test]
    fn over_limit_counts_do_not_underflow() {
        let report = UsageReport::limited(MonthKey::of(Utc::now()), 14);
        assert_eq!(report.remaining(), Some(0));
    }

    #[test]
    fn unlimited_always_allows() {
        let report = UsageReport::unlimited(MonthKey::of(Utc::now()), 500);
        assert_eq!(report.remaining(), None);
        assert!(report.allows_new_conversation());
    }

    #[test]
    fn counter_increments_and_keeps_latest_action() {
        let now = Utc::now();
        let mut counter = UsageCounter::first(keyward_core::UserId::new(), MonthKey::of(now), now);
        counter.increment(now + chrono::Duration::seconds(5));
        counter.increment(now);
        assert_eq!(counter.count, 3);
        assert_eq!(counter.last_action_at, now + chrono::Duration::seconds(5));
    }
}
