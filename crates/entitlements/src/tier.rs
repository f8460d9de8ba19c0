use core::str::FromStr;

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use keyward_core::DomainError;

/// Named subscription level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Free,
    Trial,
    Extended,
    AllInOne,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Free, Tier::Trial, Tier::Extended, Tier::AllInOne];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Trial => "trial",
            Tier::Extended => "extended",
            Tier::AllInOne => "all_in_one",
        }
    }

    /// Tiers a payment can activate.
    pub fn is_paid(&self) -> bool {
        matches!(self, Tier::Extended | Tier::AllInOne)
    }
}

impl core::fmt::Display for Tier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "free" => Ok(Tier::Free),
            "trial" => Ok(Tier::Trial),
            "extended" => Ok(Tier::Extended),
            "all_in_one" | "allinone" => Ok(Tier::AllInOne),
            other => Err(DomainError::validation(format!("unknown tier '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(SubscriptionStatus::Active),
            "cancelled" | "canceled" => Ok(SubscriptionStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    Monthly,
    Yearly,
}

impl BillingPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingPeriod::Monthly => "monthly",
            BillingPeriod::Yearly => "yearly",
        }
    }

    /// First period boundary strictly after `now`, counting whole periods from `started_at`.
    pub fn current_period_end(
        &self,
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let step = match self {
            BillingPeriod::Monthly => 1,
            BillingPeriod::Yearly => 12,
        };
        let mut periods: u32 = 1;
        loop {
            let end = started_at.checked_add_months(Months::new(periods.checked_mul(step)?))?;
            if end > now {
                return Some(end);
            }
            periods = periods.checked_add(1)?;
        }
    }
}

impl core::fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingPeriod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" | "month" => Ok(BillingPeriod::Monthly),
            "yearly" | "year" | "annual" => Ok(BillingPeriod::Yearly),
            other => Err(DomainError::validation(format!("unknown billing period '{other}'"))),
        }
    }
}
