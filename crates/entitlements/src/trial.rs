//! Registration trials and the expiry transition shared by readers and the sweeper.

use chrono::{DateTime, Utc};
use tracing::info;

use keyward_core::{Aggregate, DomainError};

use crate::subscription::{StartTrial, SubscriptionCommand};
use crate::{Subscription, SubscriptionEvent, Tier};

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy)]
pub struct TrialLifecycleManager {
    grant_on_registration: bool,
}

impl Default for TrialLifecycleManager {
    fn default() -> Self {
        Self::new(true)
    }
}

impl TrialLifecycleManager {
    pub fn new(grant_on_registration: bool) -> Self {
        Self {
            grant_on_registration,
        }
    }

    pub fn grants_on_registration(&self) -> bool {
        self.grant_on_registration
    }

    /// Whole days left in a running trial, rounded up. Zero for any other tier.
    pub fn trial_days_left(subscription: Option<&Subscription>, now: DateTime<Utc>) -> i64 {
        let Some(sub) = subscription else {
            return 0;
        };
        if sub.tier != Tier::Trial {
            return 0;
        }
        let Some(expires_at) = sub.expires_at else {
            return 0;
        };
        let remaining = (expires_at - now).num_seconds();
        if remaining <= 0 {
            return 0;
        }
        (remaining + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
    }

    /// Start the registration trial on a new account's subscription.
    ///
    /// Returns no events when registration trials are switched off.
    pub fn grant_on_registration(
        &self,
        subscription: &mut Subscription,
        now: DateTime<Utc>,
    ) -> Result<Vec<SubscriptionEvent>, DomainError> {
        if !self.grant_on_registration {
            return Ok(Vec::new());
        }
        let events =
            subscription.execute(&SubscriptionCommand::StartTrial(StartTrial { occurred_at: now }))?;
        info!(user_id = %subscription.user_id, expires_at = ?subscription.expires_at, "trial granted");
        Ok(events)
    }

    /// Apply a due expiry in place. No events when nothing was due.
    pub fn expire_if_due(
        subscription: &mut Subscription,
        now: DateTime<Utc>,
    ) -> Result<Vec<SubscriptionEvent>, DomainError> {
        let Some(command) = subscription.expiry_command(now) else {
            return Ok(Vec::new());
        };
        let previous = subscription.tier;
        let events = subscription.execute(&command)?;
        info!(
            user_id = %subscription.user_id,
            previous_tier = %previous,
            status = %subscription.status,
            "subscription expired"
        );
        Ok(events)
    }
}
