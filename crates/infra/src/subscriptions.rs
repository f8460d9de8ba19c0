//! Command pipeline over the `Subscription` aggregate.
//!
//! ```text
//! load (or implicit free) → apply due expiry → handle command → save(expected version)
//!                                                               ↳ on conflict: reload, retry
//! ```
//!
//! Reads go through the same expiry step: `get_user_subscription` persists a lapsed trial
//! or cancelled period before returning, so a row is never observed past its `expires_at`.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use keyward_core::{Aggregate, DomainError, DomainEvent, UserId};
use keyward_entitlements::subscription::{
    ActivateSubscription, CancelSubscription, SubscriptionCommand,
};
use keyward_entitlements::{BillingPeriod, Subscription, SubscriptionEvent, Tier, TrialLifecycleManager};

use crate::StoreError;
use crate::subscription_store::SubscriptionStore;

/// Attempts per command before a version conflict is surfaced.
const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no subscription found")]
    NotFound,
}

/// Payment confirmation as delivered by the billing webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub tier: Tier,
    pub billing_period: Option<BillingPeriod>,
    pub external_id: Option<String>,
    pub provider: Option<String>,
}

pub struct SubscriptionService<S> {
    store: S,
    trials: TrialLifecycleManager,
}

impl<S: SubscriptionStore> SubscriptionService<S> {
    pub fn new(store: S, trials: TrialLifecycleManager) -> Self {
        Self { store, trials }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn trials(&self) -> &TrialLifecycleManager {
        &self.trials
    }

    /// The stored subscription at `now`, with any due expiry applied and persisted first.
    /// `None` means the user is on the implicit free plan.
    #[instrument(skip(self), err)]
    pub async fn get_user_subscription(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>, SubscriptionError> {
        let Some(sub) = self.store.load(user_id).await? else {
            return Ok(None);
        };
        if !sub.is_expiry_due(now) {
            return Ok(Some(sub));
        }
        let email = sub.email.clone();
        self.execute(user_id, &email, now, |_| Ok(Vec::new())).await.map(Some)
    }

    pub async fn find_by_email(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>, SubscriptionError> {
        match self.store.find_by_email(email).await? {
            Some(sub) => self.get_user_subscription(sub.user_id, now).await,
            None => Ok(None),
        }
    }

    /// Registration trial. A no-op (returning the current state) when registration trials
    /// are switched off.
    #[instrument(skip(self, email), err)]
    pub async fn grant_trial(
        &self,
        user_id: UserId,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        let trials = self.trials;
        self.execute(user_id, email, now, |sub| trials.grant_on_registration(sub, now))
            .await
    }

    #[instrument(skip(self, email, activation), fields(tier = %activation.tier), err)]
    pub async fn activate(
        &self,
        user_id: UserId,
        email: &str,
        activation: Activation,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        let command = SubscriptionCommand::Activate(ActivateSubscription {
            tier: activation.tier,
            billing_period: activation.billing_period,
            external_id: activation.external_id,
            provider: activation.provider,
            occurred_at: now,
        });
        self.execute(user_id, email, now, |sub| sub.execute(&command)).await
    }

    /// Cancel the user's subscription: scheduled for the end of the paid period when there is
    /// one, immediate otherwise.
    #[instrument(skip(self, external_id), err)]
    pub async fn cancel(
        &self,
        user_id: UserId,
        external_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        let Some(existing) = self.store.load(user_id).await? else {
            return Err(SubscriptionError::NotFound);
        };
        let command = SubscriptionCommand::Cancel(CancelSubscription {
            external_id,
            occurred_at: now,
        });
        self.execute(user_id, &existing.email, now, |sub| sub.execute(&command))
            .await
    }

    /// Apply due expiries to up to `batch` stored rows. Returns how many were transitioned.
    pub async fn sweep(&self, now: DateTime<Utc>, batch: usize) -> Result<usize, SubscriptionError> {
        let due = self.store.list_expiry_due(now, batch).await?;
        let mut expired = 0;
        for sub in due {
            match self.get_user_subscription(sub.user_id, now).await {
                Ok(_) => expired += 1,
                Err(e) => warn!(user_id = %sub.user_id, error = %e, "expiry sweep failed for subscription"),
            }
        }
        Ok(expired)
    }

    /// Load, expire if due, run `decide`, persist. Retries on version conflicts.
    async fn execute<F>(
        &self,
        user_id: UserId,
        email: &str,
        now: DateTime<Utc>,
        mut decide: F,
    ) -> Result<Subscription, SubscriptionError>
    where
        F: FnMut(&mut Subscription) -> Result<Vec<SubscriptionEvent>, DomainError> + Send,
    {
        let mut attempt = 1;
        loop {
            let mut sub = match self.store.load(user_id).await? {
                Some(sub) => sub,
                None => Subscription::implicit_free(user_id, keyward_auth::normalize_email(email), now),
            };
            let expected = sub.expected_version();

            let mut events = TrialLifecycleManager::expire_if_due(&mut sub, now)?;
            events.extend(decide(&mut sub)?);
            if events.is_empty() {
                return Ok(sub);
            }

            match self.store.save(&sub, expected).await {
                Ok(()) => {
                    for event in &events {
                        info!(
                            user_id = %user_id,
                            event_type = event.event_type(),
                            tier = %sub.tier,
                            status = %sub.status,
                            "subscription updated"
                        );
                    }
                    return Ok(sub);
                }
                Err(e) if e.is_concurrency() && attempt < MAX_ATTEMPTS => {
                    warn!(user_id = %user_id, attempt, "subscription write conflicted; retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
