//! Subscription aggregate.
//!
//! One subscription per user. Tier and status change only through commands; a user with no
//! stored subscription is treated as `implicit_free`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use keyward_core::{Aggregate, AggregateRoot, DomainError, DomainEvent, ExpectedVersion, UserId};

use crate::{BillingPeriod, SubscriptionStatus, Tier};

/// Length of the registration trial.
pub fn trial_duration() -> Duration {
    Duration::days(7)
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscription Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// # Invariants
/// - A trial is granted at most once (`trial_used`).
/// - `status == Cancelled` implies `tier == Free`.
/// - `cancel_at_period_end` implies `status == Active` and `expires_at` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: UserId,
    pub email: String,
    pub tier: Tier,
    pub status: SubscriptionStatus,
    pub started_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub billing_period: Option<BillingPeriod>,
    pub external_id: Option<String>,
    pub provider: Option<String>,
    pub cancel_at_period_end: bool,
    pub trial_used: bool,
    pub version: u64,
}

impl Subscription {
    /// What an account without a stored subscription has.
    pub fn implicit_free(user_id: UserId, email: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            email: email.into(),
            tier: Tier::Free,
            status: SubscriptionStatus::Active,
            started_at: now,
            expires_at: None,
            billing_period: None,
            external_id: None,
            provider: None,
            cancel_at_period_end: false,
            trial_used: false,
            version: 0,
        }
    }

    /// Never persisted.
    pub fn is_new(&self) -> bool {
        self.version == 0
    }

    /// Expectation to write this state back with, as loaded.
    pub fn expected_version(&self) -> ExpectedVersion {
        if self.is_new() {
            ExpectedVersion::New
        } else {
            ExpectedVersion::Exact(self.version)
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    /// A trial, or a paid plan running out its cancelled period, whose end has passed.
    pub fn is_expiry_due(&self, now: DateTime<Utc>) -> bool {
        let lapsed = self.expires_at.is_some_and(|at| at <= now);
        lapsed && (self.tier == Tier::Trial || self.cancel_at_period_end)
    }

    /// The tier in force at `now`, before any pending expiry is persisted.
    pub fn effective_tier(&self, now: DateTime<Utc>) -> Tier {
        if self.is_expiry_due(now) {
            Tier::Free
        } else {
            self.tier
        }
    }

    /// The command that applies a due expiry, if any.
    pub fn expiry_command(&self, now: DateTime<Utc>) -> Option<SubscriptionCommand> {
        self.is_expiry_due(now)
            .then_some(SubscriptionCommand::Expire(ExpireSubscription { occurred_at: now }))
    }

    fn ensure_cancellable(&self) -> Result<(), DomainError> {
        if self.tier == Tier::Free || !self.is_active() {
            return Err(DomainError::invariant("no active subscription to cancel"));
        }
        if self.cancel_at_period_end {
            return Err(DomainError::invariant("subscription already cancelled"));
        }
        Ok(())
    }
}

impl AggregateRoot for Subscription {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.user_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartTrial {
    pub occurred_at: DateTime<Utc>,
}

/// Payment confirmed for a paid tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateSubscription {
    pub tier: Tier,
    pub billing_period: Option<BillingPeriod>,
    pub external_id: Option<String>,
    pub provider: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelSubscription {
    /// When given, must match the stored provider reference.
    pub external_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpireSubscription {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SubscriptionCommand {
    StartTrial(StartTrial),
    Activate(ActivateSubscription),
    Cancel(CancelSubscription),
    Expire(ExpireSubscription),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialStarted {
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionActivated {
    pub user_id: UserId,
    pub tier: Tier,
    pub billing_period: Option<BillingPeriod>,
    pub external_id: Option<String>,
    pub provider: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Paid access continues until `ends_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationScheduled {
    pub user_id: UserId,
    pub ends_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionCancelled {
    pub user_id: UserId,
    pub previous_tier: Tier,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionExpired {
    pub user_id: UserId,
    pub previous_tier: Tier,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionEvent {
    TrialStarted(TrialStarted),
    Activated(SubscriptionActivated),
    CancellationScheduled(CancellationScheduled),
    Cancelled(SubscriptionCancelled),
    Expired(SubscriptionExpired),
}

impl DomainEvent for SubscriptionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SubscriptionEvent::TrialStarted(_) => "subscription.trial_started",
            SubscriptionEvent::Activated(_) => "subscription.activated",
            SubscriptionEvent::CancellationScheduled(_) => "subscription.cancellation_scheduled",
            SubscriptionEvent::Cancelled(_) => "subscription.cancelled",
            SubscriptionEvent::Expired(_) => "subscription.expired",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SubscriptionEvent::TrialStarted(e) => e.occurred_at,
            SubscriptionEvent::Activated(e) => e.occurred_at,
            SubscriptionEvent::CancellationScheduled(e) => e.occurred_at,
            SubscriptionEvent::Cancelled(e) => e.occurred_at,
            SubscriptionEvent::Expired(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for Subscription {
    type Command = SubscriptionCommand;
    type Event = SubscriptionEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SubscriptionEvent::TrialStarted(e) => self.apply_trial_started(e),
            SubscriptionEvent::Activated(e) => self.apply_activated(e),
            SubscriptionEvent::CancellationScheduled(e) => self.apply_cancellation_scheduled(e),
            SubscriptionEvent::Cancelled(e) => self.apply_cancelled(e),
            SubscriptionEvent::Expired(e) => self.apply_expired(e),
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SubscriptionCommand::StartTrial(cmd) => self.handle_start_trial(cmd),
            SubscriptionCommand::Activate(cmd) => self.handle_activate(cmd),
            SubscriptionCommand::Cancel(cmd) => self.handle_cancel(cmd),
            SubscriptionCommand::Expire(cmd) => self.handle_expire(cmd),
        }
    }
}

impl Subscription {
    // ─────────────────────────────────────────────────────────────────────────
    // Command Handlers
    // ─────────────────────────────────────────────────────────────────────────

    fn handle_start_trial(&self, cmd: &StartTrial) -> Result<Vec<SubscriptionEvent>, DomainError> {
        if self.trial_used {
            return Err(DomainError::invariant("trial already used"));
        }
        if self.is_active() && self.tier.is_paid() {
            return Err(DomainError::invariant("account already has a paid subscription"));
        }

        Ok(vec![SubscriptionEvent::TrialStarted(TrialStarted {
            user_id: self.user_id,
            expires_at: cmd.occurred_at + trial_duration(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activate(
        &self,
        cmd: &ActivateSubscription,
    ) -> Result<Vec<SubscriptionEvent>, DomainError> {
        if !cmd.tier.is_paid() {
            return Err(DomainError::validation(format!(
                "tier '{}' cannot be activated by payment",
                cmd.tier
            )));
        }

        // Redelivered webhook for the running plan.
        let unchanged = self.is_active()
            && !self.cancel_at_period_end
            && self.tier == cmd.tier
            && self.billing_period == cmd.billing_period
            && self.external_id == cmd.external_id;
        if unchanged {
            return Ok(Vec::new());
        }

        Ok(vec![SubscriptionEvent::Activated(SubscriptionActivated {
            user_id: self.user_id,
            tier: cmd.tier,
            billing_period: cmd.billing_period,
            external_id: cmd.external_id.clone(),
            provider: cmd.provider.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelSubscription) -> Result<Vec<SubscriptionEvent>, DomainError> {
        self.ensure_cancellable()?;

        if let (Some(wanted), Some(stored)) = (&cmd.external_id, &self.external_id) {
            if wanted != stored {
                return Err(DomainError::validation("external id does not match subscription"));
            }
        }

        let period_end = match (self.tier, self.billing_period) {
            (Tier::Trial, _) | (_, None) => None,
            (_, Some(period)) => period.current_period_end(self.started_at, cmd.occurred_at),
        };

        let event = match period_end {
            Some(ends_at) => SubscriptionEvent::CancellationScheduled(CancellationScheduled {
                user_id: self.user_id,
                ends_at,
                occurred_at: cmd.occurred_at,
            }),
            None => SubscriptionEvent::Cancelled(SubscriptionCancelled {
                user_id: self.user_id,
                previous_tier: self.tier,
                occurred_at: cmd.occurred_at,
            }),
        };
        Ok(vec![event])
    }

    fn handle_expire(&self, cmd: &ExpireSubscription) -> Result<Vec<SubscriptionEvent>, DomainError> {
        if !self.is_expiry_due(cmd.occurred_at) {
            return Err(DomainError::invariant("subscription is not due to expire"));
        }

        Ok(vec![SubscriptionEvent::Expired(SubscriptionExpired {
            user_id: self.user_id,
            previous_tier: self.tier,
            occurred_at: cmd.occurred_at,
        })])
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event Appliers
    // ─────────────────────────────────────────────────────────────────────────

    fn apply_trial_started(&mut self, e: &TrialStarted) {
        self.tier = Tier::Trial;
        self.status = SubscriptionStatus::Active;
        self.started_at = e.occurred_at;
        self.expires_at = Some(e.expires_at);
        self.billing_period = None;
        self.cancel_at_period_end = false;
        self.trial_used = true;
    }

    fn apply_activated(&mut self, e: &SubscriptionActivated) {
        self.tier = e.tier;
        self.status = SubscriptionStatus::Active;
        self.started_at = e.occurred_at;
        self.expires_at = None;
        self.billing_period = e.billing_period;
        self.external_id = e.external_id.clone();
        self.provider = e.provider.clone().or_else(|| self.provider.take());
        self.cancel_at_period_end = false;
    }

    fn apply_cancellation_scheduled(&mut self, e: &CancellationScheduled) {
        self.cancel_at_period_end = true;
        self.expires_at = Some(e.ends_at);
    }

    fn apply_cancelled(&mut self, e: &SubscriptionCancelled) {
        self.tier = Tier::Free;
        self.status = SubscriptionStatus::Cancelled;
        self.expires_at = Some(e.occurred_at);
        self.cancel_at_period_end = false;
    }

    fn apply_expired(&mut self, e: &SubscriptionExpired) {
        // A lapsed trial falls back to the free plan; a lapsed paid plan ends cancelled.
        self.status = if e.previous_tier == Tier::Trial {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::Cancelled
        };
        self.tier = Tier::Free;
        self.cancel_at_period_end = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    fn fresh() -> Subscription {
        Subscription::implicit_free(UserId::new(), "sam@example.com", t0())
    }

    fn activate(tier: Tier, period: Option<BillingPeriod>, at: DateTime<Utc>) -> SubscriptionCommand {
        SubscriptionCommand::Activate(ActivateSubscription {
            tier,
            billing_period: period,
            external_id: Some("sub_123".to_string()),
            provider: Some("stripe".to_string()),
            occurred_at: at,
        })
    }

    fn start_trial(at: DateTime<Utc>) -> SubscriptionCommand {
        SubscriptionCommand::StartTrial(StartTrial { occurred_at: at })
    }

    fn cancel(at: DateTime<Utc>) -> SubscriptionCommand {
        SubscriptionCommand::Cancel(CancelSubscription {
            external_id: None,
            occurred_at: at,
        })
    }

    #[test]
    fn implicit_free_is_active_and_unversioned() {
        let sub = fresh();
        assert_eq!(sub.tier, Tier::Free);
        assert!(sub.is_active());
        assert_eq!(sub.expected_version(), ExpectedVersion::New);
    }

    #[test]
    fn trial_runs_seven_days_and_only_once() {
        let mut sub = fresh();
        let events = sub.execute(&start_trial(t0())).unwrap();
        assert_eq!(events[0].event_type(), "subscription.trial_started");
        assert_eq!(sub.tier, Tier::Trial);
        assert_eq!(sub.expires_at, Some(t0() + Duration::days(7)));
        assert!(sub.trial_used);
        assert_eq!(sub.version, 1);

        let err = sub.handle(&start_trial(t0() + Duration::days(30))).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn trial_expiry_falls_back_to_free() {
        let mut sub = fresh();
        sub.execute(&start_trial(t0())).unwrap();

        let day_six = t0() + Duration::days(6);
        assert!(sub.expiry_command(day_six).is_none());
        assert_eq!(sub.effective_tier(day_six), Tier::Trial);

        let day_eight = t0() + Duration::days(8);
        assert_eq!(sub.effective_tier(day_eight), Tier::Free);
        let cmd = sub.expiry_command(day_eight).unwrap();
        sub.execute(&cmd).unwrap();
        assert_eq!(sub.tier, Tier::Free);
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert!(sub.trial_used);
        assert!(sub.expiry_command(day_eight).is_none());
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let mut sub = fresh();
        sub.execute(&start_trial(t0())).unwrap();
        let end = t0() + trial_duration();
        assert!(!sub.is_expiry_due(end - Duration::seconds(1)));
        assert!(sub.is_expiry_due(end));
    }

    #[test]
    fn expire_rejected_when_not_due() {
        let sub = fresh();
        let err = sub
            .handle(&SubscriptionCommand::Expire(ExpireSubscription { occurred_at: t0() }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn activation_requires_paid_tier() {
        let sub = fresh();
        let err = sub.handle(&activate(Tier::Trial, None, t0())).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn activation_replaces_trial() {
        let mut sub = fresh();
        sub.execute(&start_trial(t0())).unwrap();
        sub.execute(&activate(Tier::AllInOne, Some(BillingPeriod::Yearly), t0() + Duration::days(2)))
            .unwrap();
        assert_eq!(sub.tier, Tier::AllInOne);
        assert_eq!(sub.expires_at, None);
        assert!(!sub.is_expiry_due(t0() + Duration::days(30)));
    }

    #[test]
    fn redelivered_activation_is_a_no_op() {
        let mut sub = fresh();
        sub.execute(&activate(Tier::Extended, Some(BillingPeriod::Monthly), t0())).unwrap();
        let events = sub
            .execute(&activate(Tier::Extended, Some(BillingPeriod::Monthly), t0() + Duration::hours(1)))
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(sub.version, 1);
    }

    #[test]
    fn paid_cancellation_keeps_access_until_period_end() {
        let mut sub = fresh();
        sub.execute(&activate(Tier::Extended, Some(BillingPeriod::Monthly), t0())).unwrap();

        let cancelled_at = t0() + Duration::days(10);
        sub.execute(&cancel(cancelled_at)).unwrap();
        let period_end = Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap();
        assert!(sub.is_active());
        assert!(sub.cancel_at_period_end);
        assert_eq!(sub.tier, Tier::Extended);
        assert_eq!(sub.expires_at, Some(period_end));
        assert_eq!(sub.effective_tier(period_end - Duration::seconds(1)), Tier::Extended);

        let cmd = sub.expiry_command(period_end).unwrap();
        sub.execute(&cmd).unwrap();
        assert_eq!(sub.tier, Tier::Free);
        assert_eq!(sub.status, SubscriptionStatus::Cancelled);
        assert!(!sub.cancel_at_period_end);
    }

    #[test]
    fn cancellation_without_period_is_immediate() {
        let mut sub = fresh();
        sub.execute(&activate(Tier::AllInOne, None, t0())).unwrap();
        sub.execute(&cancel(t0() + Duration::days(3))).unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Cancelled);
        assert_eq!(sub.tier, Tier::Free);
    }

    #[test]
    fn cancelling_twice_is_rejected() {
        let mut sub = fresh();
        sub.execute(&activate(Tier::Extended, Some(BillingPeriod::Monthly), t0())).unwrap();
        sub.execute(&cancel(t0() + Duration::days(1))).unwrap();
        assert!(sub.handle(&cancel(t0() + Duration::days(2))).is_err());
    }

    #[test]
    fn cancel_checks_external_id() {
        let mut sub = fresh();
        sub.execute(&activate(Tier::Extended, Some(BillingPeriod::Monthly), t0())).unwrap();
        let err = sub
            .handle(&SubscriptionCommand::Cancel(CancelSubscription {
                external_id: Some("sub_other".to_string()),
                occurred_at: t0(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn reactivation_clears_scheduled_cancellation() {
        let mut sub = fresh();
        sub.execute(&activate(Tier::Extended, Some(BillingPeriod::Monthly), t0())).unwrap();
        sub.execute(&cancel(t0() + Duration::days(1))).unwrap();
        sub.execute(&activate(Tier::Extended, Some(BillingPeriod::Monthly), t0() + Duration::days(2)))
            .unwrap();
        assert!(!sub.cancel_at_period_end);
        assert_eq!(sub.expires_at, None);
    }

    #[test]
    fn free_account_cannot_cancel() {
        assert!(fresh().handle(&cancel(t0())).is_err());
    }
}
