//! Feature gating.
//!
//! Pure: decisions depend only on the identity, the subscription and `now`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keyward_auth::Identity;

use crate::{Feature, Subscription, SubscriptionStatus, Tier};

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessReason {
    Admin,
    Inactive,
    TrialExpired,
    TierGrants,
    TierLacks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub feature: Feature,
    pub allowed: bool,
    pub reason: AccessReason,
    /// Tier the decision was taken against; absent for admins.
    pub tier: Option<Tier>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EntitlementResolver;

impl EntitlementResolver {
    pub fn has_feature_access(
        identity: &Identity,
        subscription: Option<&Subscription>,
        feature: Feature,
        now: DateTime<Utc>,
    ) -> bool {
        Self::explain(identity, subscription, feature, now).allowed
    }

    /// Same decision as `has_feature_access`, with the rule that produced it.
    pub fn explain(
        identity: &Identity,
        subscription: Option<&Subscription>,
        feature: Feature,
        now: DateTime<Utc>,
    ) -> AccessDecision {
        let decide = |allowed, reason, tier| AccessDecision {
            feature,
            allowed,
            reason,
            tier,
        };

        if identity.is_admin() {
            return decide(true, AccessReason::Admin, None);
        }

        // No row means free and active.
        let (tier, status) = subscription
            .map(|s| (s.tier, s.status))
            .unwrap_or((Tier::Free, SubscriptionStatus::Active));

        if status != SubscriptionStatus::Active {
            return decide(false, AccessReason::Inactive, Some(tier));
        }

        let trial_lapsed = tier == Tier::Trial
            && subscription
                .and_then(|s| s.expires_at)
                .is_none_or(|expires_at| expires_at <= now);
        if trial_lapsed {
            return decide(false, AccessReason::TrialExpired, Some(tier));
        }

        if Feature::granted_by(tier).contains(&feature) {
            decide(true, AccessReason::TierGrants, Some(tier))
        } else {
            decide(false, AccessReason::TierLacks, Some(tier))
        }
    }

    /// Every feature the identity may use at `now`.
    pub fn granted_features(
        identity: &Identity,
        subscription: Option<&Subscription>,
        now: DateTime<Utc>,
    ) -> Vec<Feature> {
        Feature::ALL
            .into_iter()
            .filter(|f| Self::has_feature_access(identity, subscription, *f, now))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::{ActivateSubscription, StartTrial, SubscriptionCommand};
    use crate::{BillingPeriod, Subscription};
    use chrono::Duration;
    use keyward_auth::Role;
    use keyward_core::{Aggregate, UserId};
    use proptest::prelude::*;

    fn member() -> Identity {
        Identity {
            id: UserId::new(),
            email: "member@example.com".to_string(),
            name: None,
            role: Role::Member,
        }
    }

    fn with_tier(identity: &Identity, tier: Tier, now: DateTime<Utc>) -> Subscription {
        let mut sub = Subscription::implicit_free(identity.id, identity.email.clone(), now);
        match tier {
            Tier::Free => {}
            Tier::Trial => {
                sub.execute(&SubscriptionCommand::StartTrial(StartTrial { occurred_at: now }))
                    .unwrap();
            }
            paid => {
                sub.execute(&SubscriptionCommand::Activate(ActivateSubscription {
                    tier: paid,
                    billing_period: Some(BillingPeriod::Monthly),
                    external_id: None,
                    provider: None,
                    occurred_at: now,
                }))
                .unwrap();
            }
        }
        sub
    }

    #[test]
    fn memories_only_for_all_in_one_trial_or_admin() {
        let now = Utc::now();
        let user = member();
        let check = |sub: Option<&Subscription>, at| {
            EntitlementResolver::has_feature_access(&user, sub, Feature::Memories, at)
        };

        assert!(!check(None, now));
        assert!(!check(Some(&with_tier(&user, Tier::Free, now)), now));
        assert!(!check(Some(&with_tier(&user, Tier::Extended, now)), now));
        assert!(check(Some(&with_tier(&user, Tier::AllInOne, now)), now));

        let trial = with_tier(&user, Tier::Trial, now);
        assert!(check(Some(&trial), now + Duration::days(6)));
        assert!(!check(Some(&trial), now + Duration::days(8)));

        let admin = Identity {
            role: Role::Admin,
            ..member()
        };
        assert!(EntitlementResolver::has_feature_access(&admin, None, Feature::Memories, now));
    }

    #[test]
    fn extended_grants_core_features_only() {
        let now = Utc::now();
        let user = member();
        let sub = with_tier(&user, Tier::Extended, now);
        assert_eq!(
            EntitlementResolver::granted_features(&user, Some(&sub), now),
            vec![
                Feature::UnlimitedConversations,
                Feature::CheckIns,
                Feature::Goals,
                Feature::Reflections,
            ]
        );
    }

    #[test]
    fn explain_reports_trial_expiry() {
        let now = Utc::now();
        let user = member();
        let trial = with_tier(&user, Tier::Trial, now);
        let decision =
            EntitlementResolver::explain(&user, Some(&trial), Feature::CheckIns, now + Duration::days(7));
        assert!(!decision.allowed);
        assert_eq!(decision.reason, AccessReason::TrialExpired);
    }

    #[test]
    fn explain_serializes_reason_and_tier() {
        let decision = AccessDecision {
            feature: Feature::Goals,
            allowed: true,
            reason: AccessReason::TierGrants,
            tier: Some(Tier::Extended),
        };
        let json = serde_json::to_value(decision).unwrap();
        assert_eq!(json["feature"], "goals");
        assert_eq!(json["reason"], "tier_grants");
        assert_eq!(json["tier"], "extended");
    }

    fn any_tier() -> impl Strategy<Value = Tier> {
        prop::sample::select(Tier::ALL.to_vec())
    }

    fn any_feature() -> impl Strategy<Value = Feature> {
        prop::sample::select(Feature::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn inactive_subscription_grants_nothing(tier in any_tier(), feature in any_feature(), offset_days in 0i64..30) {
            let now = Utc::now();
            let user = member();
            let mut sub = with_tier(&user, tier, now);
            sub.status = SubscriptionStatus::Cancelled;
            let at = now + Duration::days(offset_days);
            prop_assert!(!EntitlementResolver::has_feature_access(&user, Some(&sub), feature, at));
        }

        #[test]
        fn admin_is_granted_everything(tier in any_tier(), feature in any_feature()) {
            let now = Utc::now();
            let admin = Identity { role: Role::Admin, ..member() };
            let mut sub = with_tier(&admin, tier, now);
            sub.status = SubscriptionStatus::Cancelled;
            prop_assert!(EntitlementResolver::has_feature_access(&admin, Some(&sub), feature, now));
            prop_assert!(EntitlementResolver::has_feature_access(&admin, None, feature, now));
        }

        #[test]
        fn decision_matches_explanation(tier in any_tier(), feature in any_feature(), offset_days in 0i64..10) {
            let now = Utc::now();
            let user = member();
            let sub = with_tier(&user, tier, now);
            let at = now + Duration::days(offset_days);
            prop_assert_eq!(
                EntitlementResolver::has_feature_access(&user, Some(&sub), feature, at),
                EntitlementResolver::explain(&user, Some(&sub), feature, at).allowed
            );
        }
    }
}
