//! `keyward-entitlements` — subscription tiers, feature gating, trials and quota math.
//!
//! Feature gating (`resolver`) and quota math (`usage`) are independent axes: neither
//! module consults the other. They are combined only by callers.

pub mod billing;
pub mod feature;
pub mod resolver;
pub mod subscription;
pub mod tier;
pub mod trial;
pub mod usage;

pub use billing::{ProductCatalog, ProductMapping};
pub use feature::Feature;
pub use resolver::{AccessDecision, AccessReason, EntitlementResolver};
pub use subscription::{Subscription, SubscriptionCommand, SubscriptionEvent};
pub use tier::{BillingPeriod, SubscriptionStatus, Tier};
pub use trial::TrialLifecycleManager;
pub use usage::{FREE_MONTHLY_CONVERSATIONS, MonthKey, UsageCounter, UsageReport};
