//! Infrastructure layer: credential store adapters, subscription and usage persistence,
//! the services that drive the entitlement domain, and background workers.

pub mod credential_store;
pub mod error;
pub mod subscription_store;
pub mod subscriptions;
pub mod usage;
pub mod usage_store;
pub mod workers;

pub use credential_store::{HttpCredentialStore, InMemoryCredentialStore};
pub use error::StoreError;
pub use subscription_store::{InMemorySubscriptionStore, SubscriptionStore};
pub use subscriptions::{Activation, SubscriptionError, SubscriptionService};
pub use usage::{UsageError, UsageMeter};
pub use usage_store::{InMemoryUsageStore, UsageStore};

#[cfg(feature = "postgres")]
pub use subscription_store::PostgresSubscriptionStore;
#[cfg(feature = "postgres")]
pub use usage_store::PostgresUsageStore;
