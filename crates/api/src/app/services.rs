//! Service wiring: credential store, session machinery, entitlement services.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use keyward_auth::{
    CredentialStore, Revalidator, RevocationCache, ServiceAssertionSigner, SessionIssuer,
    SessionSealer, SharedSecret,
};
use keyward_core::Clock;
use keyward_entitlements::{ProductCatalog, TrialLifecycleManager};
use keyward_infra::{
    HttpCredentialStore, InMemoryCredentialStore, InMemorySubscriptionStore, InMemoryUsageStore,
    SubscriptionService, SubscriptionStore, UsageMeter, UsageStore,
};

use crate::config::AppConfig;

pub type DynCredentialStore = Arc<dyn CredentialStore>;
pub type Subscriptions = SubscriptionService<Arc<dyn SubscriptionStore>>;
pub type Usage = UsageMeter<Arc<dyn UsageStore>>;

pub struct AppServices {
    pub clock: Arc<dyn Clock>,
    pub credentials: DynCredentialStore,
    /// Present when running the in-memory credential store (dev and tests).
    pub accounts: Option<Arc<InMemoryCredentialStore>>,
    pub credential_secret: SharedSecret,
    pub webhook_secret: SharedSecret,
    pub issuer: SessionIssuer<DynCredentialStore>,
    pub sealer: SessionSealer,
    pub revalidator: Revalidator<DynCredentialStore>,
    pub signer: ServiceAssertionSigner,
    pub subscriptions: Arc<Subscriptions>,
    pub usage: Usage,
    pub products: ProductCatalog,
}

impl AppServices {
    /// Wire everything from configuration. Connects to Postgres when `DATABASE_URL` is set
    /// and the `postgres` feature is enabled; otherwise uses in-memory stores.
    pub async fn build(config: &AppConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let (credentials, accounts): (DynCredentialStore, _) = match &config.credential_store_url {
            Some(url) => {
                let store = HttpCredentialStore::new(url.clone(), config.credential_store_timeout)
                    .context("building credential store client")?;
                info!(base_url = store.base_url(), "using hosted credential store");
                (Arc::new(store), None)
            }
            None => {
                info!("using in-memory credential store");
                let store = Arc::new(InMemoryCredentialStore::new(config.credential_store_secret.clone()));
                (store.clone() as DynCredentialStore, Some(store))
            }
        };

        let (subscription_store, usage_store) = build_stores(config).await?;

        Ok(Self::assemble(config, clock, credentials, accounts, subscription_store, usage_store))
    }

    /// Everything in memory; the credential store is returned in `accounts`.
    pub fn in_memory(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let accounts = Arc::new(InMemoryCredentialStore::new(config.credential_store_secret.clone()));
        Self::assemble(
            config,
            clock,
            accounts.clone(),
            Some(accounts),
            Arc::new(InMemorySubscriptionStore::new()),
            Arc::new(InMemoryUsageStore::new()),
        )
    }

    fn assemble(
        config: &AppConfig,
        clock: Arc<dyn Clock>,
        credentials: DynCredentialStore,
        accounts: Option<Arc<InMemoryCredentialStore>>,
        subscription_store: Arc<dyn SubscriptionStore>,
        usage_store: Arc<dyn UsageStore>,
    ) -> Self {
        let signer = ServiceAssertionSigner::from_secret(
            config.assertion_private_key.as_ref().map(SharedSecret::expose),
            config.public_url.clone(),
            config.assertion_audience.clone(),
        );

        Self {
            clock,
            issuer: SessionIssuer::new(credentials.clone(), config.credential_store_secret.clone()),
            revalidator: Revalidator::new(
                credentials.clone(),
                config.credential_store_secret.clone(),
                Arc::new(RevocationCache::new()),
            )
            .with_interval(config.revalidation_interval),
            credentials,
            accounts,
            credential_secret: config.credential_store_secret.clone(),
            webhook_secret: config.webhook_secret.clone(),
            sealer: SessionSealer::new(config.session_secret.expose()),
            signer,
            subscriptions: Arc::new(SubscriptionService::new(
                subscription_store,
                TrialLifecycleManager::new(config.trial_on_registration),
            )),
            usage: UsageMeter::new(usage_store),
            products: config.products.clone(),
        }
    }
}

#[cfg(feature = "postgres")]
async fn build_stores(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn SubscriptionStore>, Arc<dyn UsageStore>)> {
    use keyward_infra::{PostgresSubscriptionStore, PostgresUsageStore};

    match &config.database_url {
        Some(url) => {
            let pool = sqlx::PgPool::connect(url)
                .await
                .context("connecting to postgres")?;
            info!("using postgres subscription and usage stores");
            Ok((
                Arc::new(PostgresSubscriptionStore::new(pool.clone())),
                Arc::new(PostgresUsageStore::new(pool)),
            ))
        }
        None => Ok(in_memory_stores()),
    }
}

#[cfg(not(feature = "postgres"))]
async fn build_stores(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn SubscriptionStore>, Arc<dyn UsageStore>)> {
    if config.database_url.is_some() {
        tracing::warn!("DATABASE_URL is set but the postgres feature is disabled; using in-memory stores");
    }
    Ok(in_memory_stores())
}

fn in_memory_stores() -> (Arc<dyn SubscriptionStore>, Arc<dyn UsageStore>) {
    info!("using in-memory subscription and usage stores");
    (
        Arc::new(InMemorySubscriptionStore::new()),
        Arc::new(InMemoryUsageStore::new()),
    )
}
