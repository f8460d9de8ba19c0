use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use keyward_api::app::{router_with, services::AppServices};
use keyward_api::config::AppConfig;
use keyward_core::{Clock, SystemClock};
use keyward_infra::workers::TrialSweeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    keyward_observability::init();

    let config = AppConfig::from_env()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let services = Arc::new(AppServices::build(&config, clock.clone()).await?);

    let sweeper = config.sweep_interval.map(|interval| {
        TrialSweeper {
            interval,
            ..TrialSweeper::default()
        }
        .spawn(services.subscriptions.clone(), clock.clone())
    });

    let app = router_with(services);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.shutdown().await;
    }
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}
