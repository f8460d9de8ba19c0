use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use keyward_core::Clock;

use crate::subscription_store::SubscriptionStore;
use crate::subscriptions::SubscriptionService;

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

/// Periodically applies due expiries (lapsed trials, ended cancellation periods).
///
/// Reads already expire lazily; the sweeper only keeps stored rows close to the truth for
/// accounts that are not being read.
#[derive(Debug, Clone, Copy)]
pub struct TrialSweeper {
    pub interval: Duration,
    pub batch_size: usize,
}

impl Default for TrialSweeper {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            batch_size: 500,
        }
    }
}

impl TrialSweeper {
    /// Spawn the sweep loop on the current tokio runtime.
    pub fn spawn<S>(
        self,
        service: Arc<SubscriptionService<S>>,
        clock: Arc<dyn Clock>,
    ) -> WorkerHandle
    where
        S: SubscriptionStore + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                match service.sweep(clock.now(), self.batch_size).await {
                    Ok(0) => debug!("trial sweep: nothing due"),
                    Ok(expired) => info!(expired, "trial sweep applied expiries"),
                    Err(e) => warn!(error = %e, "trial sweep failed"),
                }
            }
        });

        WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, Utc};

    use keyward_core::{ManualClock, UserId};
    use keyward_entitlements::{Tier, TrialLifecycleManager};

    use super::*;
    use crate::InMemorySubscriptionStore;

    #[tokio::test]
    async fn sweeper_expires_lapsed_trials_and_stops() {
        let t0 = Utc::now();
        let clock = Arc::new(ManualClock::new(t0));
        let service = Arc::new(SubscriptionService::new(
            Arc::new(InMemorySubscriptionStore::new()),
            TrialLifecycleManager::default(),
        ));

        let user = UserId::new();
        service.grant_trial(user, "sweep@example.com", t0).await.unwrap();
        clock.advance(ChronoDuration::days(8));

        let handle = TrialSweeper {
            interval: Duration::from_millis(10),
            batch_size: 10,
        }
        .spawn(service.clone(), clock.clone());

        let mut expired = false;
        for _ in 0..100 {
            let stored = service.store().load(user).await.unwrap();
            if stored.is_some_and(|s| s.tier == Tier::Free) {
                expired = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.shutdown().await;
        assert!(expired);
    }
}
