// src/scheduler/mod.rs
// Scheduler: single-leader tick loop that claims due
// subscriptions, builds and dispatches their artifact, and recomputes the
// next cadence anchor. Mirrors the Poller's one-loop-per-cycle shape
// (poller/mod.rs) but adds lease-gated leader election: the loop pauses
// whenever the lease is lost.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::config::scheduler::SchedulerConfig;
use crate::dispatcher::Dispatcher;
use crate::domain::Cadence;
use crate::error::CoreError;
use crate::store::subscription::Subscription;
use crate::store::Store;

/// The rendered result of a build job, produced by the artifact module and
/// consumed here without the Scheduler knowing anything about ranking or
/// anonymization.
pub struct BuiltArtifact {
    pub subject: String,
    pub body: String,
    pub item_count: i64,
}

/// Seam between the Scheduler and the artifact module, so this crate's
/// dependency graph stays acyclic (artifact builds depend on Store only,
/// the scheduler depends on this trait). Implemented by
/// `artifact::ArtifactBuilder`.
#[async_trait]
pub trait ArtifactBuilder: Send + Sync {
    async fn build(&self, subscription: &Subscription) -> Result<BuiltArtifact, CoreError>;
}

pub struct Scheduler {
    store: Store,
    builder: Arc<dyn ArtifactBuilder>,
    dispatcher: Arc<Dispatcher>,
    config: SchedulerConfig,
}

const LEASE_NAME: &str = "scheduler";

impl Scheduler {
    pub fn new(
        store: Store,
        builder: Arc<dyn ArtifactBuilder>,
        dispatcher: Arc<Dispatcher>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            builder,
            dispatcher,
            config,
        }
    }

    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run_loop().await })
    }

    async fn run_loop(&self) {
        info!("scheduler loop started");
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.tick_interval_seconds));
        loop {
            interval.tick().await;
            match self
                .store
                .lease
                .acquire_or_renew(
                    LEASE_NAME,
                    &self.config.leader_id,
                    self.config.lease_duration_seconds,
                )
                .await
            {
                Ok(true) => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "scheduler tick failed");
                    }
                }
                Ok(false) => {
                    // Another process holds the lease; stay idle this tick.
                }
                Err(e) => warn!(error = %e, "lease acquisition failed"),
            }
        }
    }

    /// One tick: claim every currently-due subscription and run each to
    /// completion. Claim failures (lost the race to another leader) are
    /// skipped rather than retried within the same tick.
    async fn tick(&self) -> Result<(), CoreError> {
        let now = chrono::Utc::now();
        let due = self.store.subscriptions.list_due(now, 100).await?;
        for subscription in due {
            let anchor = match subscription.next_delivery_time {
                Some(t) => t,
                None => continue,
            };
            match self.store.subscriptions.try_claim(&subscription.id, now).await {
                Ok(true) => {
                    if let Err(e) = self.run_subscription(&subscription, anchor).await {
                        warn!(subscription_id = %subscription.id, error = %e, "subscription delivery failed");
                    }
                }
                Ok(false) => {}
                Err(e) => warn!(subscription_id = %subscription.id, error = %e, "claim failed"),
            }
        }
        Ok(())
    }

    /// Build, dispatch, and recompute the next anchor for one claimed
    /// subscription. `anchor` is the
    /// `next_delivery_time` read before the claim nulled it out.
    async fn run_subscription(
        &self,
        subscription: &Subscription,
        anchor: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), CoreError> {
        let delivery = self
            .store
            .deliveries
            .get_or_create_scheduled(&subscription.id, anchor, &subscription.filter_set)
            .await?;

        let built = self.builder.build(subscription).await;
        let delivered = match built {
            Ok(artifact) => {
                self.dispatcher
                    .dispatch(
                        &delivery,
                        &subscription.recipient_address,
                        &artifact.subject,
                        &artifact.body,
                        artifact.item_count,
                    )
                    .await
                    .is_ok()
            }
            Err(e) => {
                self.store.deliveries.mark_failed(&delivery.id, &e.to_string()).await?;
                false
            }
        };

        let tz: Tz = subscription.timezone.parse().unwrap_or(chrono_tz::UTC);
        let next = subscription.cadence.next_anchor(chrono::Utc::now(), tz);
        self.store
            .subscriptions
            .advance_next_delivery(&subscription.id, next, delivered)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::bus::BusConfig;
    use crate::dispatcher::LoggingTransport;
    use crate::domain::Cadence;
    use serde_json::json;

    struct FixedArtifact;

    #[async_trait]
    impl ArtifactBuilder for FixedArtifact {
        async fn build(&self, _subscription: &Subscription) -> Result<BuiltArtifact, CoreError> {
            Ok(BuiltArtifact {
                subject: "weekly digest".into(),
                body: "1 lead".into(),
                item_count: 1,
            })
        }
    }

    struct FailingArtifact;

    #[async_trait]
    impl ArtifactBuilder for FailingArtifact {
        async fn build(&self, _subscription: &Subscription) -> Result<BuiltArtifact, CoreError> {
            Err(CoreError::Internal("no data".into()))
        }
    }

    fn test_scheduler_config() -> SchedulerConfig {
        SchedulerConfig {
            tick_interval_seconds: 1,
            lease_duration_seconds: 60,
            leader_id: "leader-a".into(),
            max_dispatch_retries: 3,
        }
    }

    async fn seeded_subscription(store: &Store) -> Subscription {
        let anchor = chrono::Utc::now() - chrono::Duration::minutes(1);
        store
            .subscriptions
            .create(
                "user-1",
                "user-1@example.com",
                "general",
                Cadence::Weekly,
                5,
                "America/New_York",
                true,
                Some(anchor),
                &json!({}),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn claimed_subscription_advances_and_dispatches() {
        let store = Store::in_memory().await;
        let subscription = seeded_subscription(&store).await;
        let bus = crate::bus::Bus::new(
            store.pool.clone(),
            BusConfig {
                worker_pool_size: 1,
                max_delivery_attempts: 3,
                max_message_lifetime_seconds: 86_400,
                poll_interval_ms: 250,
                stuck_processing_reset_seconds: 600,
            },
        );
        let _ = bus;
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), Arc::new(LoggingTransport), 3));
        let scheduler = Scheduler::new(store.clone(), Arc::new(FixedArtifact), dispatcher, test_scheduler_config());

        scheduler.tick().await.unwrap();

        let refreshed = store.subscriptions.get(&subscription.id).await.unwrap().unwrap();
        assert!(refreshed.next_delivery_time.is_some());
        assert!(refreshed.last_delivery_time.is_some());

        let deliveries = store.deliveries.list_by_subscription(&subscription.id, 10).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].state.as_str(), "sent");
    }

    #[tokio::test]
    async fn build_failure_still_advances_next_delivery() {
        let store = Store::in_memory().await;
        let subscription = seeded_subscription(&store).await;
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), Arc::new(LoggingTransport), 3));
        let scheduler = Scheduler::new(store.clone(), Arc::new(FailingArtifact), dispatcher, test_scheduler_config());

        scheduler.tick().await.unwrap();

        let refreshed = store.subscriptions.get(&subscription.id).await.unwrap().unwrap();
        assert!(refreshed.next_delivery_time.is_some());
        assert!(refreshed.last_delivery_time.is_none());

        let deliveries = store.deliveries.list_by_subscription(&subscription.id, 10).await.unwrap();
        assert_eq!(deliveries[0].state.as_str(), "failed");
    }

    #[tokio::test]
    async fn inactive_subscription_is_never_claimed() {
        let store = Store::in_memory().await;
        store
            .subscriptions
            .create(
                "user-2",
                "user-2@example.com",
                "general",
                Cadence::Daily,
                5,
                "UTC",
                false,
                None,
                &json!({}),
            )
            .await
            .unwrap();
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), Arc::new(LoggingTransport), 3));
        let scheduler = Scheduler::new(store.clone(), Arc::new(FixedArtifact), dispatcher, test_scheduler_config());

        scheduler.tick().await.unwrap();
        // No panics, no deliveries created for an inactive subscription.
    }
}
