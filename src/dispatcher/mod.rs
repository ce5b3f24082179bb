// src/dispatcher/mod.rs
// Dispatcher: transmits a rendered artifact to a recipient
// over whatever channel the deployment wires up, and drives a Delivery row
// through scheduled -> in_progress -> sent|failed. The channel itself (email,
// chat webhook, whatever "configured external channel" means for a given
// deployment) is out of scope, so `Transport` is a trait with one in-tree
// implementation, the same seam-over-trait pattern used elsewhere for
// out-of-scope backends.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::store::delivery::Delivery;
use crate::store::Store;
use crate::utils::backoff::retry_with_backoff;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `body` to `recipient` and return a channel-assigned message id.
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<String, DispatchError>;
}

/// In-tree transport: records the send via `tracing` and assigns a UUID
/// message id. The real channel a deployment points at (SMTP relay, chat
/// webhook, ...) is out of scope; this stands in for it so the
/// retry/state-machine logic is exercised without a live external channel.
pub struct LoggingTransport;

#[async_trait]
impl Transport for LoggingTransport {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<String, DispatchError> {
        let message_id = Uuid::new_v4().to_string();
        tracing::info!(
            recipient,
            subject,
            message_id = %message_id,
            body_len = body.len(),
            "dispatched delivery"
        );
        Ok(message_id)
    }
}

pub struct Dispatcher {
    store: Store,
    transport: Arc<dyn Transport>,
    max_attempts: u32,
}

impl Dispatcher {
    pub fn new(store: Store, transport: Arc<dyn Transport>, max_attempts: u32) -> Self {
        Self {
            store,
            transport,
            max_attempts,
        }
    }

    /// Drives `delivery` from `scheduled` to a terminal state. `subject` and
    /// `body` are the already-rendered artifact (built by the artifact
    /// module); this function owns only the send-and-record step.
    ///
    /// Idempotency is the caller's responsibility: `delivery` must already be
    /// the row returned by `DeliveryStore::get_or_create_scheduled` for the
    /// (subscription, scheduled_anchor) pair.
    pub async fn dispatch(
        &self,
        delivery: &Delivery,
        recipient: &str,
        subject: &str,
        body: &str,
        item_count: i64,
    ) -> Result<(), DispatchError> {
        self.store.deliveries.mark_in_progress(&delivery.id).await?;

        let transport = self.transport.clone();
        let recipient = recipient.to_string();
        let subject = subject.to_string();
        let body_owned = body.to_string();

        let result = retry_with_backoff(
            "dispatcher_send",
            self.max_attempts,
            Duration::from_millis(200),
            || {
                let transport = transport.clone();
                let recipient = recipient.clone();
                let subject = subject.clone();
                let body = body_owned.clone();
                async move { transport.send(&recipient, &subject, &body).await }
            },
        )
        .await;

        match result {
            Ok(message_id) => {
                self.store
                    .deliveries
                    .mark_sent(&delivery.id, item_count, &message_id, body)
                    .await?;
                crate::metrics::record_delivery_sent();
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                self.store.deliveries.mark_failed(&delivery.id, &message).await?;
                crate::metrics::record_delivery_failed();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyTransport {
        failures_remaining: AtomicU32,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn send(&self, _recipient: &str, _subject: &str, _body: &str) -> Result<String, DispatchError> {
            if self.failures_remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
                return Err(DispatchError::Transport("channel unavailable".into()));
            }
            Ok("msg-ok".into())
        }
    }

    struct AlwaysFailsTransport;

    #[async_trait]
    impl Transport for AlwaysFailsTransport {
        async fn send(&self, _recipient: &str, _subject: &str, _body: &str) -> Result<String, DispatchError> {
            Err(DispatchError::Transport("permanently down".into()))
        }
    }

    async fn scheduled_delivery(store: &Store) -> Delivery {
        store
            .deliveries
            .get_or_create_scheduled("sub-1", chrono::Utc::now(), &json!({}))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn logging_transport_always_succeeds() {
        let transport = LoggingTransport;
        let id = transport.send("a@example.com", "subj", "body").await.unwrap();
        assert!(!id.is_empty());
    }

    #[tokio::test]
    async fn successful_dispatch_marks_delivery_sent() {
        let store = Store::in_memory().await;
        let delivery = scheduled_delivery(&store).await;
        let dispatcher = Dispatcher::new(store.clone(), Arc::new(LoggingTransport), 3);

        dispatcher
            .dispatch(&delivery, "a@example.com", "subject", "body text", 4)
            .await
            .unwrap();

        let refreshed = store.deliveries.get(&delivery.id).await.unwrap().unwrap();
        assert_eq!(refreshed.state.as_str(), "sent");
        assert_eq!(refreshed.item_count, 4);
        assert!(refreshed.dispatcher_message_id.is_some());
    }

    #[tokio::test]
    async fn transient_failures_recover_within_retry_budget() {
        let store = Store::in_memory().await;
        let delivery = scheduled_delivery(&store).await;
        let transport = Arc::new(FlakyTransport {
            failures_remaining: AtomicU32::new(2),
        });
        let dispatcher = Dispatcher::new(store.clone(), transport, 5);

        dispatcher
            .dispatch(&delivery, "a@example.com", "subject", "body", 1)
            .await
            .unwrap();

        let refreshed = store.deliveries.get(&delivery.id).await.unwrap().unwrap();
        assert_eq!(refreshed.state.as_str(), "sent");
    }

    #[tokio::test]
    async fn exhausted_retries_mark_delivery_failed() {
        let store = Store::in_memory().await;
        let delivery = scheduled_delivery(&store).await;
        let dispatcher = Dispatcher::new(store.clone(), Arc::new(AlwaysFailsTransport), 2);

        let result = dispatcher
            .dispatch(&delivery, "a@example.com", "subject", "body", 1)
            .await;
        assert!(result.is_err());

        let refreshed = store.deliveries.get(&delivery.id).await.unwrap().unwrap();
        assert_eq!(refreshed.state.as_str(), "failed");
        assert!(refreshed.error.is_some());
    }
}
