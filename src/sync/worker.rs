// src/sync/worker.rs
// SyncWorker: a bounded pool of tokio-spawned consumer tasks pulling from the
// Bus, generalizing a single-loop watcher idiom from one consumer to N.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument, warn};

use crate::bus::{Bus, QueueMessage};
use crate::config::bus::BusConfig;
use crate::domain::{EventKind, ProcessingState};
use crate::error::SyncError;
use crate::store::Store;
use crate::sync::core::{apply_incoming_record, ApplyOutcome, IncomingRecord};
use crate::sync::payload;

pub struct SyncWorkerPool {
    store: Store,
    bus: Bus,
    config: BusConfig,
}

impl SyncWorkerPool {
    pub fn new(store: Store, bus: Bus, config: BusConfig) -> Self {
        Self { store, bus, config }
    }

    /// Spawn `worker_pool_size` consumer tasks, each polling the Bus on its
    /// own interval.
    pub fn spawn(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.config.worker_pool_size)
            .map(|worker_id| {
                let pool = self.clone();
                tokio::spawn(async move { pool.run_consumer_loop(worker_id).await })
            })
            .collect()
    }

    async fn run_consumer_loop(&self, worker_id: usize) {
        info!(worker_id, "sync worker started");
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
        loop {
            interval.tick().await;
            match self.bus.claim_batch(4).await {
                Ok(messages) => {
                    for message in messages {
                        self.process_message(worker_id, message).await;
                    }
                }
                Err(e) => warn!(worker_id, error = %e, "bus claim failed"),
            }
        }
    }

    #[instrument(skip(self, message), fields(event_id = %message.event_id, module = %message.module, external_id = %message.external_id))]
    async fn process_message(&self, worker_id: usize, message: QueueMessage) {
        match self.handle_one(&message).await {
            Ok(()) => {
                if let Err(e) = self.bus.ack(&message.id).await {
                    error!(worker_id, error = %e, "failed to ack processed message");
                }
            }
            Err(SyncError::PoisonedPayload(reason)) => {
                warn!(worker_id, reason = %reason, "poisoned payload, dead-lettering without retry");
                let _ = self.bus.dead_letter(&message.id, &reason).await;
            }
            Err(e) => {
                warn!(worker_id, error = %e, "transient sync failure, nacking for retry");
                let _ = self.bus.nack_retry(&message.id, &e.to_string()).await;
            }
        }
    }

    /// Process one queue message end to end.
    async fn handle_one(&self, message: &QueueMessage) -> Result<(), SyncError> {
        let event = self
            .store
            .webhook_log
            .get(&message.event_id)
            .await?
            .ok_or_else(|| SyncError::Transient(format!("webhook_log row {} missing", message.event_id)))?;

        if event.state.is_terminal() {
            // Dedup after delivery: already resolved,
            // nothing to do but ack.
            return Ok(());
        }

        if !self.store.webhook_log.try_claim(&event.id).await? {
            // Lost the claim race to another worker; treat as a no-op.
            return Ok(());
        }

        if event.event_kind.is_delete() {
            let modified_time = payload::extract_modified_time(&event.raw_payload)?;
            let incoming = IncomingRecord {
                module: event.module,
                external_id: &event.external_id,
                event_kind: EventKind::Delete,
                owner_email: None,
                owner_display_name: None,
                created_time: None,
                modified_time,
                payload: &event.raw_payload,
            };
            apply_incoming_record(&self.store, &incoming).await?;
            self.store.webhook_log.mark_success(&event.id).await?;
            self.store.sync_metadata.record_webhook_received(event.module).await?;
            return Ok(());
        }

        let modified_time = payload::extract_modified_time(&event.raw_payload)?;
        let owner_email = payload::extract_owner_email(&event.raw_payload);
        let owner_name = payload::extract_owner_name(&event.raw_payload);
        let created_time = payload::extract_created_time(&event.raw_payload);

        let incoming = IncomingRecord {
            module: event.module,
            external_id: &event.external_id,
            event_kind: event.event_kind,
            owner_email: owner_email.as_deref(),
            owner_display_name: owner_name.as_deref(),
            created_time,
            modified_time,
            payload: &event.raw_payload,
        };

        let outcome = apply_incoming_record(&self.store, &incoming).await?;
        self.store.sync_metadata.record_webhook_received(event.module).await?;

        match outcome {
            ApplyOutcome::Inserted | ApplyOutcome::Updated | ApplyOutcome::Tombstoned | ApplyOutcome::NoopMissingDelete => {
                self.store.webhook_log.mark_success(&event.id).await?;
            }
            ApplyOutcome::Conflict(_) => {
                self.store.webhook_log.mark_conflict(&event.id).await?;
            }
        }

        Ok(())
    }
}

/// Reset any WebhookEvent rows stuck in `processing` (worker crashed
/// mid-transaction) back to `pending` so they get picked up again. Run from
/// a maintenance task alongside the DedupCache sweep and clarification
/// reaper.
pub async fn reap_stuck_processing(store: &Store, older_than_seconds: i64) -> Result<u64, SyncError> {
    let reset = store.webhook_log.reset_stuck_processing(older_than_seconds).await?;
    Ok(reset)
}

#[allow(dead_code, unreachable_patterns)]
fn _exhaustive_match_guard(state: ProcessingState) {
    match state {
        ProcessingState::Pending
        | ProcessingState::Processing
        | ProcessingState::Success
        | ProcessingState::Failed
        | ProcessingState::Conflict => {}
    }
}
