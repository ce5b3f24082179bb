// src/config/bus.rs
// Durable queue / worker-pool configuration

use serde::{Deserialize, Serialize};

use super::helpers::env_or_parsed;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Number of SyncWorker consumer tasks in the pool.
    pub worker_pool_size: usize,
    /// Max delivery attempts before a message is sent to the DLQ.
    pub max_delivery_attempts: u32,
    /// Maximum lifetime a message may sit in the queue before expiry to DLQ.
    pub max_message_lifetime_seconds: i64,
    /// Polling interval for the worker pool's queue claim loop.
    pub poll_interval_ms: u64,
    /// How long a WebhookEvent row may sit in `processing` before the
    /// maintenance loop assumes its worker crashed and resets it to
    /// `pending` for redelivery.
    pub stuck_processing_reset_seconds: i64,
}

impl BusConfig {
    pub fn from_env() -> Self {
        Self {
            worker_pool_size: env_or_parsed("SYNC_WORKER_POOL_SIZE", 4),
            max_delivery_attempts: env_or_parsed("SYNC_BUS_MAX_ATTEMPTS", 5),
            max_message_lifetime_seconds: env_or_parsed("SYNC_BUS_MAX_LIFETIME_SECONDS", 86_400),
            poll_interval_ms: env_or_parsed("SYNC_BUS_POLL_INTERVAL_MS", 250),
            stuck_processing_reset_seconds: env_or_parsed("SYNC_STUCK_PROCESSING_RESET_SECONDS", 600),
        }
    }
}
