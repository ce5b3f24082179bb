// src/config/scheduler.rs
// Scheduler / dispatcher configuration

use serde::{Deserialize, Serialize};

use super::helpers::env_or_parsed;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Clock tick interval, seconds. Spec requires <= 1 minute.
    pub tick_interval_seconds: u64,
    /// Lease duration for the single-leader scheduler/poller loops.
    pub lease_duration_seconds: i64,
    /// Identity of this process for lease acquisition.
    pub leader_id: String,
    /// Max dispatch retry attempts before Delivery is marked failed.
    pub max_dispatch_retries: u32,
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        Self {
            tick_interval_seconds: env_or_parsed("SYNC_SCHEDULER_TICK_SECONDS", 30),
            lease_duration_seconds: env_or_parsed("SYNC_SCHEDULER_LEASE_SECONDS", 60),
            leader_id: env_or_parsed(
                "SYNC_SCHEDULER_LEADER_ID",
                uuid::Uuid::new_v4().to_string(),
            ),
            max_dispatch_retries: env_or_parsed("SYNC_MAX_DISPATCH_RETRIES", 3),
        }
    }
}
