// src/config/poller.rs
// Reconciliation poller configuration

use serde::{Deserialize, Serialize};

use super::helpers::env_or_parsed;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Per-module poll interval, minutes (default 15 per spec §6).
    pub interval_minutes: u64,
    /// Page size for each cursor query against the vendor.
    pub page_size: u32,
}

impl PollerConfig {
    pub fn from_env() -> Self {
        Self {
            interval_minutes: env_or_parsed("SYNC_POLL_INTERVAL_MINUTES", 15),
            page_size: env_or_parsed("SYNC_POLL_PAGE_SIZE", 200),
        }
    }
}
