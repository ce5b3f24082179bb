// src/config/dedup.rs
// DedupCache and conversation-memory hot-window configuration

use serde::{Deserialize, Serialize};

use super::helpers::env_or_parsed;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Webhook fingerprint dedup TTL, seconds (default 600s per spec §4.1/§6).
    pub ttl_seconds: u64,
    /// Sweep interval for expired dedup keys.
    pub sweep_interval_seconds: u64,
}

impl DedupConfig {
    pub fn from_env() -> Self {
        Self {
            ttl_seconds: env_or_parsed("SYNC_DEDUP_TTL_SECONDS", 600),
            sweep_interval_seconds: env_or_parsed("SYNC_DEDUP_SWEEP_SECONDS", 60),
        }
    }
}
