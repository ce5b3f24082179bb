// src/config/conversation.rs
// ConversationCore / clarification configuration

use serde::{Deserialize, Serialize};

use super::helpers::env_or_parsed;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Clarification session TTL, seconds (default 300s per spec §6).
    pub clarification_ttl_seconds: i64,
    /// Reaping window for expired-unresolved sessions, hours (default 24h).
    pub clarification_reap_hours: i64,
    /// Conversation memory cold-storage retention, days (default 30).
    pub memory_retention_days: i64,
    /// Intent classifier confidence threshold below which we clarify.
    pub confidence_threshold: f32,
    /// Free-text fuzzy-match similarity threshold for resolving a
    /// clarification from a non-numeric, non-`#n` reply.
    pub fuzzy_match_threshold: f32,
    /// Maximum number of options presented in a clarification prompt.
    pub max_options: usize,
    /// Size of the hot window of recent turns kept in DedupCache.
    pub hot_window_turns: usize,
}

impl ConversationConfig {
    pub fn from_env() -> Self {
        Self {
            clarification_ttl_seconds: env_or_parsed("SYNC_CLARIFICATION_TTL_SECONDS", 300),
            clarification_reap_hours: env_or_parsed("SYNC_CLARIFICATION_REAP_HOURS", 24),
            memory_retention_days: env_or_parsed("SYNC_MEMORY_RETENTION_DAYS", 30),
            confidence_threshold: env_or_parsed("SYNC_CONFIDENCE_THRESHOLD", 0.8),
            fuzzy_match_threshold: env_or_parsed("SYNC_FUZZY_MATCH_THRESHOLD", 0.8),
            max_options: env_or_parsed("SYNC_CLARIFICATION_MAX_OPTIONS", 5),
            hot_window_turns: env_or_parsed("SYNC_CONVERSATION_HOT_WINDOW", 10),
        }
    }
}
