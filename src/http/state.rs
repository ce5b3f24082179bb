// src/http/state.rs
// Shared axum handler state: one `Clone` struct of already-cheap-to-clone
// collaborators threaded through
// `State<AppState>` extractors rather than reached for as globals.

use std::sync::Arc;

use crate::bus::Bus;
use crate::config::AppConfig;
use crate::conversation::ConversationCore;
use crate::dedup::DedupCache;
use crate::store::Store;
use crate::utils::RateLimiter;
use crate::webhook::WebhookReceiver;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub bus: Bus,
    pub dedup: Arc<DedupCache>,
    pub config: Arc<AppConfig>,
    pub webhook_receiver: Arc<WebhookReceiver>,
    pub webhook_rate_limiter: Arc<RateLimiter>,
    pub conversation: Arc<ConversationCore>,
}

impl AppState {
    pub fn new(
        store: Store,
        bus: Bus,
        dedup: Arc<DedupCache>,
        config: Arc<AppConfig>,
        conversation: Arc<ConversationCore>,
    ) -> Self {
        let webhook_receiver = Arc::new(WebhookReceiver::new(store.clone(), dedup.clone(), bus.clone()));
        let webhook_rate_limiter = Arc::new(RateLimiter::new(config.webhook.rate_limit_per_minute));
        Self {
            store,
            bus,
            dedup,
            config,
            webhook_receiver,
            webhook_rate_limiter,
            conversation,
        }
    }
}
