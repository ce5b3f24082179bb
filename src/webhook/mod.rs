// src/webhook/mod.rs
// WebhookReceiver core: canonicalization, fingerprinting, and
// the dedup-probe/persist/enqueue algorithm, independent of the HTTP
// transport it's mounted behind (the `http` module owns the axum wiring).

use serde_json::Value;

use crate::bus::Bus;
use crate::dedup::DedupCache;
use crate::domain::{EventKind, ModuleKind};
use crate::error::WebhookError;
use crate::store::webhook_log::InsertOutcome;
use crate::store::Store;
use crate::utils::hash::sha256_hash;

/// Recursively sort object keys so the same logical payload always produces
/// the same byte sequence before hashing.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = serde_json::Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Hex SHA-256 of the canonicalized payload.
pub fn fingerprint(payload: &Value) -> String {
    let canonical = canonicalize(payload);
    sha256_hash(&canonical.to_string())
}

/// Outcome of running the receiver algorithm, used by the HTTP adapter to
/// pick a status code and metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Accepted,
    Dedup,
}

/// Canonicalizes, dedups, persists, and enqueues an already-authenticated request.
pub struct WebhookReceiver {
    store: Store,
    dedup: std::sync::Arc<DedupCache>,
    bus: Bus,
}

impl WebhookReceiver {
    pub fn new(store: Store, dedup: std::sync::Arc<DedupCache>, bus: Bus) -> Self {
        Self { store, dedup, bus }
    }

    pub async fn receive(
        &self,
        module: ModuleKind,
        external_id: &str,
        event_kind: EventKind,
        payload: &Value,
    ) -> Result<ReceiveOutcome, WebhookError> {
        let fp = fingerprint(payload);
        let cache_key = DedupCache::webhook_key(module, external_id, &fp);

        if self.dedup.contains(&cache_key) {
            self.store
                .sync_metadata
                .record_dedup_hit(module)
                .await
                .map_err(WebhookError::Store)?;
            crate::metrics::record_dedup_hit(module.as_str());
            crate::metrics::record_webhook(module.as_str(), "dedup");
            return Ok(ReceiveOutcome::Dedup);
        }

        let insert = self
            .store
            .webhook_log
            .insert_pending(module, external_id, event_kind, &fp, payload, None)
            .await
            .map_err(WebhookError::Store)?;

        let event = match insert {
            InsertOutcome::Inserted(event) => event,
            InsertOutcome::DedupHit => {
                self.dedup.insert(&cache_key, "1");
                self.store
                    .sync_metadata
                    .record_dedup_hit(module)
                    .await
                    .map_err(WebhookError::Store)?;
                crate::metrics::record_dedup_hit(module.as_str());
                crate::metrics::record_webhook(module.as_str(), "dedup");
                return Ok(ReceiveOutcome::Dedup);
            }
        };

        self.dedup.insert(&cache_key, "1");

        // A failed enqueue leaves the row pending for the reaper/poller to
        // retry; it must never roll back the audit row.
        if let Err(e) = self
            .bus
            .enqueue(&event.id, module, external_id, None)
            .await
        {
            tracing::warn!(error = %e, event_id = %event.id, "bus enqueue failed, leaving webhook_log row pending");
        }

        crate::metrics::record_webhook(module.as_str(), "accepted");
        Ok(ReceiveOutcome::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::bus::BusConfig;
    use serde_json::json;

    fn test_bus_config() -> BusConfig {
        BusConfig {
            worker_pool_size: 2,
            max_delivery_attempts: 5,
            max_message_lifetime_seconds: 86_400,
            poll_interval_ms: 250,
            stuck_processing_reset_seconds: 600,
        }
    }

    #[test]
    fn canonicalize_sorts_keys_at_every_depth() {
        let value = json!({"b": 1, "a": {"z": 1, "y": 2}});
        let canonical = canonicalize(&value);
        assert_eq!(canonical.to_string(), r#"{"a":{"y":2,"z":1},"b":1}"#);
    }

    #[test]
    fn fingerprint_is_stable_across_key_order() {
        let p1 = json!({"a": 1, "b": 2});
        let p2 = json!({"b": 2, "a": 1});
        assert_eq!(fingerprint(&p1), fingerprint(&p2));
    }

    #[tokio::test]
    async fn replaying_identical_payload_is_a_dedup_hit() {
        let store = Store::in_memory().await;
        let bus = Bus::new(store.pool.clone(), test_bus_config());
        let dedup = std::sync::Arc::new(DedupCache::new(600));
        let receiver = WebhookReceiver::new(store.clone(), dedup, bus);

        let payload = json!({"Modified_Time": "2025-10-20T12:00:00Z"});
        let first = receiver
            .receive(ModuleKind::Leads, "100200300", EventKind::Create, &payload)
            .await
            .unwrap();
        let second = receiver
            .receive(ModuleKind::Leads, "100200300", EventKind::Create, &payload)
            .await
            .unwrap();

        assert_eq!(first, ReceiveOutcome::Accepted);
        assert_eq!(second, ReceiveOutcome::Dedup);

        let metadata = store.sync_metadata.get(ModuleKind::Leads).await.unwrap().unwrap();
        assert_eq!(metadata.dedup_hits_24h, 1);
    }

    #[tokio::test]
    async fn distinct_payloads_for_same_record_both_accept() {
        let store = Store::in_memory().await;
        let bus = Bus::new(store.pool.clone(), test_bus_config());
        let dedup = std::sync::Arc::new(DedupCache::new(600));
        let receiver = WebhookReceiver::new(store.clone(), dedup, bus);

        let p1 = json!({"Modified_Time": "2025-10-20T12:00:00Z"});
        let p2 = json!({"Modified_Time": "2025-10-20T12:05:00Z"});
        let first = receiver.receive(ModuleKind::Deals, "900", EventKind::Update, &p1).await.unwrap();
        let second = receiver.receive(ModuleKind::Deals, "900", EventKind::Update, &p2).await.unwrap();

        assert_eq!(first, ReceiveOutcome::Accepted);
        assert_eq!(second, ReceiveOutcome::Accepted);
    }
}
