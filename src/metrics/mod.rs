// src/metrics/mod.rs
// Prometheus metrics for the sync engine, using the same `RequestTimer` shape
// as the rest of the ambient stack.

use axum::{http::StatusCode, response::IntoResponse};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::info;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics exporter
pub fn init_metrics() {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    PROMETHEUS_HANDLE
        .set(handle)
        .expect("Prometheus handle already initialized");

    info!("Prometheus metrics initialized");
}

/// GET /metrics - Prometheus metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Webhook received, tagged by module and outcome.
pub fn record_webhook(module: &str, outcome: &str) {
    counter!("sync_webhooks_total", "module" => module.to_string(), "outcome" => outcome.to_string())
        .increment(1);
}

/// Dedup hit on the WebhookReceiver hot path.
pub fn record_dedup_hit(module: &str) {
    counter!("sync_dedup_hits_total", "module" => module.to_string()).increment(1);
}

/// SyncConflict detected by the shared upsert path.
pub fn record_conflict(module: &str, kind: &str) {
    counter!("sync_conflicts_total", "module" => module.to_string(), "kind" => kind.to_string())
        .increment(1);
}

pub fn record_delivery_sent() {
    counter!("delivery_sent_total").increment(1);
}

pub fn record_delivery_failed() {
    counter!("delivery_failed_total").increment(1);
}

/// Bus queue depth, sampled periodically by the maintenance loop.
pub fn set_bus_queue_depth(depth: i64) {
    gauge!("bus_queue_depth").set(depth as f64);
}

/// Bus messages dead-lettered.
pub fn record_dead_letter(module: &str) {
    counter!("bus_dead_letters_total", "module" => module.to_string()).increment(1);
}

/// Poller sweep completed for a module, with the count of records applied.
pub fn record_poll_sweep(module: &str, applied: u64) {
    counter!("sync_poll_sweeps_total", "module" => module.to_string()).increment(1);
    counter!("sync_poll_records_applied_total", "module" => module.to_string()).increment(applied);
}

/// Conversation turn classified, tagged by resulting state-machine
/// transition.
pub fn record_conversation_transition(transition: &str) {
    counter!("conversation_transitions_total", "transition" => transition.to_string()).increment(1);
}

/// Helper for timing webhook/artifact-build operations.
pub struct RequestTimer {
    start: Instant,
    name: String,
}

impl RequestTimer {
    pub fn new(name: &str) -> Self {
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        histogram!("sync_operation_duration_seconds", "operation" => self.name.clone()).record(duration);
    }
}
