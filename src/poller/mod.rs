// src/poller/mod.rs
// Reconciliation poller: one tokio-spawned loop per module, each a
// `tokio::time::interval` ticker, sharing SyncWorker's
// upsert path via `sync::core::apply_incoming_record` so webhook and poll
// paths cannot drift.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::poller::PollerConfig;
use crate::domain::ModuleKind;
use crate::store::Store;
use crate::sync::core::{apply_incoming_record, IncomingRecord};
use crate::sync::payload;
use crate::vendor::VendorClient;

pub struct Poller {
    store: Store,
    vendor: Arc<dyn VendorClient>,
    config: PollerConfig,
}

impl Poller {
    pub fn new(store: Store, vendor: Arc<dyn VendorClient>, config: PollerConfig) -> Self {
        Self { store, vendor, config }
    }

    /// Spawn one loop per module.
    pub fn spawn_all(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        ModuleKind::ALL
            .iter()
            .map(|&module| {
                let poller = self.clone();
                tokio::spawn(async move { poller.run_loop(module).await })
            })
            .collect()
    }

    async fn run_loop(&self, module: ModuleKind) {
        info!(%module, "poller loop started");
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_minutes * 60));
        loop {
            interval.tick().await;
            if let Err(e) = self.sweep(module).await {
                warn!(%module, error = %e, "poll sweep failed");
                let _ = self.store.sync_metadata.set_error(module, &e.to_string()).await;
            }
        }
    }

    /// One sweep: read the last cursor, page through the vendor, upsert each
    /// record through the shared core, advance the cursor only on success.
    async fn sweep(&self, module: ModuleKind) -> Result<(), crate::error::CoreError> {
        let cursor = self.current_cursor(module).await?;
        let mut applied = 0u64;
        let mut max_seen = cursor;

        let records = self
            .vendor
            .fetch_modified_since(module, cursor, self.config.page_size)
            .await?;

        for record in &records {
            let modified_time = match payload::extract_modified_time(&record.payload) {
                Ok(t) => t,
                Err(e) => {
                    warn!(%module, external_id = %record.external_id, error = %e, "skipping unparseable poll record");
                    continue;
                }
            };
            let owner_email = payload::extract_owner_email(&record.payload);
            let owner_name = payload::extract_owner_name(&record.payload);
            let created_time = payload::extract_created_time(&record.payload);

            let incoming = IncomingRecord {
                module,
                external_id: &record.external_id,
                event_kind: record.event_kind,
                owner_email: owner_email.as_deref(),
                owner_display_name: owner_name.as_deref(),
                created_time,
                modified_time,
                payload: &record.payload,
            };

            apply_incoming_record(&self.store, &incoming).await?;
            applied += 1;
            if modified_time > max_seen {
                max_seen = modified_time;
            }
        }

        self.store.sync_metadata.update_last_sync(module, Utc::now()).await?;
        if max_seen > cursor {
            self.store.sync_metadata.update_next_sweep(module, max_seen).await?;
        }
        crate::metrics::record_poll_sweep(module.as_str(), applied);
        Ok(())
    }

    async fn current_cursor(&self, module: ModuleKind) -> Result<DateTime<Utc>, crate::error::CoreError> {
        let metadata = self
            .store
            .sync_metadata
            .get(module)
            .await?
            .ok_or_else(|| crate::error::CoreError::Internal(format!("no sync_metadata row for {module}")))?;
        Ok(metadata.next_sweep_time.unwrap_or_else(|| DateTime::<Utc>::MIN_UTC))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventKind;
    use crate::vendor::VendorRecord;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    struct FixedVendor {
        records: Mutex<Vec<VendorRecord>>,
    }

    #[async_trait]
    impl VendorClient for FixedVendor {
        async fn fetch_modified_since(
            &self,
            _module: ModuleKind,
            _cursor: DateTime<Utc>,
            _page_size: u32,
        ) -> Result<Vec<VendorRecord>, crate::error::SyncError> {
            Ok(self.records.lock().clone())
        }
    }

    #[tokio::test]
    async fn sweep_applies_records_and_advances_cursor() {
        let store = Store::in_memory().await;
        let vendor = Arc::new(FixedVendor {
            records: Mutex::new(vec![VendorRecord {
                external_id: "900".to_string(),
                event_kind: EventKind::Update,
                payload: json!({
                    "Modified_Time": "2025-10-20T12:00:00Z",
                    "Deal_Name": "From poll",
                }),
            }]),
        });
        let poller = Poller::new(store.clone(), vendor, PollerConfig { interval_minutes: 15, page_size: 200 });

        poller.sweep(ModuleKind::Deals).await.unwrap();

        let record = store.mirrored.get(ModuleKind::Deals, "900").await.unwrap().unwrap();
        assert_eq!(record.sync_version, 1);

        let metadata = store.sync_metadata.get(ModuleKind::Deals).await.unwrap().unwrap();
        assert!(metadata.next_sweep_time.is_some());
        assert!(metadata.last_sync_time.is_some());
    }

    #[tokio::test]
    async fn sweep_with_no_records_still_updates_last_sync() {
        let store = Store::in_memory().await;
        let vendor = Arc::new(FixedVendor { records: Mutex::new(Vec::new()) });
        let poller = Poller::new(store.clone(), vendor, PollerConfig { interval_minutes: 15, page_size: 200 });

        poller.sweep(ModuleKind::Leads).await.unwrap();

        let metadata = store.sync_metadata.get(ModuleKind::Leads).await.unwrap().unwrap();
        assert!(metadata.last_sync_time.is_some());
        assert!(metadata.next_sweep_time.is_none());
    }
}
