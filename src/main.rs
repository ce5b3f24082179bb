// src/main.rs
// Process entry point: wires Store, Bus, WebhookReceiver, SyncWorkerPool,
// Poller, Scheduler/ArtifactBuilder/Dispatcher, and ConversationCore behind
// one axum server, then runs a maintenance loop alongside it.

use std::sync::Arc;

use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crm_sync_engine::artifact;
use crm_sync_engine::bus::Bus;
use crm_sync_engine::config::CONFIG;
use crm_sync_engine::conversation::{ConversationCore, IntentClassifier, KeywordIntentClassifier};
use crm_sync_engine::dedup::DedupCache;
use crm_sync_engine::dispatcher::{Dispatcher, LoggingTransport};
use crm_sync_engine::http::{create_router, AppState};
use crm_sync_engine::poller::Poller;
use crm_sync_engine::scheduler::Scheduler;
use crm_sync_engine::store::Store;
use crm_sync_engine::sync::SyncWorkerPool;
use crm_sync_engine::vendor::StubVendorClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let level = CONFIG.logging.level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("starting crm sync engine");
    crm_sync_engine::metrics::init_metrics();

    let store = Store::connect(&CONFIG.database).await?;
    store.roles.bootstrap(&CONFIG.roles.bootstrap).await?;
    info!("store connected and schema initialized");

    let dedup = Arc::new(DedupCache::new(CONFIG.dedup.ttl_seconds));
    let bus = Bus::new(store.pool.clone(), CONFIG.bus.clone());

    let classifier: Arc<dyn IntentClassifier> = Arc::new(KeywordIntentClassifier);
    let conversation = Arc::new(ConversationCore::new(
        store.clone(),
        dedup.clone(),
        classifier,
        CONFIG.conversation.clone(),
    ));

    let app_state = AppState::new(
        store.clone(),
        bus.clone(),
        dedup.clone(),
        Arc::new(CONFIG.clone()),
        conversation,
    );

    // SyncWorker pool: consumes the Bus, applies upserts, records conflicts.
    let worker_pool = Arc::new(SyncWorkerPool::new(store.clone(), bus.clone(), CONFIG.bus.clone()));
    worker_pool.spawn();
    info!(workers = CONFIG.bus.worker_pool_size, "sync worker pool started");

    // Reconciliation poller: one loop per module, sharing the sync core.
    let vendor = Arc::new(StubVendorClient);
    let poller = Arc::new(Poller::new(store.clone(), vendor, CONFIG.poller.clone()));
    poller.spawn_all();
    info!("reconciliation poller started");

    // Scheduler: claims due subscriptions, builds and dispatches artifacts.
    let builder = Arc::new(
        artifact::Builder::new(
            store.clone(),
            CONFIG.artifact.lookup_tables_path.clone(),
            CONFIG.roles.privileged_roles.clone(),
        )
        .await,
    );
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        Arc::new(LoggingTransport),
        CONFIG.scheduler.max_dispatch_retries,
    ));
    let scheduler = Arc::new(Scheduler::new(store.clone(), builder, dispatcher, CONFIG.scheduler.clone()));
    scheduler.spawn();
    info!("scheduler started");

    spawn_maintenance_loop(store.clone(), dedup.clone(), bus.clone());

    let app = create_router(app_state);
    let listener = tokio::net::TcpListener::bind(CONFIG.bind_address()).await?;
    info!(address = %CONFIG.bind_address(), "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodic housekeeping: DedupCache sweep, webhook_log GC, stuck-processing
/// reap, conversation memory cold-storage reap, and expired-clarification
/// reap. Runs on its own loop, independent of the Poller/Scheduler cadence.
fn spawn_maintenance_loop(store: Store, dedup: Arc<DedupCache>, bus: Bus) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            CONFIG.dedup.sweep_interval_seconds,
        ));
        loop {
            interval.tick().await;

            let swept = dedup.sweep();
            if swept > 0 {
                info!(swept, "dedup cache sweep");
            }

            if let Err(e) = store.webhook_log.gc_old_success(30).await {
                warn!(error = %e, "webhook_log gc failed");
            }

            match crm_sync_engine::sync::reap_stuck_processing(&store, CONFIG.bus.stuck_processing_reset_seconds).await {
                Ok(reset) if reset > 0 => info!(reset, "reset stuck-processing webhook_log rows"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "stuck-processing reap failed"),
            }

            if let Err(e) = store.conversation.reap_older_than(CONFIG.conversation.memory_retention_days).await {
                warn!(error = %e, "conversation memory reap failed");
            }

            if let Err(e) = store.clarifications.reap_expired(CONFIG.conversation.clarification_reap_hours).await {
                warn!(error = %e, "clarification session reap failed");
            }

            match bus.queue_depth().await {
                Ok(depth) => crm_sync_engine::metrics::set_bus_queue_depth(depth),
                Err(e) => warn!(error = %e, "queue depth sample failed"),
            }
        }
    });
}
