// src/store/mod.rs
// Relational store: one sub-store per entity family, all
// backed by a single shared `SqlitePool`. `Store` exclusively owns all
// persisted rows; individual sub-stores enforce per-entity write-access
// rules by virtue of which components hold a handle to which sub-store.

pub mod clarification;
pub mod conflict;
pub mod conversation;
pub mod delivery;
pub mod lease;
pub mod mirrored;
pub mod role_map;
pub mod schema;
pub mod subscription;
pub mod sync_metadata;
pub mod webhook_log;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::config::server::DatabaseConfig;
use crate::error::StoreError;

pub use clarification::ClarificationStore;
pub use conflict::ConflictStore;
pub use conversation::ConversationStore;
pub use delivery::DeliveryStore;
pub use lease::LeaseStore;
pub use mirrored::MirroredStore;
pub use role_map::RoleMapStore;
pub use subscription::SubscriptionStore;
pub use sync_metadata::SyncMetadataStore;
pub use webhook_log::WebhookLogStore;

/// Aggregate handle to every sub-store, cheaply `Clone`-able since each
/// sub-store only wraps a `SqlitePool` (itself an `Arc`-backed connection
/// pool). Threaded through `AppState` and every component, per the "global
/// tokens/credentials passed by explicit dependency" design note.
#[derive(Clone)]
pub struct Store {
    pub pool: SqlitePool,
    pub mirrored: MirroredStore,
    pub webhook_log: WebhookLogStore,
    pub conflicts: ConflictStore,
    pub sync_metadata: SyncMetadataStore,
    pub subscriptions: SubscriptionStore,
    pub deliveries: DeliveryStore,
    pub conversation: ConversationStore,
    pub clarifications: ClarificationStore,
    pub roles: RoleMapStore,
    pub lease: LeaseStore,
}

impl Store {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        schema::init_schema(&pool).await?;
        let store = Self::from_pool(pool);
        store.sync_metadata.bootstrap().await?;
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            mirrored: MirroredStore::new(pool.clone()),
            webhook_log: WebhookLogStore::new(pool.clone()),
            conflicts: ConflictStore::new(pool.clone()),
            sync_metadata: SyncMetadataStore::new(pool.clone()),
            subscriptions: SubscriptionStore::new(pool.clone()),
            deliveries: DeliveryStore::new(pool.clone()),
            conversation: ConversationStore::new(pool.clone()),
            clarifications: ClarificationStore::new(pool.clone()),
            roles: RoleMapStore::new(pool.clone()),
            lease: LeaseStore::new(pool.clone()),
            pool,
        }
    }

    #[cfg(test)]
    pub async fn in_memory() -> Self {
        let pool = SqlitePool::connect(":memory:").await.expect("in-memory pool");
        schema::init_schema(&pool).await.expect("schema init");
        let store = Self::from_pool(pool);
        store.sync_metadata.bootstrap().await.expect("bootstrap metadata");
        store
    }
}
