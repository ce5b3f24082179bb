// src/store/schema.rs
// Inline schema initialization, applied once at Store construction. No
// separate migrations directory: every sub-store owns its own
// `CREATE TABLE IF NOT EXISTS`, an inline `init_schema` idiom rather than a
// migration runner.

use sqlx::SqlitePool;

use crate::domain::ModuleKind;
use crate::error::StoreError;

pub async fn init_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    for module in ModuleKind::ALL {
        create_mirrored_table(pool, module.table_name()).await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS webhook_log (
            id TEXT PRIMARY KEY,
            module TEXT NOT NULL,
            external_id TEXT NOT NULL,
            event_kind TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            raw_payload TEXT NOT NULL,
            wrapper_metadata TEXT,
            receive_time TEXT NOT NULL,
            process_time TEXT,
            state TEXT NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE (module, external_id, fingerprint)
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_webhook_log_state ON webhook_log (state)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bus_messages (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL,
            module TEXT NOT NULL,
            external_id TEXT NOT NULL,
            enqueued_at TEXT NOT NULL,
            visible_at INTEGER NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL,
            state TEXT NOT NULL,
            correlation_id TEXT,
            application_properties TEXT,
            last_error TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_bus_messages_claim ON bus_messages (state, visible_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_conflicts (
            id TEXT PRIMARY KEY,
            module TEXT NOT NULL,
            external_id TEXT NOT NULL,
            conflict_kind TEXT NOT NULL,
            incoming_modified_time TEXT,
            existing_modified_time TEXT,
            previous_state TEXT,
            incoming_payload TEXT NOT NULL,
            resolution_strategy TEXT,
            detection_time TEXT NOT NULL,
            resolution_time TEXT,
            resolver_identity TEXT,
            notes TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_metadata (
            module TEXT PRIMARY KEY,
            last_sync_time TEXT,
            next_sweep_time TEXT,
            sync_status TEXT NOT NULL DEFAULT 'idle',
            webhooks_received_24h INTEGER NOT NULL DEFAULT 0,
            conflicts_detected_24h INTEGER NOT NULL DEFAULT 0,
            dedup_hits_24h INTEGER NOT NULL DEFAULT 0,
            counters_window_start INTEGER NOT NULL,
            last_error TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            recipient_address TEXT NOT NULL,
            audience_tag TEXT NOT NULL,
            cadence TEXT NOT NULL,
            max_items INTEGER NOT NULL,
            timezone TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            last_delivery_time TEXT,
            next_delivery_time TEXT,
            last_attempt_time TEXT,
            filter_set TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_due ON subscriptions (active, next_delivery_time)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deliveries (
            id TEXT PRIMARY KEY,
            subscription_id TEXT NOT NULL,
            scheduled_anchor TEXT NOT NULL,
            parameters_snapshot TEXT NOT NULL,
            state TEXT NOT NULL,
            item_count INTEGER NOT NULL DEFAULT 0,
            dispatcher_message_id TEXT,
            error TEXT,
            artifact_body TEXT,
            scheduled_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            attempt_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE (subscription_id, scheduled_anchor)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversation_memory (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            intent_kind TEXT,
            confidence REAL,
            occurred_at TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_conversation_memory_user ON conversation_memory (user_id, occurred_at)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS clarification_sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            original_query TEXT NOT NULL,
            ambiguity_kind TEXT NOT NULL,
            options TEXT NOT NULL,
            partial_intent TEXT,
            state TEXT NOT NULL,
            created_at_ts TEXT NOT NULL,
            expires_at_ts TEXT NOT NULL,
            resolved_at_ts TEXT,
            resolution_text TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_clarification_user ON clarification_sessions (user_id, state)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_roles (
            email TEXT PRIMARY KEY,
            role TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scheduler_lease (
            name TEXT PRIMARY KEY,
            holder_id TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_mirrored_table(pool: &SqlitePool, table: &str) -> Result<(), StoreError> {
    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            external_id TEXT PRIMARY KEY,
            owner_email TEXT,
            owner_display_name TEXT,
            created_time TEXT,
            modified_time TEXT NOT NULL,
            last_synced_time TEXT NOT NULL,
            payload TEXT NOT NULL,
            sync_version INTEGER NOT NULL DEFAULT 1,
            tombstoned INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#
    );
    sqlx::query(&sql).execute(pool).await?;

    let idx_sql = format!(
        "CREATE INDEX IF NOT EXISTS idx_{table}_modified ON {table} (modified_time)"
    );
    sqlx::query(&idx_sql).execute(pool).await?;

    Ok(())
}
