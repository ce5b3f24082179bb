// src/store/sync_metadata.rs
// SyncMetadata: one row per module, tracking cursor state and 24h rolling
// counters. Counters reset when their window rolls past 24h
// rather than via a separate cron, a "compute on read" lazy-expiry idiom.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};

use crate::domain::ModuleKind;
use crate::error::StoreError;
use crate::utils::time::{from_rfc3339, now_millis, to_rfc3339};

#[derive(Debug, Clone)]
pub struct SyncMetadata {
    pub module: ModuleKind,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub next_sweep_time: Option<DateTime<Utc>>,
    pub sync_status: String,
    pub webhooks_received_24h: i64,
    pub conflicts_detected_24h: i64,
    pub dedup_hits_24h: i64,
    pub last_error: Option<String>,
}

fn row_to_metadata(row: sqlx::sqlite::SqliteRow) -> Result<SyncMetadata, StoreError> {
    let module: String = row.get("module");
    Ok(SyncMetadata {
        module: module
            .parse()
            .map_err(|_| StoreError::Invalid(format!("unknown module in sync_metadata: {module}")))?,
        last_sync_time: row
            .get::<Option<String>, _>("last_sync_time")
            .and_then(|s| from_rfc3339(&s)),
        next_sweep_time: row
            .get::<Option<String>, _>("next_sweep_time")
            .and_then(|s| from_rfc3339(&s)),
        sync_status: row.get("sync_status"),
        webhooks_received_24h: row.get("webhooks_received_24h"),
        conflicts_detected_24h: row.get("conflicts_detected_24h"),
        dedup_hits_24h: row.get("dedup_hits_24h"),
        last_error: row.get("last_error"),
    })
}

pub struct SyncMetadataStore {
    pool: SqlitePool,
}

impl SyncMetadataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Ensure every module has a metadata row; safe to call repeatedly.
    pub async fn bootstrap(&self) -> Result<(), StoreError> {
        for module in ModuleKind::ALL {
            sqlx::query(
                r#"
                INSERT INTO sync_metadata (module, sync_status, counters_window_start, created_at, updated_at)
                VALUES (?, 'idle', ?, ?, ?)
                ON CONFLICT (module) DO NOTHING
                "#,
            )
            .bind(module.as_str())
            .bind(now_millis())
            .bind(now_millis())
            .bind(now_millis())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn get(&self, module: ModuleKind) -> Result<Option<SyncMetadata>, StoreError> {
        let row = sqlx::query("SELECT * FROM sync_metadata WHERE module = ?")
            .bind(module.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_metadata).transpose()
    }

    pub async fn list_all(&self) -> Result<Vec<SyncMetadata>, StoreError> {
        let rows = sqlx::query("SELECT * FROM sync_metadata ORDER BY module")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_metadata).collect()
    }

    /// Roll the 24h counter window if it has expired, then apply `delta` to
    /// the named counter column. `column` is always one of our own constants,
    /// never user input, so string interpolation here is safe.
    async fn bump_counter(&self, module: ModuleKind, column: &str) -> Result<(), StoreError> {
        self.maybe_roll_window(module).await?;
        let sql = format!(
            "UPDATE sync_metadata SET {column} = {column} + 1, updated_at = ? WHERE module = ?"
        );
        sqlx::query(&sql)
            .bind(now_millis())
            .bind(module.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn maybe_roll_window(&self, module: ModuleKind) -> Result<(), StoreError> {
        let cutoff = now_millis() - Duration::hours(24).num_milliseconds();
        sqlx::query(
            r#"
            UPDATE sync_metadata SET
                webhooks_received_24h = 0, conflicts_detected_24h = 0, dedup_hits_24h = 0,
                counters_window_start = ?
            WHERE module = ? AND counters_window_start < ?
            "#,
        )
        .bind(now_millis())
        .bind(module.as_str())
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_webhook_received(&self, module: ModuleKind) -> Result<(), StoreError> {
        self.bump_counter(module, "webhooks_received_24h").await
    }

    pub async fn record_conflict(&self, module: ModuleKind) -> Result<(), StoreError> {
        self.bump_counter(module, "conflicts_detected_24h").await
    }

    pub async fn record_dedup_hit(&self, module: ModuleKind) -> Result<(), StoreError> {
        self.bump_counter(module, "dedup_hits_24h").await
    }

    pub async fn update_last_sync(
        &self,
        module: ModuleKind,
        last_sync_time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE sync_metadata SET last_sync_time = ?, sync_status = 'ok', last_error = NULL, updated_at = ? WHERE module = ?",
        )
        .bind(to_rfc3339(&last_sync_time))
        .bind(now_millis())
        .bind(module.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_next_sweep(
        &self,
        module: ModuleKind,
        next_sweep_time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE sync_metadata SET next_sweep_time = ?, updated_at = ? WHERE module = ?")
            .bind(to_rfc3339(&next_sweep_time))
            .bind(now_millis())
            .bind(module.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_error(&self, module: ModuleKind, error: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE sync_metadata SET sync_status = 'error', last_error = ?, updated_at = ? WHERE module = ?")
            .bind(error)
            .bind(now_millis())
            .bind(module.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
