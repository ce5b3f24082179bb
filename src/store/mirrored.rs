// src/store/mirrored.rs
// MirroredRecord tables: one per module. SyncWorker and Poller
// share this store exclusively for writes; ArtifactBuilder
// and ConversationCore read snapshot-isolated.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::domain::ModuleKind;
use crate::error::StoreError;
use crate::utils::time::{from_rfc3339, now_millis, to_rfc3339};

#[derive(Debug, Clone)]
pub struct MirroredRecord {
    pub external_id: String,
    pub owner_email: Option<String>,
    pub owner_display_name: Option<String>,
    pub created_time: Option<DateTime<Utc>>,
    pub modified_time: DateTime<Utc>,
    pub last_synced_time: DateTime<Utc>,
    pub payload: Value,
    pub sync_version: i64,
    pub tombstoned: bool,
}

fn row_to_record(row: sqlx::sqlite::SqliteRow) -> Result<MirroredRecord, StoreError> {
    let payload_raw: String = row.get("payload");
    Ok(MirroredRecord {
        external_id: row.get("external_id"),
        owner_email: row.get("owner_email"),
        owner_display_name: row.get("owner_display_name"),
        created_time: row
            .get::<Option<String>, _>("created_time")
            .and_then(|s| from_rfc3339(&s)),
        modified_time: from_rfc3339(&row.get::<String, _>("modified_time"))
            .ok_or_else(|| StoreError::Invalid("unparseable modified_time".into()))?,
        last_synced_time: from_rfc3339(&row.get::<String, _>("last_synced_time"))
            .ok_or_else(|| StoreError::Invalid("unparseable last_synced_time".into()))?,
        payload: serde_json::from_str(&payload_raw)?,
        sync_version: row.get("sync_version"),
        tombstoned: row.get::<i64, _>("tombstoned") != 0,
    })
}

pub struct MirroredStore {
    pool: SqlitePool,
}

/// Outcome of an upsert attempt, used by the shared apply-incoming-record
/// path (`sync::core`) to decide what conflict bookkeeping, if any, is owed.
pub enum UpsertOutcome {
    Inserted(MirroredRecord),
    Updated(MirroredRecord),
    /// Optimistic `sync_version` CAS hit zero rows: another writer won the
    /// race between our read and our write.
    VersionConflict,
    /// `incoming.modified <= existing.modified`: not applied.
    Stale { existing: MirroredRecord },
}

impl MirroredStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(
        &self,
        module: ModuleKind,
        external_id: &str,
    ) -> Result<Option<MirroredRecord>, StoreError> {
        let sql = format!(
            "SELECT * FROM {} WHERE external_id = ?",
            module.table_name()
        );
        let row = sqlx::query(&sql)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_record).transpose()
    }

    /// Insert a brand-new record with `sync_version = 1`.
    pub async fn insert(
        &self,
        module: ModuleKind,
        external_id: &str,
        owner_email: Option<&str>,
        owner_display_name: Option<&str>,
        created_time: Option<DateTime<Utc>>,
        modified_time: DateTime<Utc>,
        payload: &Value,
    ) -> Result<MirroredRecord, StoreError> {
        let now = Utc::now();
        let payload_raw = serde_json::to_string(payload)?;
        let sql = format!(
            r#"
            INSERT INTO {} (
                external_id, owner_email, owner_display_name, created_time,
                modified_time, last_synced_time, payload, sync_version,
                tombstoned, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, 1, 0, ?, ?)
            "#,
            module.table_name()
        );
        sqlx::query(&sql)
            .bind(external_id)
            .bind(owner_email)
            .bind(owner_display_name)
            .bind(created_time.map(|t| to_rfc3339(&t)))
            .bind(to_rfc3339(&modified_time))
            .bind(to_rfc3339(&now))
            .bind(&payload_raw)
            .bind(now_millis())
            .bind(now_millis())
            .execute(&self.pool)
            .await?;

        Ok(MirroredRecord {
            external_id: external_id.to_string(),
            owner_email: owner_email.map(str::to_string),
            owner_display_name: owner_display_name.map(str::to_string),
            created_time,
            modified_time,
            last_synced_time: now,
            payload: payload.clone(),
            sync_version: 1,
            tombstoned: false,
        })
    }

    /// Optimistic compare-and-swap update: `WHERE sync_version = existing.sync_version`.
    /// Zero affected rows means another writer already
    /// advanced the version; caller classifies that as `concurrent_write`.
    pub async fn update_cas(
        &self,
        module: ModuleKind,
        external_id: &str,
        expected_version: i64,
        owner_email: Option<&str>,
        owner_display_name: Option<&str>,
        modified_time: DateTime<Utc>,
        payload: &Value,
    ) -> Result<UpsertOutcome, StoreError> {
        let now = Utc::now();
        let payload_raw = serde_json::to_string(payload)?;
        let sql = format!(
            r#"
            UPDATE {} SET
                owner_email = ?, owner_display_name = ?, modified_time = ?,
                last_synced_time = ?, payload = ?, sync_version = sync_version + 1,
                updated_at = ?
            WHERE external_id = ? AND sync_version = ?
            "#,
            module.table_name()
        );
        let result = sqlx::query(&sql)
            .bind(owner_email)
            .bind(owner_display_name)
            .bind(to_rfc3339(&modified_time))
            .bind(to_rfc3339(&now))
            .bind(&payload_raw)
            .bind(now_millis())
            .bind(external_id)
            .bind(expected_version)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(UpsertOutcome::VersionConflict);
        }

        match self.get(module, external_id).await? {
            Some(record) => Ok(UpsertOutcome::Updated(record)),
            None => Err(StoreError::NotFound(format!(
                "{} {} vanished after update",
                module, external_id
            ))),
        }
    }

    /// Mark a payload tombstone in place rather than physically delete.
    pub async fn tombstone(
        &self,
        module: ModuleKind,
        external_id: &str,
        modified_time: DateTime<Utc>,
    ) -> Result<Option<MirroredRecord>, StoreError> {
        let now = Utc::now();
        let sql = format!(
            r#"
            UPDATE {} SET tombstoned = 1, modified_time = ?, last_synced_time = ?,
                sync_version = sync_version + 1, updated_at = ?
            WHERE external_id = ?
            "#,
            module.table_name()
        );
        let result = sqlx::query(&sql)
            .bind(to_rfc3339(&modified_time))
            .bind(to_rfc3339(&now))
            .bind(now_millis())
            .bind(external_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(module, external_id).await
    }

    /// Cursor query for the reconciliation poller: records with
    /// `modified_time > cursor`, oldest first, page-bounded.
    pub async fn list_modified_after(
        &self,
        module: ModuleKind,
        cursor: DateTime<Utc>,
        page_size: u32,
    ) -> Result<Vec<MirroredRecord>, StoreError> {
        let sql = format!(
            "SELECT * FROM {} WHERE modified_time > ? ORDER BY modified_time ASC LIMIT ?",
            module.table_name()
        );
        let rows = sqlx::query(&sql)
            .bind(to_rfc3339(&cursor))
            .bind(page_size)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_record).collect()
    }

    /// Bounded-window query for ArtifactBuilder candidates.
    pub async fn list_recent(
        &self,
        module: ModuleKind,
        since: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<MirroredRecord>, StoreError> {
        let sql = format!(
            "SELECT * FROM {} WHERE modified_time >= ? AND tombstoned = 0 ORDER BY modified_time DESC LIMIT ?",
            module.table_name()
        );
        let rows = sqlx::query(&sql)
            .bind(to_rfc3339(&since))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::store::schema::init_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn insert_then_cas_update_increments_version() {
        let pool = test_pool().await;
        let store = MirroredStore::new(pool);
        let t0: DateTime<Utc> = "2025-10-20T12:00:00Z".parse().unwrap();
        let t1: DateTime<Utc> = "2025-10-20T12:05:00Z".parse().unwrap();

        let inserted = store
            .insert(
                ModuleKind::Deals,
                "900",
                Some("owner@firm.com"),
                Some("Owner Name"),
                None,
                t0,
                &json!({"Deal_Name": "Initial"}),
            )
            .await
            .unwrap();
        assert_eq!(inserted.sync_version, 1);

        let outcome = store
            .update_cas(
                ModuleKind::Deals,
                "900",
                1,
                Some("owner@firm.com"),
                Some("Owner Name"),
                t1,
                &json!({"Deal_Name": "Updated"}),
            )
            .await
            .unwrap();

        match outcome {
            UpsertOutcome::Updated(record) => {
                assert_eq!(record.sync_version, 2);
                assert_eq!(record.modified_time, t1);
            }
            _ => panic!("expected Updated outcome"),
        }
    }

    #[tokio::test]
    async fn cas_update_with_stale_version_is_conflict() {
        let pool = test_pool().await;
        let store = MirroredStore::new(pool);
        let t0: DateTime<Utc> = "2025-10-20T12:00:00Z".parse().unwrap();

        store
            .insert(ModuleKind::Deals, "900", None, None, None, t0, &json!({}))
            .await
            .unwrap();

        let outcome = store
            .update_cas(ModuleKind::Deals, "900", 99, None, None, t0, &json!({}))
            .await
            .unwrap();

        assert!(matches!(outcome, UpsertOutcome::VersionConflict));
    }

    #[tokio::test]
    async fn tombstone_does_not_physically_delete() {
        let pool = test_pool().await;
        let store = MirroredStore::new(pool);
        let t0: DateTime<Utc> = "2025-10-20T12:00:00Z".parse().unwrap();
        let t1: DateTime<Utc> = "2025-10-20T13:00:00Z".parse().unwrap();

        store
            .insert(ModuleKind::Leads, "1", None, None, None, t0, &json!({}))
            .await
            .unwrap();
        let tombstoned = store
            .tombstone(ModuleKind::Leads, "1", t1)
            .await
            .unwrap()
            .unwrap();

        assert!(tombstoned.tombstoned);
        assert_eq!(tombstoned.sync_version, 2);
        let still_there = store.get(ModuleKind::Leads, "1").await.unwrap();
        assert!(still_there.is_some());
    }
}
