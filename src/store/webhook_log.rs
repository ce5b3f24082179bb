// src/store/webhook_log.rs
// WebhookEvent audit rows. Uniqueness on
// (module, external_id, fingerprint) is the database-enforced half of
// dedup: a clean INSERT failure on that constraint is itself a dedup hit.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{EventKind, ModuleKind, ProcessingState};
use crate::error::StoreError;
use crate::utils::time::{from_rfc3339, now_millis, to_rfc3339};

#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    pub module: ModuleKind,
    pub external_id: String,
    pub event_kind: EventKind,
    pub fingerprint: String,
    pub raw_payload: Value,
    pub wrapper_metadata: Option<Value>,
    pub receive_time: DateTime<Utc>,
    pub process_time: Option<DateTime<Utc>>,
    pub state: ProcessingState,
    pub retry_count: i64,
    pub last_error: Option<String>,
}

fn row_to_event(row: sqlx::sqlite::SqliteRow) -> Result<WebhookEvent, StoreError> {
    let module: String = row.get("module");
    let event_kind: String = row.get("event_kind");
    let state: String = row.get("state");
    let raw_payload: String = row.get("raw_payload");
    let wrapper_metadata: Option<String> = row.get("wrapper_metadata");

    Ok(WebhookEvent {
        id: row.get("id"),
        module: module
            .parse()
            .map_err(|_| StoreError::Invalid(format!("unknown module in webhook_log: {module}")))?,
        external_id: row.get("external_id"),
        event_kind: EventKind::from_str(&event_kind)
            .ok_or_else(|| StoreError::Invalid(format!("unknown event_kind: {event_kind}")))?,
        fingerprint: row.get("fingerprint"),
        raw_payload: serde_json::from_str(&raw_payload)?,
        wrapper_metadata: wrapper_metadata
            .map(|s| serde_json::from_str(&s))
            .transpose()?,
        receive_time: from_rfc3339(&row.get::<String, _>("receive_time"))
            .ok_or_else(|| StoreError::Invalid("unparseable receive_time".into()))?,
        process_time: row
            .get::<Option<String>, _>("process_time")
            .and_then(|s| from_rfc3339(&s)),
        state: ProcessingState::from_str(&state)
            .ok_or_else(|| StoreError::Invalid(format!("unknown state: {state}")))?,
        retry_count: row.get("retry_count"),
        last_error: row.get("last_error"),
    })
}

pub struct WebhookLogStore {
    pool: SqlitePool,
}

/// Result of attempting to insert an event row.
pub enum InsertOutcome {
    Inserted(WebhookEvent),
    /// Unique-constraint violation on (module, external_id, fingerprint).
    DedupHit,
}

impl WebhookLogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a pending WebhookEvent. A unique
    /// constraint violation on the triple is treated as a dedup hit rather
    /// than propagated as an error.
    pub async fn insert_pending(
        &self,
        module: ModuleKind,
        external_id: &str,
        event_kind: EventKind,
        fingerprint: &str,
        raw_payload: &Value,
        wrapper_metadata: Option<&Value>,
    ) -> Result<InsertOutcome, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let raw_payload_str = serde_json::to_string(raw_payload)?;
        let wrapper_str = wrapper_metadata.map(serde_json::to_string).transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO webhook_log (
                id, module, external_id, event_kind, fingerprint, raw_payload,
                wrapper_metadata, receive_time, state, retry_count, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(module.as_str())
        .bind(external_id)
        .bind(event_kind.as_str())
        .bind(fingerprint)
        .bind(&raw_payload_str)
        .bind(&wrapper_str)
        .bind(to_rfc3339(&now))
        .bind(now_millis())
        .bind(now_millis())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted(WebhookEvent {
                id,
                module,
                external_id: external_id.to_string(),
                event_kind,
                fingerprint: fingerprint.to_string(),
                raw_payload: raw_payload.clone(),
                wrapper_metadata: wrapper_metadata.cloned(),
                receive_time: now,
                process_time: None,
                state: ProcessingState::Pending,
                retry_count: 0,
                last_error: None,
            })),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Ok(InsertOutcome::DedupHit)
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<WebhookEvent>, StoreError> {
        let row = sqlx::query("SELECT * FROM webhook_log WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_event).transpose()
    }

    /// Atomically move `pending -> processing`. Zero rows affected means the
    /// event already advanced past pending (dedup-after-delivery) or was
    /// claimed by another worker.
    pub async fn try_claim(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE webhook_log SET state = 'processing', process_time = ?, updated_at = ? \
             WHERE id = ? AND state = 'pending'",
        )
        .bind(to_rfc3339(&Utc::now()))
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_success(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE webhook_log SET state = 'success', updated_at = ? WHERE id = ?")
            .bind(now_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_conflict(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE webhook_log SET state = 'conflict', updated_at = ? WHERE id = ?")
            .bind(now_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE webhook_log SET state = 'failed', last_error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(error)
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Revert `processing -> pending` for a nack/retry, incrementing
    /// retry_count.
    pub async fn requeue_for_retry(&self, id: &str, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE webhook_log SET state = 'pending', retry_count = retry_count + 1, \
             last_error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(error)
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Garbage-collect success rows older than the retention window.
    pub async fn gc_old_success(&self, retention_days: i64) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let result = sqlx::query("DELETE FROM webhook_log WHERE state = 'success' AND receive_time < ?")
            .bind(to_rfc3339(&cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Pending rows left behind by a failed enqueue.
    pub async fn list_stale_pending(&self, older_than_seconds: i64) -> Result<Vec<WebhookEvent>, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(older_than_seconds);
        let rows = sqlx::query("SELECT * FROM webhook_log WHERE state = 'pending' AND receive_time < ?")
            .bind(to_rfc3339(&cutoff))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_event).collect()
    }

    /// Reset rows stuck in `processing` (worker crashed between `try_claim`
    /// and `mark_success`/`mark_failed`/`mark_conflict`) back to `pending` so
    /// the bus can redeliver them. Selects on `state = 'processing'`, not
    /// `pending` — a row only qualifies once it has sat untouched past
    /// `older_than_seconds`.
    pub async fn reset_stuck_processing(&self, older_than_seconds: i64) -> Result<u64, StoreError> {
        let cutoff = now_millis() - older_than_seconds * 1000;
        let result = sqlx::query(
            "UPDATE webhook_log SET state = 'pending', updated_at = ? \
             WHERE state = 'processing' AND updated_at < ?",
        )
        .bind(now_millis())
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_store() -> (SqlitePool, WebhookLogStore) {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::store::schema::init_schema(&pool).await.unwrap();
        let store = WebhookLogStore::new(pool.clone());
        (pool, store)
    }

    #[tokio::test]
    async fn reset_stuck_processing_only_touches_aged_processing_rows() {
        let (pool, store) = test_store().await;
        let InsertOutcome::Inserted(stuck) = store
            .insert_pending(ModuleKind::Leads, "1", EventKind::Create, "fp-1", &json!({}), None)
            .await
            .unwrap()
        else {
            panic!("expected insert");
        };
        let InsertOutcome::Inserted(fresh) = store
            .insert_pending(ModuleKind::Leads, "2", EventKind::Create, "fp-2", &json!({}), None)
            .await
            .unwrap()
        else {
            panic!("expected insert");
        };
        assert!(store.try_claim(&stuck.id).await.unwrap());
        assert!(store.try_claim(&fresh.id).await.unwrap());

        // Backdate the stuck row's updated_at so it looks like it has been
        // sitting in `processing` past the reset window; leave the fresh one
        // alone.
        sqlx::query("UPDATE webhook_log SET updated_at = ? WHERE id = ?")
            .bind(now_millis() - 1_000_000)
            .bind(&stuck.id)
            .execute(&pool)
            .await
            .unwrap();

        let reset = store.reset_stuck_processing(60).await.unwrap();
        assert_eq!(reset, 1);

        let stuck_after = store.get(&stuck.id).await.unwrap().unwrap();
        assert_eq!(stuck_after.state, ProcessingState::Pending);
        let fresh_after = store.get(&fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh_after.state, ProcessingState::Processing);
    }
}
