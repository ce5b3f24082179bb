// src/bus/mod.rs
// Durable FIFO queue with at-least-once delivery and a DLQ. Backed by a `bus_messages` table rather than an
// in-memory channel: WebhookReceiver and SyncWorker run in separate process
// pools, so the queue must outlive either pool and survive a
// restart. Messages are small pointers — `{event_id, module, external_id}` —
// full payloads stay in `webhook_log` to keep queue rows bounded.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::bus::BusConfig;
use crate::domain::ModuleKind;
use crate::error::StoreError;
use crate::utils::time::{now_millis, to_rfc3339};

/// The queue wire format: a small pointer, not the full payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: String,
    pub event_id: String,
    pub module: ModuleKind,
    pub external_id: String,
    pub enqueued_at: chrono::DateTime<Utc>,
    pub attempts: i64,
    pub correlation_id: Option<String>,
    pub application_properties: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DlqEntry {
    pub id: String,
    pub event_id: String,
    pub module: ModuleKind,
    pub external_id: String,
    pub correlation_id: Option<String>,
    pub application_properties: Option<Value>,
    pub last_error: Option<String>,
    pub attempts: i64,
}

fn row_to_message(row: sqlx::sqlite::SqliteRow) -> Result<QueueMessage, StoreError> {
    let module: String = row.get("module");
    let enqueued_at: String = row.get("enqueued_at");
    let application_properties: Option<String> = row.get("application_properties");
    Ok(QueueMessage {
        id: row.get("id"),
        event_id: row.get("event_id"),
        module: module
            .parse()
            .map_err(|_| StoreError::Invalid(format!("unknown module in bus_messages: {module}")))?,
        external_id: row.get("external_id"),
        enqueued_at: crate::utils::time::from_rfc3339(&enqueued_at)
            .ok_or_else(|| StoreError::Invalid("unparseable enqueued_at".into()))?,
        attempts: row.get("attempts"),
        correlation_id: row.get("correlation_id"),
        application_properties: application_properties
            .map(|s| serde_json::from_str(&s))
            .transpose()?,
    })
}

fn row_to_dlq(row: sqlx::sqlite::SqliteRow) -> Result<DlqEntry, StoreError> {
    let module: String = row.get("module");
    let application_properties: Option<String> = row.get("application_properties");
    Ok(DlqEntry {
        id: row.get("id"),
        event_id: row.get("event_id"),
        module: module
            .parse()
            .map_err(|_| StoreError::Invalid(format!("unknown module in bus_messages: {module}")))?,
        external_id: row.get("external_id"),
        correlation_id: row.get("correlation_id"),
        application_properties: application_properties
            .map(|s| serde_json::from_str(&s))
            .transpose()?,
        last_error: row.get("last_error"),
        attempts: row.get("attempts"),
    })
}

#[derive(Clone)]
pub struct Bus {
    pool: SqlitePool,
    config: BusConfig,
}

impl Bus {
    pub fn new(pool: SqlitePool, config: BusConfig) -> Self {
        Self { pool, config }
    }

    /// Enqueue a pointer message for a just-persisted WebhookEvent.
    pub async fn enqueue(
        &self,
        event_id: &str,
        module: ModuleKind,
        external_id: &str,
        correlation_id: Option<&str>,
    ) -> Result<QueueMessage, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO bus_messages (
                id, event_id, module, external_id, enqueued_at, visible_at,
                attempts, max_attempts, state, correlation_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, 0, ?, 'queued', ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(event_id)
        .bind(module.as_str())
        .bind(external_id)
        .bind(to_rfc3339(&now))
        .bind(now.timestamp_millis())
        .bind(self.config.max_delivery_attempts as i64)
        .bind(correlation_id)
        .bind(now_millis())
        .bind(now_millis())
        .execute(&self.pool)
        .await?;

        Ok(QueueMessage {
            id,
            event_id: event_id.to_string(),
            module,
            external_id: external_id.to_string(),
            enqueued_at: now,
            attempts: 0,
            correlation_id: correlation_id.map(str::to_string),
            application_properties: None,
        })
    }

    /// Claim up to `batch_size` visible messages, moving them to
    /// `processing` with a lease until `visible_at`. Messages that exceeded
    /// their maximum lifetime are expired straight to the DLQ instead of
    /// being handed out.
    pub async fn claim_batch(&self, batch_size: u32) -> Result<Vec<QueueMessage>, StoreError> {
        self.expire_overaged().await?;

        let now = Utc::now();
        let lease_until = now.timestamp_millis() + (self.config.poll_interval_ms as i64 * 20).max(5_000);

        let rows = sqlx::query(
            r#"
            SELECT id FROM bus_messages
            WHERE state = 'queued' AND visible_at <= ?
            ORDER BY enqueued_at ASC
            LIMIT ?
            "#,
        )
        .bind(now.timestamp_millis())
        .bind(batch_size)
        .fetch_all(&self.pool)
        .await?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let result = sqlx::query(
                "UPDATE bus_messages SET state = 'processing', visible_at = ?, updated_at = ? \
                 WHERE id = ? AND state = 'queued'",
            )
            .bind(lease_until)
            .bind(now_millis())
            .bind(&id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                continue;
            }
            if let Some(msg_row) = sqlx::query("SELECT * FROM bus_messages WHERE id = ?")
                .bind(&id)
                .fetch_optional(&self.pool)
                .await?
            {
                claimed.push(row_to_message(msg_row)?);
            }
        }
        Ok(claimed)
    }

    async fn expire_overaged(&self) -> Result<(), StoreError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.config.max_message_lifetime_seconds);
        let rows = sqlx::query(
            "SELECT id FROM bus_messages WHERE state IN ('queued', 'processing') AND enqueued_at < ?",
        )
        .bind(to_rfc3339(&cutoff))
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            let id: String = row.get("id");
            self.dead_letter(&id, "exceeded maximum queue lifetime").await?;
        }
        Ok(())
    }

    pub async fn ack(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM bus_messages WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Nack a message for retriable failure: increments `attempts`, and
    /// either re-queues with a short visibility delay or dead-letters once
    /// `max_attempts` is exceeded.
    pub async fn nack_retry(&self, id: &str, error: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT attempts, max_attempts FROM bus_messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(false) };
        let attempts: i64 = row.get("attempts");
        let max_attempts: i64 = row.get("max_attempts");

        if attempts + 1 >= max_attempts {
            self.dead_letter(id, error).await?;
            return Ok(false);
        }

        let backoff_ms = 1_000i64.saturating_mul(1 << attempts.min(6));
        let visible_at = Utc::now().timestamp_millis() + backoff_ms;
        sqlx::query(
            "UPDATE bus_messages SET state = 'queued', attempts = attempts + 1, visible_at = ?, \
             last_error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(visible_at)
        .bind(error)
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(true)
    }

    pub async fn dead_letter(&self, id: &str, error: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE bus_messages SET state = 'dlq', last_error = ?, updated_at = ? WHERE id = ?")
            .bind(error)
            .bind(now_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_dlq(&self, limit: u32, offset: u32) -> Result<Vec<DlqEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM bus_messages WHERE state = 'dlq' ORDER BY updated_at DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_dlq).collect()
    }

    pub async fn purge_dlq(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM bus_messages WHERE id = ? AND state = 'dlq'")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Requeue a DLQ message onto the active queue, preserving body
    /// fingerprint (via `event_id`, which still points at the original
    /// `webhook_log` row), `correlation_id`, and application properties
    /// unchanged, and refreshing its system TTL by resetting `enqueued_at`.
    pub async fn replay_from_dlq(&self, id: &str) -> Result<Option<QueueMessage>, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE bus_messages SET state = 'queued', enqueued_at = ?, visible_at = ?, \
             attempts = 0, last_error = NULL, updated_at = ? WHERE id = ? AND state = 'dlq'",
        )
        .bind(to_rfc3339(&now))
        .bind(now.timestamp_millis())
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        let row = sqlx::query("SELECT * FROM bus_messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_message).transpose()
    }

    /// Approximate current queue depth.
    pub async fn queue_depth(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) as n FROM bus_messages WHERE state = 'queued'")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_bus() -> Bus {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::store::schema::init_schema(&pool).await.unwrap();
        Bus::new(pool, BusConfig {
            worker_pool_size: 2,
            max_delivery_attempts: 3,
            max_message_lifetime_seconds: 86_400,
            poll_interval_ms: 50,
            stuck_processing_reset_seconds: 600,
        })
    }

    #[tokio::test]
    async fn claim_then_ack_removes_message() {
        let bus = test_bus().await;
        bus.enqueue("evt-1", ModuleKind::Leads, "100", None).await.unwrap();

        let claimed = bus.claim_batch(10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        bus.ack(&claimed[0].id).await.unwrap();

        assert_eq!(bus.claim_batch(10).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn nack_exhausting_attempts_dead_letters() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::store::schema::init_schema(&pool).await.unwrap();
        let bus = Bus::new(pool, BusConfig {
            worker_pool_size: 2,
            max_delivery_attempts: 2,
            max_message_lifetime_seconds: 86_400,
            poll_interval_ms: 50,
            stuck_processing_reset_seconds: 600,
        });
        bus.enqueue("evt-1", ModuleKind::Deals, "900", Some("corr-1")).await.unwrap();
        let claimed = bus.claim_batch(10).await.unwrap();
        let id = claimed[0].id.clone();

        // max_delivery_attempts = 2: the first nack retries, the second dead-letters.
        assert!(bus.nack_retry(&id, "transient").await.unwrap());
        assert!(!bus.nack_retry(&id, "transient").await.unwrap());

        let dlq = bus.list_dlq(10, 0).await.unwrap();
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq[0].correlation_id.as_deref(), Some("corr-1"));
    }

    #[tokio::test]
    async fn replay_preserves_correlation_id() {
        let bus = test_bus().await;
        bus.enqueue("evt-1", ModuleKind::Contacts, "42", Some("corr-xyz")).await.unwrap();
        let claimed = bus.claim_batch(10).await.unwrap();
        let id = claimed[0].id.clone();
        bus.nack_retry(&id, "e1").await.unwrap();
        let claimed2 = bus.claim_batch(10).await;
        // still in backoff window, may be empty; directly dead-letter for the test
        bus.dead_letter(&id, "final").await.unwrap();

        let replayed = bus.replay_from_dlq(&id).await.unwrap().unwrap();
        assert_eq!(replayed.correlation_id.as_deref(), Some("corr-xyz"));
        assert_eq!(replayed.attempts, 0);
        let _ = claimed2;
    }
}
