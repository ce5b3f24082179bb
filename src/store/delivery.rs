// src/store/delivery.rs
// Delivery rows: state machine scheduled -> in_progress -> sent|failed, with
// the (subscription, scheduled_anchor) idempotency invariant enforced by a
// unique index.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::StoreError;
use crate::utils::time::{from_rfc3339, now_millis, to_rfc3339};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryState {
    Scheduled,
    InProgress,
    Sent,
    Failed,
}

impl DeliveryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryState::Scheduled => "scheduled",
            DeliveryState::InProgress => "in_progress",
            DeliveryState::Sent => "sent",
            DeliveryState::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(DeliveryState::Scheduled),
            "in_progress" => Some(DeliveryState::InProgress),
            "sent" => Some(DeliveryState::Sent),
            "failed" => Some(DeliveryState::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: String,
    pub subscription_id: String,
    pub scheduled_anchor: DateTime<Utc>,
    pub parameters_snapshot: Value,
    pub state: DeliveryState,
    pub item_count: i64,
    pub dispatcher_message_id: Option<String>,
    pub error: Option<String>,
    pub artifact_body: Option<String>,
    pub attempt_count: i64,
}

fn row_to_delivery(row: sqlx::sqlite::SqliteRow) -> Result<Delivery, StoreError> {
    let state: String = row.get("state");
    let parameters_snapshot: String = row.get("parameters_snapshot");
    Ok(Delivery {
        id: row.get("id"),
        subscription_id: row.get("subscription_id"),
        scheduled_anchor: from_rfc3339(&row.get::<String, _>("scheduled_anchor"))
            .ok_or_else(|| StoreError::Invalid("unparseable scheduled_anchor".into()))?,
        parameters_snapshot: serde_json::from_str(&parameters_snapshot)?,
        state: DeliveryState::from_str(&state)
            .ok_or_else(|| StoreError::Invalid(format!("unknown delivery state: {state}")))?,
        item_count: row.get("item_count"),
        dispatcher_message_id: row.get("dispatcher_message_id"),
        error: row.get("error"),
        artifact_body: row.get("artifact_body"),
        attempt_count: row.get("attempt_count"),
    })
}

pub struct DeliveryStore {
    pool: SqlitePool,
}

impl DeliveryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the scheduled row, or return the existing one if a Delivery
    /// already exists for this (subscription, scheduled_anchor) pair — the
    /// idempotency invariant, enforced by the unique index and honored here
    /// rather than surfaced as a constraint-violation error.
    pub async fn get_or_create_scheduled(
        &self,
        subscription_id: &str,
        scheduled_anchor: DateTime<Utc>,
        parameters_snapshot: &Value,
    ) -> Result<Delivery, StoreError> {
        if let Some(existing) = self
            .find_by_anchor(subscription_id, scheduled_anchor)
            .await?
        {
            return Ok(existing);
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let params_str = serde_json::to_string(parameters_snapshot)?;

        let result = sqlx::query(
            r#"
            INSERT INTO deliveries (
                id, subscription_id, scheduled_anchor, parameters_snapshot, state,
                scheduled_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, 'scheduled', ?, ?, ?)
            ON CONFLICT (subscription_id, scheduled_anchor) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(subscription_id)
        .bind(to_rfc3339(&scheduled_anchor))
        .bind(&params_str)
        .bind(to_rfc3339(&now))
        .bind(now_millis())
        .bind(now_millis())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Lost the race to a concurrent claim; return the winner's row.
            return self
                .find_by_anchor(subscription_id, scheduled_anchor)
                .await?
                .ok_or_else(|| StoreError::NotFound("delivery vanished after conflict".into()));
        }

        Ok(Delivery {
            id,
            subscription_id: subscription_id.to_string(),
            scheduled_anchor,
            parameters_snapshot: parameters_snapshot.clone(),
            state: DeliveryState::Scheduled,
            item_count: 0,
            dispatcher_message_id: None,
            error: None,
            artifact_body: None,
            attempt_count: 0,
        })
    }

    pub async fn find_by_anchor(
        &self,
        subscription_id: &str,
        scheduled_anchor: DateTime<Utc>,
    ) -> Result<Option<Delivery>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM deliveries WHERE subscription_id = ? AND scheduled_anchor = ?",
        )
        .bind(subscription_id)
        .bind(to_rfc3339(&scheduled_anchor))
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_delivery).transpose()
    }

    pub async fn get(&self, id: &str) -> Result<Option<Delivery>, StoreError> {
        let row = sqlx::query("SELECT * FROM deliveries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_delivery).transpose()
    }

    pub async fn mark_in_progress(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE deliveries SET state = 'in_progress', started_at = ?, \
             attempt_count = attempt_count + 1, updated_at = ? WHERE id = ?",
        )
        .bind(to_rfc3339(&Utc::now()))
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_sent(
        &self,
        id: &str,
        item_count: i64,
        dispatcher_message_id: &str,
        artifact_body: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE deliveries SET state = 'sent', item_count = ?, dispatcher_message_id = ?, \
             artifact_body = ?, completed_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(item_count)
        .bind(dispatcher_message_id)
        .bind(artifact_body)
        .bind(to_rfc3339(&Utc::now()))
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE deliveries SET state = 'failed', error = ?, completed_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(error)
        .bind(to_rfc3339(&Utc::now()))
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_by_subscription(
        &self,
        subscription_id: &str,
        limit: u32,
    ) -> Result<Vec<Delivery>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM deliveries WHERE subscription_id = ? ORDER BY scheduled_anchor DESC LIMIT ?",
        )
        .bind(subscription_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_delivery).collect()
    }
}
