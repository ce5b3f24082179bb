// src/store/subscription.rs
// Subscription rows and the Scheduler's atomic due-claim.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::Cadence;
use crate::error::StoreError;
use crate::utils::time::{from_rfc3339, now_millis, to_rfc3339};

#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub recipient_address: String,
    pub audience_tag: String,
    pub cadence: Cadence,
    pub max_items: i64,
    pub timezone: String,
    pub active: bool,
    pub last_delivery_time: Option<DateTime<Utc>>,
    pub next_delivery_time: Option<DateTime<Utc>>,
    pub filter_set: Value,
}

fn row_to_subscription(row: sqlx::sqlite::SqliteRow) -> Result<Subscription, StoreError> {
    let cadence: String = row.get("cadence");
    let filter_set: String = row.get("filter_set");
    Ok(Subscription {
        id: row.get("id"),
        user_id: row.get("user_id"),
        recipient_address: row.get("recipient_address"),
        audience_tag: row.get("audience_tag"),
        cadence: Cadence::from_str(&cadence)
            .ok_or_else(|| StoreError::Invalid(format!("unknown cadence: {cadence}")))?,
        max_items: row.get("max_items"),
        timezone: row.get("timezone"),
        active: row.get::<i64, _>("active") != 0,
        last_delivery_time: row
            .get::<Option<String>, _>("last_delivery_time")
            .and_then(|s| from_rfc3339(&s)),
        next_delivery_time: row
            .get::<Option<String>, _>("next_delivery_time")
            .and_then(|s| from_rfc3339(&s)),
        filter_set: serde_json::from_str(&filter_set)?,
    })
}

pub struct SubscriptionStore {
    pool: SqlitePool,
}

impl SubscriptionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a subscription. `next_delivery_time` is the caller-computed
    /// cadence anchor when `active`, else `None`.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        user_id: &str,
        recipient_address: &str,
        audience_tag: &str,
        cadence: Cadence,
        max_items: i64,
        timezone: &str,
        active: bool,
        next_delivery_time: Option<DateTime<Utc>>,
        filter_set: &Value,
    ) -> Result<Subscription, StoreError> {
        let id = Uuid::new_v4().to_string();
        let filter_set_str = serde_json::to_string(filter_set)?;
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, recipient_address, audience_tag, cadence, max_items,
                timezone, active, next_delivery_time, filter_set, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(recipient_address)
        .bind(audience_tag)
        .bind(cadence.as_str())
        .bind(max_items)
        .bind(timezone)
        .bind(active as i64)
        .bind(next_delivery_time.map(|t| to_rfc3339(&t)))
        .bind(&filter_set_str)
        .bind(now_millis())
        .bind(now_millis())
        .execute(&self.pool)
        .await?;

        Ok(Subscription {
            id,
            user_id: user_id.to_string(),
            recipient_address: recipient_address.to_string(),
            audience_tag: audience_tag.to_string(),
            cadence,
            max_items,
            timezone: timezone.to_string(),
            active,
            last_delivery_time: None,
            next_delivery_time,
            filter_set: filter_set.clone(),
        })
    }

    pub async fn get(&self, id: &str) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query("SELECT * FROM subscriptions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_subscription).transpose()
    }

    /// Flip active/cadence and recompute `next_delivery_time`. Setting
    /// `active=false` nulls `next_delivery_time` per the invariant.
    pub async fn set_active_and_cadence(
        &self,
        id: &str,
        active: bool,
        cadence: Cadence,
        next_delivery_time: Option<DateTime<Utc>>,
    ) -> Result<Option<Subscription>, StoreError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET active = ?, cadence = ?, next_delivery_time = ?, updated_at = ? WHERE id = ?",
        )
        .bind(active as i64)
        .bind(cadence.as_str())
        .bind(if active { next_delivery_time.map(|t| to_rfc3339(&t)) } else { None })
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    /// List subscriptions due now: `active AND next_delivery <= now`.
    pub async fn list_due(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM subscriptions WHERE active = 1 AND next_delivery_time IS NOT NULL \
             AND next_delivery_time <= ? ORDER BY next_delivery_time ASC LIMIT ?",
        )
        .bind(to_rfc3339(&now))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_subscription).collect()
    }

    /// Atomically claim a due subscription: null out `next_delivery_time` so
    /// a concurrent scheduler tick can't double-claim it. Returns `true` if this call won the
    /// claim.
    pub async fn try_claim(&self, id: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "UPDATE subscriptions SET next_delivery_time = NULL, last_attempt_time = ?, updated_at = ? \
             WHERE id = ? AND next_delivery_time IS NOT NULL AND next_delivery_time <= ? \
             RETURNING id",
        )
        .bind(to_rfc3339(&now))
        .bind(now_millis())
        .bind(id)
        .bind(to_rfc3339(&now))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Recompute and persist `next_delivery_time` after a build-and-send job
    /// completes, also updating `last_delivery_time`
    /// when the delivery succeeded.
    pub async fn advance_next_delivery(
        &self,
        id: &str,
        next_delivery_time: DateTime<Utc>,
        delivered: bool,
    ) -> Result<(), StoreError> {
        if delivered {
            sqlx::query(
                "UPDATE subscriptions SET next_delivery_time = ?, last_delivery_time = ?, updated_at = ? WHERE id = ?",
            )
            .bind(to_rfc3339(&next_delivery_time))
            .bind(to_rfc3339(&Utc::now()))
            .bind(now_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query("UPDATE subscriptions SET next_delivery_time = ?, updated_at = ? WHERE id = ?")
                .bind(to_rfc3339(&next_delivery_time))
                .bind(now_millis())
                .bind(id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query("SELECT * FROM subscriptions WHERE user_id = ? ORDER BY created_at")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_subscription).collect()
    }
}
