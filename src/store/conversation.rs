// src/store/conversation.rs
// ConversationMemory: per-user chronological {user|assistant} turns with
// classified intent. ConversationCore has exclusive write
// access; reads for the hot window go through DedupCache, cold reads come
// here.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::StoreError;
use crate::utils::time::{from_rfc3339, now_millis, to_rfc3339};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub id: String,
    pub user_id: String,
    pub role: TurnRole,
    pub content: String,
    pub intent_kind: Option<String>,
    pub confidence: Option<f32>,
    pub occurred_at: DateTime<Utc>,
}

fn row_to_turn(row: sqlx::sqlite::SqliteRow) -> Result<ConversationTurn, StoreError> {
    let role: String = row.get("role");
    Ok(ConversationTurn {
        id: row.get("id"),
        user_id: row.get("user_id"),
        role: match role.as_str() {
            "user" => TurnRole::User,
            "assistant" => TurnRole::Assistant,
            other => return Err(StoreError::Invalid(format!("unknown turn role: {other}"))),
        },
        content: row.get("content"),
        intent_kind: row.get("intent_kind"),
        confidence: row.get::<Option<f64>, _>("confidence").map(|c| c as f32),
        occurred_at: from_rfc3339(&row.get::<String, _>("occurred_at"))
            .ok_or_else(|| StoreError::Invalid("unparseable occurred_at".into()))?,
    })
}

pub struct ConversationStore {
    pool: SqlitePool,
}

impl ConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(
        &self,
        user_id: &str,
        role: TurnRole,
        content: &str,
        intent_kind: Option<&str>,
        confidence: Option<f32>,
    ) -> Result<ConversationTurn, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO conversation_memory (
                id, user_id, role, content, intent_kind, confidence, occurred_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(content)
        .bind(intent_kind)
        .bind(confidence.map(|c| c as f64))
        .bind(to_rfc3339(&now))
        .bind(now_millis())
        .execute(&self.pool)
        .await?;

        Ok(ConversationTurn {
            id,
            user_id: user_id.to_string(),
            role,
            content: content.to_string(),
            intent_kind: intent_kind.map(str::to_string),
            confidence,
            occurred_at: now,
        })
    }

    /// Most recent `limit` turns, oldest-first, for building classifier
    /// history context.
    pub async fn recent(&self, user_id: &str, limit: u32) -> Result<Vec<ConversationTurn>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM conversation_memory WHERE user_id = ? ORDER BY occurred_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        let mut turns: Vec<ConversationTurn> = rows.into_iter().map(row_to_turn).collect::<Result<_, _>>()?;
        turns.reverse();
        Ok(turns)
    }

    /// Reap turns older than the cold-storage retention window.
    pub async fn reap_older_than(&self, retention_days: i64) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let result = sqlx::query("DELETE FROM conversation_memory WHERE occurred_at < ?")
            .bind(to_rfc3339(&cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
