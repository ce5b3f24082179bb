// src/store/clarification.rs
// ClarificationSession rows. Expiry is time-based and
// computed on read (`is_expired`), not a background flip, so a session can
// never be read as "active" past its deadline even if the reaper hasn't run
// yet.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::AmbiguityKind;
use crate::error::StoreError;
use crate::utils::time::{from_rfc3339, now_millis, to_rfc3339};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Resolved,
    Cancelled,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Open => "open",
            SessionState::Resolved => "resolved",
            SessionState::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(SessionState::Open),
            "resolved" => Some(SessionState::Resolved),
            "cancelled" => Some(SessionState::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClarificationSession {
    pub id: String,
    pub user_id: String,
    pub original_query: String,
    pub ambiguity_kind: AmbiguityKind,
    pub options: Vec<String>,
    pub partial_intent: Option<Value>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_text: Option<String>,
}

impl ClarificationSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

fn row_to_session(row: sqlx::sqlite::SqliteRow) -> Result<ClarificationSession, StoreError> {
    let ambiguity_kind: String = row.get("ambiguity_kind");
    let state: String = row.get("state");
    let options: String = row.get("options");
    let partial_intent: Option<String> = row.get("partial_intent");

    Ok(ClarificationSession {
        id: row.get("id"),
        user_id: row.get("user_id"),
        original_query: row.get("original_query"),
        ambiguity_kind: AmbiguityKind::from_str(&ambiguity_kind)
            .ok_or_else(|| StoreError::Invalid(format!("unknown ambiguity_kind: {ambiguity_kind}")))?,
        options: serde_json::from_str(&options)?,
        partial_intent: partial_intent.map(|s| serde_json::from_str(&s)).transpose()?,
        state: SessionState::from_str(&state)
            .ok_or_else(|| StoreError::Invalid(format!("unknown session state: {state}")))?,
        created_at: from_rfc3339(&row.get::<String, _>("created_at_ts"))
            .ok_or_else(|| StoreError::Invalid("unparseable created_at_ts".into()))?,
        expires_at: from_rfc3339(&row.get::<String, _>("expires_at_ts"))
            .ok_or_else(|| StoreError::Invalid("unparseable expires_at_ts".into()))?,
        resolved_at: row
            .get::<Option<String>, _>("resolved_at_ts")
            .and_then(|s| from_rfc3339(&s)),
        resolution_text: row.get("resolution_text"),
    })
}

pub struct ClarificationStore {
    pool: SqlitePool,
}

impl ClarificationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: &str,
        original_query: &str,
        ambiguity_kind: AmbiguityKind,
        options: &[String],
        partial_intent: Option<&Value>,
        ttl_seconds: i64,
    ) -> Result<ClarificationSession, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now + chrono::Duration::seconds(ttl_seconds);
        let options_str = serde_json::to_string(options)?;
        let partial_intent_str = partial_intent.map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO clarification_sessions (
                id, user_id, original_query, ambiguity_kind, options, partial_intent,
                state, created_at_ts, expires_at_ts, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, 'open', ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(original_query)
        .bind(ambiguity_kind.as_str())
        .bind(&options_str)
        .bind(&partial_intent_str)
        .bind(to_rfc3339(&now))
        .bind(to_rfc3339(&expires_at))
        .bind(now_millis())
        .bind(now_millis())
        .execute(&self.pool)
        .await?;

        Ok(ClarificationSession {
            id,
            user_id: user_id.to_string(),
            original_query: original_query.to_string(),
            ambiguity_kind,
            options: options.to_vec(),
            partial_intent: partial_intent.cloned(),
            state: SessionState::Open,
            created_at: now,
            expires_at,
            resolved_at: None,
            resolution_text: None,
        })
    }

    pub async fn get(&self, id: &str) -> Result<Option<ClarificationSession>, StoreError> {
        let row = sqlx::query("SELECT * FROM clarification_sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_session).transpose()
    }

    /// Most recent open session for a user, if any (the clarifying-state
    /// machine only ever has one in-flight session per user).
    pub async fn latest_open_for_user(
        &self,
        user_id: &str,
    ) -> Result<Option<ClarificationSession>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM clarification_sessions WHERE user_id = ? AND state = 'open' \
             ORDER BY created_at_ts DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_session).transpose()
    }

    pub async fn resolve(
        &self,
        id: &str,
        resolution_text: &str,
    ) -> Result<Option<ClarificationSession>, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE clarification_sessions SET state = 'resolved', resolved_at_ts = ?, \
             resolution_text = ?, updated_at = ? WHERE id = ? AND state = 'open'",
        )
        .bind(to_rfc3339(&now))
        .bind(resolution_text)
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    pub async fn cancel(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE clarification_sessions SET state = 'cancelled', updated_at = ? WHERE id = ? AND state = 'open'",
        )
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reap expired-and-unresolved sessions after the 24h grace window.
    pub async fn reap_expired(&self, grace_hours: i64) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::hours(grace_hours);
        let result = sqlx::query(
            "DELETE FROM clarification_sessions WHERE state = 'open' AND expires_at_ts < ?",
        )
        .bind(to_rfc3339(&cutoff))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
