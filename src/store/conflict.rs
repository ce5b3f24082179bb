// src/store/conflict.rs
// SyncConflict audit rows. Durable record of any contention
// detected by the shared upsert path.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{ConflictKind, ModuleKind, ResolutionStrategy};
use crate::error::StoreError;
use crate::utils::time::{from_rfc3339, now_millis, to_rfc3339};

#[derive(Debug, Clone, Serialize)]
pub struct SyncConflict {
    pub id: String,
    pub module: ModuleKind,
    pub external_id: String,
    pub conflict_kind: ConflictKind,
    pub incoming_modified_time: Option<DateTime<Utc>>,
    pub existing_modified_time: Option<DateTime<Utc>>,
    pub previous_state: Option<Value>,
    pub incoming_payload: Value,
    pub resolution_strategy: Option<ResolutionStrategy>,
    pub detection_time: DateTime<Utc>,
    pub resolution_time: Option<DateTime<Utc>>,
    pub resolver_identity: Option<String>,
    pub notes: Option<String>,
}

fn row_to_conflict(row: sqlx::sqlite::SqliteRow) -> Result<SyncConflict, StoreError> {
    let module: String = row.get("module");
    let kind: String = row.get("conflict_kind");
    let incoming_payload: String = row.get("incoming_payload");
    let previous_state: Option<String> = row.get("previous_state");
    let resolution_strategy: Option<String> = row.get("resolution_strategy");

    Ok(SyncConflict {
        id: row.get("id"),
        module: module
            .parse()
            .map_err(|_| StoreError::Invalid(format!("unknown module in sync_conflicts: {module}")))?,
        external_id: row.get("external_id"),
        conflict_kind: ConflictKind::from_str(&kind)
            .ok_or_else(|| StoreError::Invalid(format!("unknown conflict_kind: {kind}")))?,
        incoming_modified_time: row
            .get::<Option<String>, _>("incoming_modified_time")
            .and_then(|s| from_rfc3339(&s)),
        existing_modified_time: row
            .get::<Option<String>, _>("existing_modified_time")
            .and_then(|s| from_rfc3339(&s)),
        previous_state: previous_state.map(|s| serde_json::from_str(&s)).transpose()?,
        incoming_payload: serde_json::from_str(&incoming_payload)?,
        resolution_strategy: resolution_strategy.and_then(|s| ResolutionStrategy::from_str(&s)),
        detection_time: from_rfc3339(&row.get::<String, _>("detection_time"))
            .ok_or_else(|| StoreError::Invalid("unparseable detection_time".into()))?,
        resolution_time: row
            .get::<Option<String>, _>("resolution_time")
            .and_then(|s| from_rfc3339(&s)),
        resolver_identity: row.get("resolver_identity"),
        notes: row.get("notes"),
    })
}

pub struct ConflictStore {
    pool: SqlitePool,
}

impl ConflictStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        module: ModuleKind,
        external_id: &str,
        conflict_kind: ConflictKind,
        incoming_modified_time: Option<DateTime<Utc>>,
        existing_modified_time: Option<DateTime<Utc>>,
        previous_state: Option<&Value>,
        incoming_payload: &Value,
    ) -> Result<SyncConflict, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let previous_state_str = previous_state.map(serde_json::to_string).transpose()?;
        let incoming_payload_str = serde_json::to_string(incoming_payload)?;

        sqlx::query(
            r#"
            INSERT INTO sync_conflicts (
                id, module, external_id, conflict_kind, incoming_modified_time,
                existing_modified_time, previous_state, incoming_payload,
                resolution_strategy, detection_time, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(module.as_str())
        .bind(external_id)
        .bind(conflict_kind.as_str())
        .bind(incoming_modified_time.map(|t| to_rfc3339(&t)))
        .bind(existing_modified_time.map(|t| to_rfc3339(&t)))
        .bind(&previous_state_str)
        .bind(&incoming_payload_str)
        .bind(to_rfc3339(&now))
        .bind(now_millis())
        .bind(now_millis())
        .execute(&self.pool)
        .await?;

        Ok(SyncConflict {
            id,
            module,
            external_id: external_id.to_string(),
            conflict_kind,
            incoming_modified_time,
            existing_modified_time,
            previous_state: previous_state.cloned(),
            incoming_payload: incoming_payload.clone(),
            resolution_strategy: None,
            detection_time: now,
            resolution_time: None,
            resolver_identity: None,
            notes: None,
        })
    }

    pub async fn get(&self, id: &str) -> Result<Option<SyncConflict>, StoreError> {
        let row = sqlx::query("SELECT * FROM sync_conflicts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_conflict).transpose()
    }

    /// Paged list, optionally scoped to a module and to unresolved rows only
    /// (`GET /admin/conflicts?module=X&unresolved=true`).
    pub async fn list(
        &self,
        module: Option<ModuleKind>,
        unresolved_only: bool,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<SyncConflict>, StoreError> {
        let mut sql = String::from("SELECT * FROM sync_conflicts WHERE 1=1");
        if module.is_some() {
            sql.push_str(" AND module = ?");
        }
        if unresolved_only {
            sql.push_str(" AND resolution_time IS NULL");
        }
        sql.push_str(" ORDER BY detection_time DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        if let Some(m) = module {
            query = query.bind(m.as_str());
        }
        query = query.bind(limit).bind(offset);

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_conflict).collect()
    }

    pub async fn resolve(
        &self,
        id: &str,
        strategy: ResolutionStrategy,
        resolver_identity: &str,
        notes: Option<&str>,
    ) -> Result<Option<SyncConflict>, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE sync_conflicts SET
                resolution_strategy = ?, resolution_time = ?, resolver_identity = ?,
                notes = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(strategy.as_str())
        .bind(to_rfc3339(&now))
        .bind(resolver_identity)
        .bind(notes)
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }
}
