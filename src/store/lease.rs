// src/store/lease.rs
// Single-leader lease for Scheduler/Poller loops: the nearest SQLite-
// compatible analogue of a Postgres advisory lock (documented as an Open
// Question resolution in DESIGN.md).

use sqlx::SqlitePool;

use crate::error::StoreError;

pub struct LeaseStore {
    pool: SqlitePool,
}

impl LeaseStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Attempt to acquire or renew `name`'s lease for `holder_id`. Succeeds
    /// if no lease row exists, the existing lease expired, or `holder_id`
    /// already holds it (renewal). Returns whether this call holds the
    /// lease afterward.
    pub async fn acquire_or_renew(
        &self,
        name: &str,
        holder_id: &str,
        lease_duration_seconds: i64,
    ) -> Result<bool, StoreError> {
        let now = chrono::Utc::now().timestamp();
        let expires_at = now + lease_duration_seconds;

        sqlx::query(
            r#"
            INSERT INTO scheduler_lease (name, holder_id, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT (name) DO UPDATE SET
                holder_id = excluded.holder_id,
                expires_at = excluded.expires_at
            WHERE scheduler_lease.expires_at < ? OR scheduler_lease.holder_id = ?
            "#,
        )
        .bind(name)
        .bind(holder_id)
        .bind(expires_at)
        .bind(now)
        .bind(holder_id)
        .execute(&self.pool)
        .await?;

        let row: Option<(String,)> =
            sqlx::query_as("SELECT holder_id FROM scheduler_lease WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(holder,)| holder == holder_id).unwrap_or(false))
    }

    pub async fn release(&self, name: &str, holder_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM scheduler_lease WHERE name = ? AND holder_id = ?")
            .bind(name)
            .bind(holder_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::store::schema::init_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn second_holder_cannot_acquire_live_lease() {
        let pool = test_pool().await;
        let store = LeaseStore::new(pool);

        assert!(store.acquire_or_renew("scheduler", "a", 60).await.unwrap());
        assert!(!store.acquire_or_renew("scheduler", "b", 60).await.unwrap());
    }

    #[tokio::test]
    async fn expired_lease_can_be_reacquired() {
        let pool = test_pool().await;
        let store = LeaseStore::new(pool);

        assert!(store.acquire_or_renew("scheduler", "a", -1).await.unwrap());
        assert!(store.acquire_or_renew("scheduler", "b", 60).await.unwrap());
    }
}
