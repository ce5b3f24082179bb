// src/store/role_map.rs
// UserRole map: email -> Role, bootstrapped from config at startup.
// Lookups default to the most restrictive role when absent rather than
// erroring.

use sqlx::{Row, SqlitePool};

use crate::domain::Role;
use crate::error::StoreError;
use crate::utils::time::now_millis;

pub struct RoleMapStore {
    pool: SqlitePool,
}

impl RoleMapStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Idempotent upsert of the config-supplied bootstrap list.
    pub async fn bootstrap(&self, entries: &[(String, Role)]) -> Result<(), StoreError> {
        for (email, role) in entries {
            sqlx::query(
                r#"
                INSERT INTO user_roles (email, role, created_at, updated_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (email) DO UPDATE SET role = excluded.role, updated_at = excluded.updated_at
                "#,
            )
            .bind(email)
            .bind(role.as_str())
            .bind(now_millis())
            .bind(now_millis())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Look up a role by email, defaulting to the most restrictive role when
    /// the email has no mapping.
    pub async fn lookup(&self, email: &str) -> Result<Role, StoreError> {
        let row = sqlx::query("SELECT role FROM user_roles WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Role::parse(&row.get::<String, _>("role")),
            None => Role::most_restrictive(),
        })
    }

    pub async fn set(&self, email: &str, role: Role) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_roles (email, role, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (email) DO UPDATE SET role = excluded.role, updated_at = excluded.updated_at
            "#,
        )
        .bind(email)
        .bind(role.as_str())
        .bind(now_millis())
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
