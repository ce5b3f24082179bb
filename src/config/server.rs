// src/config/server.rs
// Server, database, and logging configuration

use serde::{Deserialize, Serialize};

use super::helpers::{env_or, env_or_parsed, require_env};

/// HTTP server configuration (webhook receiver + admin/metrics surfaces)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub admin_api_key: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            host: env_or("SYNC_HOST", "0.0.0.0"),
            port: env_or_parsed("SYNC_PORT", 8080),
            admin_api_key: env_or("SYNC_ADMIN_API_KEY", "dev-admin-key"),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        Self {
            url: env_or("DATABASE_URL", "sqlite://sync_engine.db?mode=rwc"),
            max_connections: env_or_parsed("SYNC_SQLITE_MAX_CONNECTIONS", 10),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub trace_sql: bool,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self {
            level: env_or("SYNC_LOG_LEVEL", "info"),
            trace_sql: env_or_parsed("SYNC_TRACE_SQL", false),
        }
    }
}

/// Shared-secret used to authenticate inbound vendor webhooks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub shared_secret: String,
    /// Caps inbound webhook throughput so a vendor retry storm can't starve
    /// the worker pool.
    pub rate_limit_per_minute: u32,
}

impl WebhookConfig {
    pub fn from_env() -> Self {
        Self {
            shared_secret: require_env("SYNC_WEBHOOK_SECRET"),
            rate_limit_per_minute: env_or_parsed("SYNC_WEBHOOK_RATE_LIMIT_PER_MINUTE", 600),
        }
    }
}
