// src/config/mod.rs
// Central configuration for the CRM sync engine

pub mod artifact;
pub mod bus;
pub mod conversation;
pub mod dedup;
pub mod helpers;
pub mod poller;
pub mod roles;
pub mod scheduler;
pub mod server;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

lazy_static! {
    pub static ref CONFIG: AppConfig = AppConfig::from_env();
}

/// Process-wide configuration, loaded once at startup and passed around by
/// explicit dependency rather than ambient mutable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: server::ServerConfig,
    pub database: server::DatabaseConfig,
    pub logging: server::LoggingConfig,
    pub webhook: server::WebhookConfig,
    pub dedup: dedup::DedupConfig,
    pub bus: bus::BusConfig,
    pub poller: poller::PollerConfig,
    pub scheduler: scheduler::SchedulerConfig,
    pub conversation: conversation::ConversationConfig,
    pub roles: roles::RolesConfig,
    pub artifact: artifact::ArtifactConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            server: server::ServerConfig::from_env(),
            database: server::DatabaseConfig::from_env(),
            logging: server::LoggingConfig::from_env(),
            webhook: server::WebhookConfig::from_env(),
            dedup: dedup::DedupConfig::from_env(),
            bus: bus::BusConfig::from_env(),
            poller: poller::PollerConfig::from_env(),
            scheduler: scheduler::SchedulerConfig::from_env(),
            conversation: conversation::ConversationConfig::from_env(),
            roles: roles::RolesConfig::from_env(),
            artifact: artifact::ArtifactConfig::from_env(),
        }
    }

    pub fn bind_address(&self) -> String {
        self.server.bind_address()
    }
}
