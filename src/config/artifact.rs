// src/config/artifact.rs
// ArtifactBuilder lookup-table configuration

use serde::{Deserialize, Serialize};

use super::helpers::env_or;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Path to the versioned YAML file holding employer equivalence classes,
    /// AUM bucket boundaries, and compensation/location normalization
    /// tables. Reloadable at runtime via `LookupTables::reload`.
    pub lookup_tables_path: String,
}

impl ArtifactConfig {
    pub fn from_env() -> Self {
        Self {
            lookup_tables_path: env_or("SYNC_ARTIFACT_LOOKUP_TABLES", "config/lookup_tables.yaml"),
        }
    }
}
