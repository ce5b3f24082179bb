// src/config/roles.rs
// Role-map bootstrap list and privileged-audience configuration

use serde::{Deserialize, Serialize};

use super::helpers::env_or;
use crate::domain::role::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolesConfig {
    /// `email=role` pairs, comma separated, e.g.
    /// `exec@firm.com=executive,recruiter@firm.com=recruiter`.
    pub bootstrap: Vec<(String, Role)>,
    /// Roles allowed to receive privileged-audience subscriptions.
    pub privileged_roles: Vec<Role>,
}

impl RolesConfig {
    pub fn from_env() -> Self {
        let raw = env_or("SYNC_ROLE_MAP_BOOTSTRAP", "");
        let bootstrap = raw
            .split(',')
            .filter_map(|pair| {
                let mut parts = pair.splitn(2, '=');
                let email = parts.next()?.trim();
                let role = parts.next()?.trim();
                if email.is_empty() || role.is_empty() {
                    return None;
                }
                Some((email.to_string(), Role::parse(role)))
            })
            .collect();

        Self {
            bootstrap,
            privileged_roles: vec![Role::Executive, Role::Admin],
        }
    }
}
