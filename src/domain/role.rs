// src/domain/role.rs
// UserRole enum; lookups default to the most restrictive role when absent.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Most restrictive; the default when an email has no mapped role.
    Recruiter,
    Admin,
    Executive,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Recruiter => "recruiter",
            Role::Admin => "admin",
            Role::Executive => "executive",
        }
    }

    /// Parse a role string, defaulting to the most restrictive role for any
    /// value that isn't a recognized role rather than erroring — role
    /// lookups must always resolve to something bookable for filtering.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "executive" => Role::Executive,
            _ => Role::Recruiter,
        }
    }

    pub fn most_restrictive() -> Self {
        Role::Recruiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_role_string_defaults_to_most_restrictive() {
        assert_eq!(Role::parse("unknown"), Role::most_restrictive());
    }
}
