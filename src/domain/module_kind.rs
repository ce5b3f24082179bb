// src/domain/module_kind.rs
// The four mirrored CRM modules

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the vendor's logical record types. Unknown modules are rejected
/// at the webhook boundary with a 400.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ModuleKind {
    Leads,
    Deals,
    Contacts,
    Accounts,
}

impl ModuleKind {
    pub const ALL: [ModuleKind; 4] = [
        ModuleKind::Leads,
        ModuleKind::Deals,
        ModuleKind::Contacts,
        ModuleKind::Accounts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::Leads => "Leads",
            ModuleKind::Deals => "Deals",
            ModuleKind::Contacts => "Contacts",
            ModuleKind::Accounts => "Accounts",
        }
    }

    /// Table name backing this module's MirroredRecord rows.
    pub fn table_name(&self) -> &'static str {
        match self {
            ModuleKind::Leads => "mirrored_leads",
            ModuleKind::Deals => "mirrored_deals",
            ModuleKind::Contacts => "mirrored_contacts",
            ModuleKind::Accounts => "mirrored_accounts",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown module: {0}")]
pub struct UnknownModule(pub String);

impl FromStr for ModuleKind {
    type Err = UnknownModule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "leads" => Ok(ModuleKind::Leads),
            "deals" => Ok(ModuleKind::Deals),
            "contacts" => Ok(ModuleKind::Contacts),
            "accounts" => Ok(ModuleKind::Accounts),
            _ => Err(UnknownModule(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_module() {
        for module in ModuleKind::ALL {
            let parsed: ModuleKind = module.as_str().parse().unwrap();
            assert_eq!(parsed, module);
        }
    }

    #[test]
    fn rejects_unknown_module() {
        assert!("Widgets".parse::<ModuleKind>().is_err());
    }

    #[test]
    fn is_case_insensitive() {
        assert_eq!("leads".parse::<ModuleKind>().unwrap(), ModuleKind::Leads);
        assert_eq!("LEADS".parse::<ModuleKind>().unwrap(), ModuleKind::Leads);
    }
}
