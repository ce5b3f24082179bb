// src/domain/conflict.rs
// SyncConflict kind and resolution strategy enums

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    StaleUpdate,
    ConcurrentWrite,
    MissingRecord,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::StaleUpdate => "stale_update",
            ConflictKind::ConcurrentWrite => "concurrent_write",
            ConflictKind::MissingRecord => "missing_record",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "stale_update" => Some(ConflictKind::StaleUpdate),
            "concurrent_write" => Some(ConflictKind::ConcurrentWrite),
            "missing_record" => Some(ConflictKind::MissingRecord),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    LastWriteWins,
    ManualReview,
    Discard,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::LastWriteWins => "last_write_wins",
            ResolutionStrategy::ManualReview => "manual_review",
            ResolutionStrategy::Discard => "discard",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "last_write_wins" => Some(ResolutionStrategy::LastWriteWins),
            "manual_review" => Some(ResolutionStrategy::ManualReview),
            "discard" => Some(ResolutionStrategy::Discard),
            _ => None,
        }
    }
}
