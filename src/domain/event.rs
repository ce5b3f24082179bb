// src/domain/event.rs
// WebhookEvent kind and processing state enums

use serde::{Deserialize, Serialize};

/// The vendor's event kind for a webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Create,
    Update,
    Delete,
    Edit,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
            EventKind::Edit => "edit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "create" => Some(EventKind::Create),
            "update" => Some(EventKind::Update),
            "delete" => Some(EventKind::Delete),
            "edit" => Some(EventKind::Edit),
            _ => None,
        }
    }

    /// Delete events tombstone in place rather than mutate the payload like
    /// the other kinds.
    pub fn is_delete(&self) -> bool {
        matches!(self, EventKind::Delete)
    }
}

/// Processing state of a WebhookEvent row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    Pending,
    Processing,
    Success,
    Failed,
    Conflict,
}

impl ProcessingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Pending => "pending",
            ProcessingState::Processing => "processing",
            ProcessingState::Success => "success",
            ProcessingState::Failed => "failed",
            ProcessingState::Conflict => "conflict",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProcessingState::Pending),
            "processing" => Some(ProcessingState::Processing),
            "success" => Some(ProcessingState::Success),
            "failed" => Some(ProcessingState::Failed),
            "conflict" => Some(ProcessingState::Conflict),
            _ => None,
        }
    }

    /// Whether this state represents a terminal, already-resolved event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingState::Success | ProcessingState::Conflict | ProcessingState::Failed
        )
    }
}
