// src/sync/payload.rs
// Typed accessors over the opaque vendor payload.
// The vendor's record schema drifts per module and isn't specified here; we
// only ever decode the handful of fields the sync core and ArtifactBuilder
// actually need, and store the rest as an opaque JSON blob.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::SyncError;

/// `Modified_Time` is the cursor field the poller sweeps on and the
/// arbitration field for last-write-wins.
pub fn extract_modified_time(payload: &Value) -> Result<DateTime<Utc>, SyncError> {
    payload
        .get("Modified_Time")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| SyncError::PoisonedPayload("missing or unparseable Modified_Time".into()))
}

pub fn extract_created_time(payload: &Value) -> Option<DateTime<Utc>> {
    payload
        .get("Created_Time")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn extract_owner_email(payload: &Value) -> Option<String> {
    payload
        .get("Owner")
        .and_then(|owner| owner.get("email"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub fn extract_owner_name(payload: &Value) -> Option<String> {
    payload
        .get("Owner")
        .and_then(|owner| owner.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// The vendor's record id, read at the webhook edge before the row even
/// exists in WebhookEvent.
pub fn extract_external_id(payload: &Value) -> Option<String> {
    payload
        .get("id")
        .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_i64().map(|n| n.to_string())))
}

/// The vendor's event kind, read at the webhook edge.
pub fn extract_event_kind(payload: &Value) -> Option<crate::domain::EventKind> {
    payload
        .get("event_type")
        .and_then(Value::as_str)
        .and_then(crate::domain::EventKind::from_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_owner_and_modified_time() {
        let payload = json!({
            "Modified_Time": "2025-10-20T12:00:00Z",
            "Owner": {"email": "owner@firm.com", "name": "Owner Name"},
        });

        assert_eq!(
            extract_modified_time(&payload).unwrap().to_rfc3339(),
            "2025-10-20T12:00:00+00:00"
        );
        assert_eq!(extract_owner_email(&payload).as_deref(), Some("owner@firm.com"));
        assert_eq!(extract_owner_name(&payload).as_deref(), Some("Owner Name"));
    }

    #[test]
    fn missing_modified_time_is_poisoned() {
        let payload = json!({"Owner": {"email": "x@firm.com"}});
        assert!(extract_modified_time(&payload).is_err());
    }
}
