// src/sync/core.rs
// The shared upsert path used by both SyncWorker and Poller
// so the webhook and poll paths cannot drift — a single code path shared
// by both writers.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::{ConflictKind, EventKind, ModuleKind};
use crate::error::SyncError;
use crate::store::mirrored::UpsertOutcome;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Inserted,
    Updated,
    Tombstoned,
    Conflict(ConflictKind),
    /// Delete event for a record we've never seen; nothing to tombstone.
    NoopMissingDelete,
}

/// A single incoming record, from either a webhook payload or a vendor
/// cursor-query page. Both callers extract the same fields before handing
/// off here.
pub struct IncomingRecord<'a> {
    pub module: ModuleKind,
    pub external_id: &'a str,
    pub event_kind: EventKind,
    pub owner_email: Option<&'a str>,
    pub owner_display_name: Option<&'a str>,
    pub created_time: Option<DateTime<Utc>>,
    pub modified_time: DateTime<Utc>,
    pub payload: &'a Value,
}

/// Apply one incoming record against the Store.
pub async fn apply_incoming_record(
    store: &Store,
    incoming: &IncomingRecord<'_>,
) -> Result<ApplyOutcome, SyncError> {
    let existing = store
        .mirrored
        .get(incoming.module, incoming.external_id)
        .await?;

    if incoming.event_kind.is_delete() {
        return match existing {
            Some(_) => {
                store
                    .mirrored
                    .tombstone(incoming.module, incoming.external_id, incoming.modified_time)
                    .await?;
                Ok(ApplyOutcome::Tombstoned)
            }
            None => Ok(ApplyOutcome::NoopMissingDelete),
        };
    }

    match existing {
        None => {
            if incoming.event_kind == EventKind::Edit && payload_is_empty(incoming.payload) {
                record_conflict(
                    store,
                    incoming,
                    ConflictKind::MissingRecord,
                    None,
                    None,
                )
                .await?;
                return Ok(ApplyOutcome::Conflict(ConflictKind::MissingRecord));
            }

            store
                .mirrored
                .insert(
                    incoming.module,
                    incoming.external_id,
                    incoming.owner_email,
                    incoming.owner_display_name,
                    incoming.created_time,
                    incoming.modified_time,
                    incoming.payload,
                )
                .await?;
            Ok(ApplyOutcome::Inserted)
        }
        Some(current) => {
            if incoming.modified_time <= current.modified_time {
                record_conflict(
                    store,
                    incoming,
                    ConflictKind::StaleUpdate,
                    Some(incoming.modified_time),
                    Some(current.modified_time),
                )
                .await?;
                return Ok(ApplyOutcome::Conflict(ConflictKind::StaleUpdate));
            }

            // Optimistic CAS; one reload-and-retry on a lost race.
            let outcome = store
                .mirrored
                .update_cas(
                    incoming.module,
                    incoming.external_id,
                    current.sync_version,
                    incoming.owner_email,
                    incoming.owner_display_name,
                    incoming.modified_time,
                    incoming.payload,
                )
                .await?;

            match outcome {
                UpsertOutcome::Updated(_) => Ok(ApplyOutcome::Updated),
                UpsertOutcome::VersionConflict => {
                    let reloaded = store
                        .mirrored
                        .get(incoming.module, incoming.external_id)
                        .await?
                        .ok_or_else(|| {
                            SyncError::Transient(format!(
                                "{} {} vanished mid-retry",
                                incoming.module, incoming.external_id
                            ))
                        })?;

                    if incoming.modified_time <= reloaded.modified_time {
                        record_conflict(
                            store,
                            incoming,
                            ConflictKind::StaleUpdate,
                            Some(incoming.modified_time),
                            Some(reloaded.modified_time),
                        )
                        .await?;
                        return Ok(ApplyOutcome::Conflict(ConflictKind::StaleUpdate));
                    }

                    let retry = store
                        .mirrored
                        .update_cas(
                            incoming.module,
                            incoming.external_id,
                            reloaded.sync_version,
                            incoming.owner_email,
                            incoming.owner_display_name,
                            incoming.modified_time,
                            incoming.payload,
                        )
                        .await?;

                    match retry {
                        UpsertOutcome::Updated(_) => Ok(ApplyOutcome::Updated),
                        _ => {
                            record_conflict(
                                store,
                                incoming,
                                ConflictKind::ConcurrentWrite,
                                Some(incoming.modified_time),
                                Some(reloaded.modified_time),
                            )
                            .await?;
                            Ok(ApplyOutcome::Conflict(ConflictKind::ConcurrentWrite))
                        }
                    }
                }
                UpsertOutcome::Stale { .. } | UpsertOutcome::Inserted(_) => unreachable!(
                    "update_cas never returns Stale/Inserted; those are MirroredStore::insert's"
                ),
            }
        }
    }
}

async fn record_conflict(
    store: &Store,
    incoming: &IncomingRecord<'_>,
    kind: ConflictKind,
    incoming_modified: Option<DateTime<Utc>>,
    existing_modified: Option<DateTime<Utc>>,
) -> Result<(), SyncError> {
    store
        .conflicts
        .record(
            incoming.module,
            incoming.external_id,
            kind,
            incoming_modified,
            existing_modified,
            None,
            incoming.payload,
        )
        .await?;
    store.sync_metadata.record_conflict(incoming.module).await?;
    Ok(())
}

fn payload_is_empty(payload: &Value) -> bool {
    match payload {
        Value::Object(map) => map.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use serde_json::json;

    fn incoming<'a>(
        module: ModuleKind,
        external_id: &'a str,
        event_kind: EventKind,
        modified_time: DateTime<Utc>,
        payload: &'a Value,
    ) -> IncomingRecord<'a> {
        IncomingRecord {
            module,
            external_id,
            event_kind,
            owner_email: Some("owner@firm.com"),
            owner_display_name: Some("Owner"),
            created_time: None,
            modified_time,
            payload,
        }
    }

    #[tokio::test]
    async fn first_write_inserts_with_version_one() {
        let store = Store::in_memory().await;
        let t0: DateTime<Utc> = "2025-10-20T12:00:00Z".parse().unwrap();
        let payload = json!({"Deal_Name": "X"});
        let incoming = incoming(ModuleKind::Deals, "900", EventKind::Create, t0, &payload);

        let outcome = apply_incoming_record(&store, &incoming).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Inserted);

        let record = store.mirrored.get(ModuleKind::Deals, "900").await.unwrap().unwrap();
        assert_eq!(record.sync_version, 1);
    }

    #[tokio::test]
    async fn stale_update_is_recorded_as_conflict_and_does_not_overwrite() {
        let store = Store::in_memory().await;
        let t0: DateTime<Utc> = "2025-10-20T12:00:00Z".parse().unwrap();
        let t_stale: DateTime<Utc> = "2025-10-20T11:59:59Z".parse().unwrap();
        let payload = json!({"Deal_Name": "Original"});
        let stale_payload = json!({"Deal_Name": "Stale"});

        apply_incoming_record(&store, &incoming(ModuleKind::Deals, "900", EventKind::Create, t0, &payload))
            .await
            .unwrap();

        let outcome = apply_incoming_record(
            &store,
            &incoming(ModuleKind::Deals, "900", EventKind::Update, t_stale, &stale_payload),
        )
        .await
        .unwrap();

        assert_eq!(outcome, ApplyOutcome::Conflict(ConflictKind::StaleUpdate));
        let record = store.mirrored.get(ModuleKind::Deals, "900").await.unwrap().unwrap();
        assert_eq!(record.payload, payload);

        let conflicts = store.conflicts.list(Some(ModuleKind::Deals), true, 10, 0).await.unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_kind, ConflictKind::StaleUpdate);
    }

    #[tokio::test]
    async fn delete_event_tombstones_without_removing_row() {
        let store = Store::in_memory().await;
        let t0: DateTime<Utc> = "2025-10-20T12:00:00Z".parse().unwrap();
        let t1: DateTime<Utc> = "2025-10-20T13:00:00Z".parse().unwrap();
        let payload = json!({});

        apply_incoming_record(&store, &incoming(ModuleKind::Leads, "1", EventKind::Create, t0, &payload))
            .await
            .unwrap();
        let outcome = apply_incoming_record(&store, &incoming(ModuleKind::Leads, "1", EventKind::Delete, t1, &payload))
            .await
            .unwrap();

        assert_eq!(outcome, ApplyOutcome::Tombstoned);
        let record = store.mirrored.get(ModuleKind::Leads, "1").await.unwrap().unwrap();
        assert!(record.tombstoned);
    }

    #[tokio::test]
    async fn edit_for_unknown_id_with_no_data_is_missing_record_conflict() {
        let store = Store::in_memory().await;
        let t0: DateTime<Utc> = "2025-10-20T12:00:00Z".parse().unwrap();
        let payload = json!({});

        let outcome = apply_incoming_record(&store, &incoming(ModuleKind::Contacts, "404", EventKind::Edit, t0, &payload))
            .await
            .unwrap();

        assert_eq!(outcome, ApplyOutcome::Conflict(ConflictKind::MissingRecord));
        assert!(store.mirrored.get(ModuleKind::Contacts, "404").await.unwrap().is_none());
    }
}
