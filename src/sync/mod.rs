// src/sync/mod.rs
// Sync subsystem: the shared upsert core used by both the webhook-driven
// SyncWorker and the cursor-driven Poller.

pub mod core;
pub mod payload;
pub mod worker;

pub use core::{apply_incoming_record, ApplyOutcome, IncomingRecord};
pub use worker::{reap_stuck_processing, SyncWorkerPool};
