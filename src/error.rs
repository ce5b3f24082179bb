// src/error.rs
// Typed error kinds for the sync engine: validation errors never persist,
// transient infra errors retry, and only the outermost adapter (HTTP
// handler or worker shell) maps
// a typed error to a transport-specific response.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid stored data: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("invalid shared secret")]
    Unauthorized,
    #[error("unknown module: {0}")]
    InvalidModule(String),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("queue unavailable: {0}")]
    BusUnavailable(String),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("poisoned payload: {0}")]
    PoisonedPayload(String),
    #[error("transient infra error: {0}")]
    Transient(String),
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
}

/// Crate-wide error type. Sub-errors convert into it so internal modules can
/// return their specific error while a single adapter layer (axum handlers,
/// the worker shell) does the final mapping to a transport response.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Webhook(#[from] WebhookError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
