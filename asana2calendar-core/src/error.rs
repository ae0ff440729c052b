//! Error types for asana2calendar.
//!
//! The taxonomy follows how far a failure reaches: a malformed or rejected
//! record is skipped, an unavailable adapter is excluded from the pass, and a
//! store failure aborts the whole pass.

use thiserror::Error;

use crate::store::LinkId;

/// A record pulled from an adapter could not be coerced into an [`Event`](crate::event::Event).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("malformed record {} from '{adapter}': {reason}", .native_id.as_deref().unwrap_or("<unknown>"))]
pub struct MalformedEventError {
    pub adapter: String,
    pub native_id: Option<String>,
    pub reason: String,
}

impl MalformedEventError {
    pub fn new(adapter: &str, native_id: Option<&str>, reason: impl Into<String>) -> Self {
        MalformedEventError {
            adapter: adapter.to_string(),
            native_id: native_id.map(str::to_string),
            reason: reason.into(),
        }
    }
}

/// Errors raised by adapters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    /// The backing service could not be reached (network, auth, timeout).
    #[error("adapter '{adapter}' is unavailable: {reason}")]
    Unavailable { adapter: String, reason: String },

    /// The service refused this particular record.
    #[error("adapter '{adapter}' rejected {}: {reason}", .native_id.as_deref().unwrap_or("new record"))]
    Rejected {
        adapter: String,
        native_id: Option<String>,
        reason: String,
    },
}

impl AdapterError {
    pub fn unavailable(adapter: &str, reason: impl Into<String>) -> Self {
        AdapterError::Unavailable {
            adapter: adapter.to_string(),
            reason: reason.into(),
        }
    }

    pub fn rejected(adapter: &str, native_id: Option<&str>, reason: impl Into<String>) -> Self {
        AdapterError::Rejected {
            adapter: adapter.to_string(),
            native_id: native_id.map(str::to_string),
            reason: reason.into(),
        }
    }

    /// Classify a non-success HTTP status. Server errors, throttling and bad
    /// credentials affect every record, anything else only this one.
    pub fn from_status(adapter: &str, native_id: Option<&str>, status: u16, body: &str) -> Self {
        let body: String = body.trim().chars().take(200).collect();
        let reason = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {body}")
        };
        if status >= 500 || status == 401 || status == 429 {
            AdapterError::unavailable(adapter, reason)
        } else {
            AdapterError::rejected(adapter, native_id, reason)
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, AdapterError::Unavailable { .. })
    }
}

/// Errors raised by the correspondence store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Another sync pass holds the correspondence store; try again once it finishes")]
    Locked,

    #[error("Correspondence store schema is invalid: {0}\nRun `asana2calendar init --force` to reinitialize it.")]
    Corrupt(String),

    #[error("'{0}' cannot be used as an adapter name (expected lowercase letters, digits and '_')")]
    InvalidAdapterName(String),

    #[error("Adapter '{0}' is not part of the store schema")]
    UnknownAdapter(String),

    #[error("Link {0} does not exist")]
    UnknownLink(LinkId),

    #[error("Link {link} already holds {adapter} record {existing}, cannot attach {native_id}")]
    AlreadyAttached {
        link: LinkId,
        adapter: String,
        existing: String,
        native_id: String,
    },

    #[error("Database error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                StoreError::Locked
            }
            _ => StoreError::Sqlite(err),
        }
    }
}

/// Top-level errors for asana2calendar operations.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Malformed(#[from] MalformedEventError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for asana2calendar operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type alias for adapter calls.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
