//! # Proposal Sync Errors
//!
//! Error taxonomy shared by every crate of the proposal sync workspace.
//!
//! - Uses `thiserror` for structured error definitions
//! - Every store failure names the store and the operation that failed
//! - `ErrorKind` lets callers map failures to distinct responses without
//!   matching on variant payloads

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed cause carried by store failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Which side of the pair an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Relational,
    Document,
    Lock
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Relational => write!(f, "relational"),
            StoreKind::Document => write!(f, "document"),
            StoreKind::Lock => write!(f, "lock")
        }
    }
}

/// A stored value that cannot be coerced between the relational and the
/// document representation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Cannot map field {field}: {reason}")]
pub struct MappingError {
    pub field: String,
    pub reason: String
}

impl MappingError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into()
        }
    }
}

/// Errors raised by the consistency engine.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Record {id} not found in {store} store")]
    NotFound { store: StoreKind, id: String },

    #[error("{store} store unavailable during {operation}: {source}")]
    StoreUnavailable {
        store: StoreKind,
        operation: String,
        #[source]
        source: BoxError
    },

    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("Document {id} has no relational record; allocate a relational id before syncing it")]
    OrphanDocument { id: String }
}

impl SyncError {
    pub fn not_found(store: StoreKind, id: impl ToString) -> Self {
        SyncError::NotFound {
            store,
            id: id.to_string()
        }
    }

    pub fn unavailable(
        store: StoreKind,
        operation: impl Into<String>,
        source: impl Into<BoxError>
    ) -> Self {
        SyncError::StoreUnavailable {
            store,
            operation: operation.into(),
            source: source.into()
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        SyncError::Validation {
            field: field.into(),
            reason: reason.into()
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::NotFound { .. } => ErrorKind::NotFound,
            SyncError::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
            SyncError::Validation { .. } => ErrorKind::Validation,
            SyncError::Mapping(_) => ErrorKind::Mapping,
            SyncError::OrphanDocument { .. } => ErrorKind::OrphanDocument
        }
    }

    /// Store outages and timeouts may succeed when the caller tries again.
    /// Nothing in this workspace retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::StoreUnavailable { .. })
    }

    pub fn store(&self) -> Option<StoreKind> {
        match self {
            SyncError::NotFound { store, .. } | SyncError::StoreUnavailable { store, .. } => {
                Some(*store)
            }
            _ => None
        }
    }
}

/// Coarse classification of a [`SyncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    StoreUnavailable,
    Validation,
    Mapping,
    OrphanDocument
}

impl ErrorKind {
    /// Status code a route handler should answer with for this kind.
    pub fn http_status_hint(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::StoreUnavailable => 503,
            ErrorKind::Validation => 400,
            ErrorKind::Mapping => 422,
            ErrorKind::OrphanDocument => 409
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::StoreUnavailable => write!(f, "store_unavailable"),
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Mapping => write!(f, "mapping"),
            ErrorKind::OrphanDocument => write!(f, "orphan_document")
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
