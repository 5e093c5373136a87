// Error taxonomy shared by every allocation operation.

use thiserror::Error;

use crate::model::EntryStatus;

/// Errors returned by the allocation engine and the store traits it drives.
///
/// Every error is scoped to a single call; none of them leave the engine in a
/// degraded state.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// The pool entry or team does not exist (or is not visible under the
    /// scope the caller supplied).
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Another operator (or a retry of the same call) already moved the entry
    /// out of `waiting`.
    #[error("pool entry {entry_id} already resolved as {status}")]
    AlreadyResolved { entry_id: String, status: EntryStatus },

    /// The backing store failed. The whole operation may be retried.
    #[error("store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("validation error for field `{field}`: {message}")]
    Validation { field: String, message: String },
}

impl AllocationError {
    pub fn entry_not_found(id: &str) -> Self {
        AllocationError::NotFound {
            kind: "pool entry",
            id: id.to_string(),
        }
    }

    pub fn team_not_found(id: &str) -> Self {
        AllocationError::NotFound {
            kind: "team",
            id: id.to_string(),
        }
    }

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AllocationError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Wrap an adapter-level failure. The full context chain is kept in the
    /// message so logs show the failing statement.
    pub fn store(err: anyhow::Error) -> Self {
        AllocationError::StoreUnavailable {
            message: format!("{err:#}"),
        }
    }

    /// Only infrastructure failures are worth retrying; the other variants
    /// describe caller mistakes or a decided race.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AllocationError::StoreUnavailable { .. })
    }

    /// Stable machine-readable name, used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            AllocationError::NotFound { .. } => "NOT_FOUND",
            AllocationError::AlreadyResolved { .. } => "ALREADY_RESOLVED",
            AllocationError::StoreUnavailable { .. } => "STORE_UNAVAILABLE",
            AllocationError::Validation { .. } => "VALIDATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, AllocationError>;
