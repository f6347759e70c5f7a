use std::time::Duration;

use strata_types::Hash;

/// Errors from chunk store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A remote operation did not complete within the idle timeout.
    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    /// Stored bytes do not hash to the name they were stored under.
    #[error("corrupt chunk {hash}: {reason}")]
    Corrupt { hash: Hash, reason: String },

    /// The store was used after `close`.
    #[error("store is closed")]
    Closed,

    /// A lock guarding store state was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StoreError {
    /// Whether the failed operation may succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Timeout { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
