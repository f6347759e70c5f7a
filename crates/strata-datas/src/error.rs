//! Error types for dataset and commit operations.

use strata_store::StoreError;
use strata_types::Hash;
use strata_values::ValueError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The dataset id is empty or has characters outside `[A-Za-z0-9-_/]`.
    #[error("invalid dataset id {id:?}: {reason}")]
    InvalidDatasetId { id: String, reason: String },

    /// The commit does not descend from the dataset's current head.
    #[error("merge needed: commit does not descend from the head of {dataset:?}")]
    MergeNeeded { dataset: String },

    /// The store root moved since this handle last read it.
    #[error("optimistic lock failed committing to {dataset:?}: root changed concurrently")]
    OptimisticLockFailed { dataset: String },

    /// A value expected to be a commit is not one.
    #[error("{0} is not a commit")]
    NotACommit(Hash),

    /// The store root does not name a dataset map.
    #[error("corrupt root {root}: {reason}")]
    CorruptRoot { root: Hash, reason: String },

    /// Configuration could not be parsed.
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Value(#[from] ValueError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DatabaseError {
    /// Retrying the same operation after [`Database::rebase`] may succeed.
    ///
    /// [`Database::rebase`]: crate::Database::rebase
    pub fn is_retryable(&self) -> bool {
        match self {
            DatabaseError::OptimisticLockFailed { .. } => true,
            DatabaseError::Value(e) => e.is_retryable(),
            DatabaseError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// The caller must recompute its value against the new head before
    /// committing again.
    pub fn needs_rebase(&self) -> bool {
        matches!(self, DatabaseError::MergeNeeded { .. })
    }
}

pub type DatabaseResult<T> = std::result::Result<T, DatabaseError>;
