use strata_store::StoreError;
use strata_types::Hash;

/// Errors produced by value, sequence and value-store operations.
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    /// An index or range lies outside a collection.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: u64, len: u64 },

    /// A malformed argument (bad struct or field name, duplicate field, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A struct field that does not exist was requested.
    #[error("struct {name:?} has no field {field:?}")]
    NoSuchField { name: String, field: String },

    /// Chunk bytes could not be decoded into a value.
    #[error("decode error: {0}")]
    Decode(String),

    /// A tree node refers to a chunk that is not in the store.
    #[error("missing chunk {0}")]
    MissingChunk(Hash),

    /// A value being written references a chunk that was never written.
    #[error("value references unknown chunk {0}")]
    DanglingRef(Hash),

    /// A chunk decoded to a value of the wrong kind.
    #[error("expected {expected} at {hash}, found {actual}")]
    UnexpectedKind {
        hash: Hash,
        expected: &'static str,
        actual: &'static str,
    },

    /// The value store backing a lazily loaded node was dropped or closed.
    #[error("value store is closed")]
    StoreClosed,

    /// Reading the source of a blob failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the underlying chunk store, propagated unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ValueError {
    /// Whether the failed operation may succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ValueError::Store(e) if e.is_retryable())
    }
}

/// Result alias for value operations.
pub type ValueResult<T> = Result<T, ValueError>;
