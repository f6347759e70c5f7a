use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::hash::Hash;

/// An immutable byte buffer named by the hash of its contents.
///
/// The hash is computed on first access and memoized. Cloning is cheap: the
/// payload and the memoized hash are shared.
#[derive(Clone)]
pub struct Chunk {
    data: Arc<[u8]>,
    hash: Arc<OnceLock<Hash>>,
}

impl Chunk {
    /// Wrap `data`. The hash is computed on first use.
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            data: data.into(),
            hash: Arc::new(OnceLock::new()),
        }
    }

    /// Build a chunk whose hash is already known (e.g. read back from a store
    /// under that name).
    pub fn with_hash(hash: Hash, data: impl Into<Arc<[u8]>>) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(hash);
        Self {
            data: data.into(),
            hash: Arc::new(cell),
        }
    }

    /// The empty chunk, returned by stores for absent hashes.
    pub fn empty() -> Self {
        Self::with_hash(Hash::empty(), Vec::new())
    }

    /// Content hash of the data.
    pub fn hash(&self) -> Hash {
        *self.hash.get_or_init(|| Hash::of(&self.data))
    }

    /// The raw bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl PartialEq for Chunk {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for Chunk {}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("hash", &self.hash())
            .field("len", &self.data.len())
            .finish()
    }
}
