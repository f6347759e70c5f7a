use std::collections::BTreeSet;

use strata_types::{Chunk, Hash};

use crate::error::StoreResult;

/// Hashes of chunks that are likely to be read alongside a written chunk.
///
/// Backends that validate references or prefetch may use them; others ignore
/// them.
pub type Hints = BTreeSet<Hash>;

/// Content-addressed chunk storage.
///
/// Implementations must satisfy these invariants:
/// - Chunks are immutable once written. Writing identical content twice is a
///   no-op.
/// - Concurrent reads are always safe.
/// - The store never interprets chunk contents.
/// - All I/O errors are propagated, never silently ignored.
pub trait ChunkStore: Send + Sync {
    /// Read a chunk by hash.
    ///
    /// Returns the empty chunk if no chunk is stored under `hash`.
    fn get(&self, hash: &Hash) -> StoreResult<Chunk>;

    /// Check whether a chunk exists.
    fn has(&self, hash: &Hash) -> StoreResult<bool>;

    /// Store a chunk under its content hash.
    fn put(&self, chunk: Chunk) -> StoreResult<()>;

    /// Store several chunks.
    ///
    /// Default implementation calls `put()` for each chunk.
    fn put_many(&self, chunks: Vec<Chunk>) -> StoreResult<()> {
        chunks.into_iter().try_for_each(|c| self.put(c))
    }

    /// Release any resources held by the store.
    fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// The single mutable pointer of a store.
pub trait RootTracker: Send + Sync {
    /// Current root hash. [`Hash::empty`] if no root was ever set.
    fn root(&self) -> StoreResult<Hash>;

    /// Atomically replace the root with `new` if it currently equals
    /// `expected`.
    ///
    /// Returns `Ok(false)` without changing anything when the current root
    /// differs from `expected`.
    fn update_root(&self, new: Hash, expected: Hash) -> StoreResult<bool>;
}

/// A store that buffers writes.
///
/// `schedule_put` only promises that the chunk will be durable after the
/// next `flush` (or `close`). Reads must see scheduled chunks immediately.
pub trait BatchStore: Send + Sync {
    fn get(&self, hash: &Hash) -> StoreResult<Chunk>;

    fn has(&self, hash: &Hash) -> StoreResult<bool>;

    /// Queue a chunk for writing.
    fn schedule_put(&self, chunk: Chunk, hints: &Hints) -> StoreResult<()>;

    /// Make every previously scheduled chunk durable.
    fn flush(&self) -> StoreResult<()>;

    fn root(&self) -> StoreResult<Hash>;

    /// Flush, then compare-and-swap the root.
    fn update_root(&self, new: Hash, expected: Hash) -> StoreResult<bool>;

    /// Flush and release resources.
    fn close(&self) -> StoreResult<()> {
        self.flush()
    }
}
