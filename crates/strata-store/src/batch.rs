use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use strata_types::{Chunk, Hash};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{BatchStore, ChunkStore, Hints, RootTracker};

/// A [`BatchStore`] over a local `ChunkStore + RootTracker`.
///
/// Scheduled chunks are kept in memory, in scheduling order, until `flush`.
/// Reads consult the pending set before the backing store. `update_root`
/// always flushes first, so the root never names an unwritten chunk.
pub struct LocalBatchStore<S> {
    backing: S,
    pending: Mutex<Pending>,
    closed: AtomicBool,
}

#[derive(Default)]
struct Pending {
    order: Vec<Hash>,
    chunks: HashMap<Hash, Chunk>,
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::LockPoisoned(e.to_string())
}

impl<S: ChunkStore + RootTracker> LocalBatchStore<S> {
    /// Wrap `backing` with an empty pending set.
    pub fn new(backing: S) -> Self {
        Self {
            backing,
            pending: Mutex::new(Pending::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// The wrapped store.
    pub fn backing(&self) -> &S {
        &self.backing
    }

    /// Number of chunks scheduled but not yet flushed.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().expect("lock poisoned").order.len()
    }

    fn check_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl<S: ChunkStore + RootTracker> BatchStore for LocalBatchStore<S> {
    fn get(&self, hash: &Hash) -> StoreResult<Chunk> {
        self.check_open()?;
        if let Some(c) = self.pending.lock().map_err(poisoned)?.chunks.get(hash) {
            return Ok(c.clone());
        }
        self.backing.get(hash)
    }

    fn has(&self, hash: &Hash) -> StoreResult<bool> {
        self.check_open()?;
        if self.pending.lock().map_err(poisoned)?.chunks.contains_key(hash) {
            return Ok(true);
        }
        self.backing.has(hash)
    }

    fn schedule_put(&self, chunk: Chunk, _hints: &Hints) -> StoreResult<()> {
        self.check_open()?;
        let hash = chunk.hash();
        let mut pending = self.pending.lock().map_err(poisoned)?;
        if pending.chunks.insert(hash, chunk).is_none() {
            pending.order.push(hash);
        }
        Ok(())
    }

    fn flush(&self) -> StoreResult<()> {
        self.check_open()?;
        let mut pending = self.pending.lock().map_err(poisoned)?;
        if pending.order.is_empty() {
            return Ok(());
        }
        let batch: Vec<Chunk> = pending
            .order
            .iter()
            .filter_map(|h| pending.chunks.get(h).cloned())
            .collect();
        debug!(count = batch.len(), "flushing scheduled chunks");
        // Pending chunks stay scheduled until the backing store accepts them.
        self.backing.put_many(batch)?;
        *pending = Pending::default();
        Ok(())
    }

    fn root(&self) -> StoreResult<Hash> {
        self.check_open()?;
        self.backing.root()
    }

    fn update_root(&self, new: Hash, expected: Hash) -> StoreResult<bool> {
        self.flush()?;
        self.backing.update_root(new, expected)
    }

    fn close(&self) -> StoreResult<()> {
        self.flush()?;
        self.closed.store(true, Ordering::Release);
        self.backing.close()
    }
}

impl<S> std::fmt::Debug for LocalBatchStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pending = self.pending.lock().map(|p| p.order.len()).unwrap_or(0);
        f.debug_struct("LocalBatchStore")
            .field("pending", &pending)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn chunk(s: &str) -> Chunk {
        Chunk::new(s.as_bytes().to_vec())
    }

    /// A memory store whose first `failures` batch writes time out.
    struct FlakyStore {
        inner: MemoryStore,
        failures: AtomicUsize,
    }

    impl FlakyStore {
        fn new(inner: MemoryStore, failures: usize) -> Self {
            Self {
                inner,
                failures: AtomicUsize::new(failures),
            }
        }
    }

    impl ChunkStore for FlakyStore {
        fn get(&self, hash: &Hash) -> StoreResult<Chunk> {
            self.inner.get(hash)
        }

        fn has(&self, hash: &Hash) -> StoreResult<bool> {
            self.inner.has(hash)
        }

        fn put(&self, chunk: Chunk) -> StoreResult<()> {
            self.inner.put(chunk)
        }

        fn put_many(&self, chunks: Vec<Chunk>) -> StoreResult<()> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Timeout {
                    op: "put",
                    after: Duration::from_secs(1),
                });
            }
            self.inner.put_many(chunks)
        }
    }

    impl RootTracker for FlakyStore {
        fn root(&self) -> StoreResult<Hash> {
            self.inner.root()
        }

        fn update_root(&self, new: Hash, expected: Hash) -> StoreResult<bool> {
            self.inner.update_root(new, expected)
        }
    }

    #[test]
    fn scheduled_chunks_are_readable_before_flush() {
        let backing = MemoryStore::new();
        let bs = LocalBatchStore::new(backing.clone());
        let c = chunk("pending");
        bs.schedule_put(c.clone(), &Hints::new()).unwrap();

        assert_eq!(bs.pending_len(), 1);
        assert!(bs.has(&c.hash()).unwrap());
        assert_eq!(bs.get(&c.hash()).unwrap(), c);
        assert!(!backing.has(&c.hash()).unwrap());
    }

    #[test]
    fn flush_writes_through() {
        let backing = MemoryStore::new();
        let bs = LocalBatchStore::new(backing.clone());
        bs.schedule_put(chunk("a"), &Hints::new()).unwrap();
        bs.schedule_put(chunk("b"), &Hints::new()).unwrap();
        bs.schedule_put(chunk("a"), &Hints::new()).unwrap();
        assert_eq!(bs.pending_len(), 2);

        bs.flush().unwrap();
        assert_eq!(bs.pending_len(), 0);
        assert_eq!(backing.len(), 2);
    }

    #[test]
    fn update_root_flushes_first() {
        let backing = MemoryStore::new();
        let bs = LocalBatchStore::new(backing.clone());
        let c = chunk("root object");
        bs.schedule_put(c.clone(), &Hints::new()).unwrap();

        assert!(bs.update_root(c.hash(), Hash::empty()).unwrap());
        assert!(backing.has(&c.hash()).unwrap());
        assert_eq!(backing.root().unwrap(), c.hash());
    }

    #[test]
    fn stale_update_root_fails() {
        let backing = MemoryStore::new();
        let bs = LocalBatchStore::new(backing.clone());
        backing.update_root(Hash::of(b"other"), Hash::empty()).unwrap();
        assert!(!bs.update_root(Hash::of(b"mine"), Hash::empty()).unwrap());
    }

    #[test]
    fn use_after_close_is_an_error() {
        let bs = LocalBatchStore::new(MemoryStore::new());
        bs.schedule_put(chunk("x"), &Hints::new()).unwrap();
        bs.close().unwrap();
        assert!(bs.backing().has(&Hash::of(b"x")).unwrap());
        assert!(matches!(bs.get(&Hash::of(b"x")), Err(StoreError::Closed)));
    }

    #[test]
    fn failed_flush_keeps_chunks_scheduled() {
        let backing = MemoryStore::new();
        let bs = LocalBatchStore::new(FlakyStore::new(backing.clone(), 1));
        let c = chunk("must survive");
        bs.schedule_put(c.clone(), &Hints::new()).unwrap();

        let err = bs.flush().unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(bs.pending_len(), 1);
        assert_eq!(bs.get(&c.hash()).unwrap(), c);
        assert!(!backing.has(&c.hash()).unwrap());

        bs.flush().unwrap();
        assert_eq!(bs.pending_len(), 0);
        assert!(backing.has(&c.hash()).unwrap());
    }

    #[test]
    fn failed_flush_blocks_root_update() {
        let backing = MemoryStore::new();
        let bs = LocalBatchStore::new(FlakyStore::new(backing.clone(), 1));
        let c = chunk("root");
        bs.schedule_put(c.clone(), &Hints::new()).unwrap();

        assert!(bs.update_root(c.hash(), Hash::empty()).is_err());
        assert!(backing.root().unwrap().is_empty());
        assert!(bs.update_root(c.hash(), Hash::empty()).unwrap());
        assert!(backing.has(&c.hash()).unwrap());
    }
}
