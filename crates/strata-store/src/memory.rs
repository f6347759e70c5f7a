use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use strata_types::{Chunk, Hash};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{ChunkStore, RootTracker};

/// In-memory, HashMap-based chunk store with a root pointer.
///
/// Intended for tests and embedding. Cloning a `MemoryStore` yields another
/// handle onto the same chunks and root, which is how several databases are
/// opened against one store.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    chunks: RwLock<HashMap<Hash, Chunk>>,
    root: Mutex<Hash>,
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::LockPoisoned(e.to_string())
}

impl MemoryStore {
    /// Create a new empty store whose root is [`Hash::empty`].
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                chunks: RwLock::new(HashMap::new()),
                root: Mutex::new(Hash::empty()),
            }),
        }
    }

    /// Number of chunks currently stored.
    pub fn len(&self) -> usize {
        self.inner.chunks.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return a sorted list of all stored hashes.
    pub fn all_hashes(&self) -> StoreResult<Vec<Hash>> {
        let map = self.inner.chunks.read().map_err(poisoned)?;
        let mut hashes: Vec<Hash> = map.keys().copied().collect();
        hashes.sort();
        Ok(hashes)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkStore for MemoryStore {
    fn get(&self, hash: &Hash) -> StoreResult<Chunk> {
        let map = self.inner.chunks.read().map_err(poisoned)?;
        Ok(map.get(hash).cloned().unwrap_or_else(Chunk::empty))
    }

    fn has(&self, hash: &Hash) -> StoreResult<bool> {
        let map = self.inner.chunks.read().map_err(poisoned)?;
        Ok(map.contains_key(hash))
    }

    fn put(&self, chunk: Chunk) -> StoreResult<()> {
        let hash = chunk.hash();
        let mut map = self.inner.chunks.write().map_err(poisoned)?;
        map.entry(hash).or_insert(chunk);
        Ok(())
    }

    fn put_many(&self, chunks: Vec<Chunk>) -> StoreResult<()> {
        let mut map = self.inner.chunks.write().map_err(poisoned)?;
        for chunk in chunks {
            map.entry(chunk.hash()).or_insert(chunk);
        }
        Ok(())
    }
}

impl RootTracker for MemoryStore {
    fn root(&self) -> StoreResult<Hash> {
        Ok(*self.inner.root.lock().map_err(poisoned)?)
    }

    fn update_root(&self, new: Hash, expected: Hash) -> StoreResult<bool> {
        let mut root = self.inner.root.lock().map_err(poisoned)?;
        let current = *root;
        if current != expected {
            debug!(current = %current, expected = %expected, "root update rejected");
            return Ok(false);
        }
        debug!(old = %expected, new = %new, "root updated");
        *root = new;
        Ok(true)
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("chunk_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn chunk(s: &str) -> Chunk {
        Chunk::new(s.as_bytes().to_vec())
    }

    // -----------------------------------------------------------------------
    // Chunks
    // -----------------------------------------------------------------------

    #[test]
    fn put_and_get() {
        let store = MemoryStore::new();
        let c = chunk("hello");
        store.put(c.clone()).unwrap();
        assert!(store.has(&c.hash()).unwrap());
        assert_eq!(store.get(&c.hash()).unwrap(), c);
    }

    #[test]
    fn absent_reads_as_empty() {
        let store = MemoryStore::new();
        let h = Hash::of(b"nothing");
        assert!(!store.has(&h).unwrap());
        assert!(store.get(&h).unwrap().is_empty());
    }

    #[test]
    fn put_is_idempotent() {
        let store = MemoryStore::new();
        store.put(chunk("a")).unwrap();
        store.put(chunk("a")).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn put_many_and_list() {
        let store = MemoryStore::new();
        store
            .put_many(vec![chunk("x"), chunk("y"), chunk("z")])
            .unwrap();
        let hashes = store.all_hashes().unwrap();
        assert_eq!(hashes.len(), 3);
        assert!(hashes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn clones_share_state() {
        let a = MemoryStore::new();
        let b = a.clone();
        a.put(chunk("shared")).unwrap();
        assert!(b.has(&Hash::of(b"shared")).unwrap());
    }

    // -----------------------------------------------------------------------
    // Root
    // -----------------------------------------------------------------------

    #[test]
    fn root_starts_empty() {
        assert!(MemoryStore::new().root().unwrap().is_empty());
    }

    #[test]
    fn update_root_is_compare_and_swap() {
        let store = MemoryStore::new();
        let r1 = Hash::of(b"r1");
        let r2 = Hash::of(b"r2");
        assert!(store.update_root(r1, Hash::empty()).unwrap());
        assert_eq!(store.root().unwrap(), r1);

        // Stale expectation is rejected and the root is unchanged.
        assert!(!store.update_root(r2, Hash::empty()).unwrap());
        assert_eq!(store.root().unwrap(), r1);

        assert!(store.update_root(r2, r1).unwrap());
        assert_eq!(store.root().unwrap(), r2);
    }

    #[test]
    fn concurrent_updates_from_same_root_have_one_winner() {
        let store = MemoryStore::new();
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let s = store.clone();
                thread::spawn(move || s.update_root(Hash::of(&[i]), Hash::empty()).unwrap())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }
}
