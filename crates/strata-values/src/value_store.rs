//! Reading and writing values through a batch store.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use strata_store::{BatchStore, Hints, LocalBatchStore, MemoryStore, StoreError};
use strata_types::Hash;
use tracing::{debug, trace};

use crate::codec;
use crate::error::{ValueError, ValueResult};
use crate::ref_value::Ref;
use crate::sequence::Sequence;
use crate::types::{Type, TypeRegistry};
use crate::value::Value;

/// Loads values by hash. Lazily loaded tree nodes hold one of these.
pub trait ValueReader: Send + Sync {
    /// The value stored under `hash`, or `None` if the store lacks it.
    fn read_value(&self, hash: &Hash) -> ValueResult<Option<Value>>;
}

/// Value store settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueStoreConfig {
    /// Decoded values kept in the LRU cache.
    pub cache_capacity: usize,
    /// Reject writes whose refs point at chunks the store does not have.
    pub validate_refs_on_write: bool,
}

impl Default for ValueStoreConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1024,
            validate_refs_on_write: true,
        }
    }
}

/// Encodes values into chunks on write and decodes them on read, with a
/// cache of recently used values and a registry of the struct types seen.
///
/// Cloning shares the store.
#[derive(Clone)]
pub struct ValueStore {
    inner: Arc<Inner>,
}

struct Inner {
    bs: Arc<dyn BatchStore>,
    cache: Mutex<LruCache<Hash, Value>>,
    registry: RwLock<TypeRegistry>,
    config: ValueStoreConfig,
    closed: AtomicBool,
}

fn poisoned<E: std::fmt::Display>(e: E) -> ValueError {
    ValueError::Store(StoreError::LockPoisoned(e.to_string()))
}

impl ValueStore {
    /// A value store over `bs`.
    pub fn new(bs: Arc<dyn BatchStore>, config: ValueStoreConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Inner {
                bs,
                cache: Mutex::new(LruCache::new(capacity)),
                registry: RwLock::new(TypeRegistry::new()),
                config,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// A store over a fresh in-memory chunk store.
    pub fn new_memory() -> Self {
        Self::new(
            Arc::new(LocalBatchStore::new(MemoryStore::new())),
            ValueStoreConfig::default(),
        )
    }

    /// The chunk store underneath.
    pub fn batch_store(&self) -> &Arc<dyn BatchStore> {
        &self.inner.bs
    }

    pub fn config(&self) -> &ValueStoreConfig {
        &self.inner.config
    }

    /// A reader that does not keep the store alive; reads after the store
    /// is dropped fail with [`ValueError::StoreClosed`].
    pub fn reader(&self) -> Arc<dyn ValueReader> {
        Arc::new(StoreReader {
            inner: Arc::downgrade(&self.inner),
        })
    }

    /// The value stored under `hash`, or `None` if the store lacks it.
    pub fn read_value(&self, hash: &Hash) -> ValueResult<Option<Value>> {
        self.check_open()?;
        read_value(&self.inner, hash)
    }

    /// Encode `value`, schedule it for writing and return a ref to it.
    ///
    /// Freshly built child nodes of collections are written first. Unless
    /// disabled in the config, every ref in `value` must point at a chunk
    /// already written or scheduled.
    pub fn write_value(&self, value: &Value) -> ValueResult<Ref> {
        self.check_open()?;
        self.write_children(value)?;

        if self.inner.config.validate_refs_on_write {
            for r in value.chunks() {
                let target = r.target_hash();
                if !self.inner.bs.has(&target)? {
                    return Err(ValueError::DanglingRef(target));
                }
            }
        }

        self.register_structs(value)?;
        let chunk = codec::encode_chunk(value);
        let hash = chunk.hash();
        let hints: Hints = value.chunks().iter().map(Ref::target_hash).collect();
        self.inner.bs.schedule_put(chunk, &hints)?;
        self.inner.cache.lock().map_err(poisoned)?.put(hash, value.clone());
        trace!(hash = %hash.short(), kind = %value.kind(), "scheduled value");
        Ok(Ref::new(value))
    }

    /// Write every in-memory tree node reachable from `value` that the store
    /// does not have yet, children before parents.
    fn write_children(&self, value: &Value) -> ValueResult<()> {
        let mut fresh: Vec<Sequence> = Vec::new();
        value.walk_inline(&mut |v| {
            if let Some(seq) = v.sequence() {
                for t in seq.tuples() {
                    if t.is_fresh() {
                        if let Some(child) = t.resolved_child() {
                            fresh.push(child.clone());
                        }
                    }
                }
            }
        });
        for child in fresh {
            if self.inner.bs.has(&child.hash())? {
                continue;
            }
            self.write_value(&child.to_value())?;
        }
        Ok(())
    }

    fn register_structs(&self, value: &Value) -> ValueResult<()> {
        register_structs(&self.inner, value)
    }

    /// Write all scheduled chunks to the backing store.
    pub fn flush(&self) -> ValueResult<()> {
        self.check_open()?;
        self.inner.bs.flush()?;
        Ok(())
    }

    /// Flush and close the backing store. Later calls fail with
    /// [`ValueError::StoreClosed`].
    pub fn close(&self) -> ValueResult<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!("closing value store");
        self.inner.bs.close()?;
        Ok(())
    }

    /// Snapshot of the struct types written or read so far.
    pub fn registry(&self) -> ValueResult<TypeRegistry> {
        Ok(self.inner.registry.read().map_err(poisoned)?.clone())
    }

    /// The struct type registered under `hash`.
    pub fn registered_type(&self, hash: &Hash) -> ValueResult<Option<Type>> {
        Ok(self.inner.registry.read().map_err(poisoned)?.get(hash).cloned())
    }

    fn check_open(&self) -> ValueResult<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(ValueError::StoreClosed);
        }
        Ok(())
    }
}

impl ValueReader for ValueStore {
    fn read_value(&self, hash: &Hash) -> ValueResult<Option<Value>> {
        ValueStore::read_value(self, hash)
    }
}

impl std::fmt::Debug for ValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueStore")
            .field("config", &self.inner.config)
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}

fn register_structs(inner: &Inner, value: &Value) -> ValueResult<()> {
    let mut types = Vec::new();
    value.walk_inline(&mut |v| {
        if let Value::Struct(s) = v {
            types.push(s.struct_type());
        }
    });
    if types.is_empty() {
        return Ok(());
    }
    let mut registry = inner.registry.write().map_err(poisoned)?;
    for t in types {
        registry.register(t);
    }
    Ok(())
}

fn read_value(inner: &Arc<Inner>, hash: &Hash) -> ValueResult<Option<Value>> {
    if let Some(v) = inner.cache.lock().map_err(poisoned)?.get(hash) {
        return Ok(Some(v.clone()));
    }
    let chunk = inner.bs.get(hash)?;
    if chunk.is_empty() {
        return Ok(None);
    }
    let reader: Arc<dyn ValueReader> = Arc::new(StoreReader {
        inner: Arc::downgrade(inner),
    });
    let value = codec::decode_chunk(&chunk, &reader)?;
    register_structs(inner, &value)?;
    inner.cache.lock().map_err(poisoned)?.put(*hash, value.clone());
    trace!(hash = %hash.short(), kind = %value.kind(), "decoded value");
    Ok(Some(value))
}

struct StoreReader {
    inner: Weak<Inner>,
}

impl ValueReader for StoreReader {
    fn read_value(&self, hash: &Hash) -> ValueResult<Option<Value>> {
        let inner = self.inner.upgrade().ok_or(ValueError::StoreClosed)?;
        if inner.closed.load(Ordering::Acquire) {
            return Err(ValueError::StoreClosed);
        }
        read_value(&inner, hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{List, Map, Set, Struct};

    fn store() -> ValueStore {
        ValueStore::new_memory()
    }

    #[test]
    fn write_then_read_primitive() {
        let vs = store();
        let r = vs.write_value(&Value::from("hello")).unwrap();
        assert_eq!(r.height(), 1);
        assert_eq!(vs.read_value(&r.target_hash()).unwrap(), Some(Value::from("hello")));
    }

    #[test]
    fn missing_value_reads_none() {
        let vs = store();
        assert_eq!(vs.read_value(&Hash::of(b"nothing")).unwrap(), None);
    }

    #[test]
    fn dangling_ref_is_rejected() {
        let vs = store();
        let unknown = Ref::new(&Value::from(12345));
        let err = vs.write_value(&Value::Ref(unknown)).unwrap_err();
        assert!(matches!(err, ValueError::DanglingRef(h) if h == unknown.target_hash()));

        let lenient = ValueStore::new(
            Arc::new(LocalBatchStore::new(MemoryStore::new())),
            ValueStoreConfig {
                validate_refs_on_write: false,
                ..ValueStoreConfig::default()
            },
        );
        assert!(lenient.write_value(&Value::Ref(unknown)).is_ok());
    }

    #[test]
    fn ref_to_written_value_is_accepted() {
        let vs = store();
        let r = vs.write_value(&Value::from(1)).unwrap();
        let outer = vs.write_value(&Value::Ref(r)).unwrap();
        assert_eq!(outer.height(), 2);
    }

    #[test]
    fn chunked_list_roundtrips_through_fresh_store() {
        let bs: Arc<dyn BatchStore> = Arc::new(LocalBatchStore::new(MemoryStore::new()));
        let writer = ValueStore::new(bs.clone(), ValueStoreConfig::default());
        let list = List::new((0..5000).map(Value::from).collect());
        assert!(list.sequence().is_meta());
        let r = writer.write_value(&Value::List(list.clone())).unwrap();
        writer.flush().unwrap();

        let reader = ValueStore::new(bs, ValueStoreConfig::default());
        let back = reader.read_value(&r.target_hash()).unwrap().unwrap();
        let back = back.as_list().unwrap();
        assert_eq!(back.len(), 5000);
        assert_eq!(back.get(4321).unwrap(), Value::from(4321));
        assert_eq!(back.to_vec().unwrap(), list.to_vec().unwrap());
    }

    #[test]
    fn edits_of_loaded_collections_write_only_new_nodes() {
        let vs = store();
        let map = Map::new((0..3000).map(|i| (Value::from(i), Value::from(i))).collect());
        let r = vs.write_value(&Value::Map(map)).unwrap();
        vs.flush().unwrap();

        let loaded = vs.read_value(&r.target_hash()).unwrap().unwrap();
        let edited = loaded
            .as_map()
            .unwrap()
            .set(Value::from(10), Value::from("ten"))
            .unwrap();
        let r2 = vs.write_value(&Value::Map(edited)).unwrap();
        vs.flush().unwrap();

        let back = vs.read_value(&r2.target_hash()).unwrap().unwrap();
        let back = back.as_map().unwrap();
        assert_eq!(back.get(&Value::from(10)).unwrap(), Some(Value::from("ten")));
        assert_eq!(back.get(&Value::from(2999)).unwrap(), Some(Value::from(2999)));
    }

    #[test]
    fn nested_collections_are_written() {
        let vs = store();
        let inner = Set::new((0..2000).map(Value::from).collect());
        assert!(inner.sequence().is_meta());
        let outer = Value::List(List::new(vec![Value::Set(inner.clone()), Value::from(1)]));
        let r = vs.write_value(&outer).unwrap();
        vs.flush().unwrap();

        let fresh = ValueStore::new(vs.batch_store().clone(), ValueStoreConfig::default());
        let back = fresh.read_value(&r.target_hash()).unwrap().unwrap();
        let nested = back.as_list().unwrap().get(0).unwrap();
        assert_eq!(nested.as_set().unwrap().len(), 2000);
        assert!(nested.as_set().unwrap().has(&Value::from(1999)).unwrap());
    }

    #[test]
    fn struct_types_are_registered() {
        let vs = store();
        assert!(vs.registry().unwrap().is_empty());
        let s = Struct::new("Point", vec![("x", Value::from(1)), ("y", Value::from(2))]).unwrap();
        vs.write_value(&Value::Struct(s.clone())).unwrap();
        let registry = vs.registry().unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&s.struct_type().hash()));
    }

    #[test]
    fn closed_store_rejects_operations() {
        let vs = store();
        let reader = vs.reader();
        vs.close().unwrap();
        assert!(matches!(vs.write_value(&Value::from(1)), Err(ValueError::StoreClosed)));
        assert!(matches!(vs.read_value(&Hash::of(b"x")), Err(ValueError::StoreClosed)));
        assert!(matches!(reader.read_value(&Hash::of(b"x")), Err(ValueError::StoreClosed)));
    }

    #[test]
    fn dropped_store_fails_lazy_loads() {
        let reader = store().reader();
        assert!(matches!(reader.read_value(&Hash::of(b"x")), Err(ValueError::StoreClosed)));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let cfg: ValueStoreConfig = serde_json::from_str(r#"{"cache_capacity": 8}"#).unwrap();
        assert_eq!(cfg.cache_capacity, 8);
        assert!(cfg.validate_refs_on_write);
    }
}
