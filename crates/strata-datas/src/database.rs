//! Named datasets over a value store.
//!
//! The store root names a `Map<String, Ref<Commit>>`. A [`Database`] handle
//! caches the root it last read; commits are checked against that snapshot
//! and published with a compare-and-swap on the store root, so a handle that
//! fell behind another writer fails with
//! [`DatabaseError::OptimisticLockFailed`] until it calls
//! [`Database::rebase`].

use std::sync::{Arc, Mutex, MutexGuard};

use strata_store::{BatchStore, LocalBatchStore, MemoryStore, StoreError};
use strata_types::Hash;
use strata_values::{copy_missing_chunks, Map, Ref, Struct, Value, ValueStore};
use tracing::{debug, info, warn};

use crate::ancestry::descends_from;
use crate::commit::{commit_value, load_commit, new_commit};
use crate::config::DatabaseConfig;
use crate::dataset::Dataset;
use crate::error::{DatabaseError, DatabaseResult};
use crate::ids::validate_dataset_id;

/// Options for [`Database::commit`].
#[derive(Clone, Debug, Default)]
pub struct CommitOptions {
    /// Parents of the new commit. Defaults to the current head, if any.
    pub parents: Option<Vec<Ref>>,
    /// Metadata struct stored in the commit. Defaults to an empty struct.
    pub meta: Option<Struct>,
}

#[derive(Clone)]
struct Snapshot {
    root: Hash,
    datasets: Map,
}

pub struct Database {
    vs: ValueStore,
    config: DatabaseConfig,
    snapshot: Mutex<Snapshot>,
}

fn poisoned<E: std::fmt::Display>(e: E) -> DatabaseError {
    DatabaseError::Store(StoreError::LockPoisoned(e.to_string()))
}

impl Database {
    /// Open a database on `bs`, reading its current root.
    pub fn new(bs: Arc<dyn BatchStore>, config: DatabaseConfig) -> DatabaseResult<Self> {
        let vs = ValueStore::new(bs, config.value_store.clone());
        let snapshot = load_snapshot(&vs)?;
        debug!(root = %snapshot.root, "opened database");
        Ok(Self {
            vs,
            config,
            snapshot: Mutex::new(snapshot),
        })
    }

    /// A database over a fresh in-memory store.
    pub fn new_memory() -> DatabaseResult<Self> {
        Self::new(
            Arc::new(LocalBatchStore::new(MemoryStore::new())),
            DatabaseConfig::default(),
        )
    }

    /// The settings this database was opened with.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// The value store all reads and writes go through.
    pub fn value_store(&self) -> &ValueStore {
        &self.vs
    }

    fn lock(&self) -> DatabaseResult<MutexGuard<'_, Snapshot>> {
        self.snapshot.lock().map_err(poisoned)
    }

    fn current(&self) -> DatabaseResult<Snapshot> {
        Ok(self.lock()?.clone())
    }

    /// The root hash this handle last read or wrote.
    pub fn root(&self) -> DatabaseResult<Hash> {
        Ok(self.lock()?.root)
    }

    /// Dataset id to head commit ref, as of this handle's snapshot.
    pub fn datasets(&self) -> DatabaseResult<Map> {
        Ok(self.current()?.datasets)
    }

    /// Re-read the store root, picking up commits made through other handles.
    pub fn rebase(&self) -> DatabaseResult<()> {
        let fresh = load_snapshot(&self.vs)?;
        let mut guard = self.lock()?;
        if guard.root != fresh.root {
            debug!(from = %guard.root, to = %fresh.root, "rebased");
        }
        *guard = fresh;
        Ok(())
    }

    /// Ref to the head commit of `id`, if the dataset exists.
    pub fn head_ref(&self, id: &str) -> DatabaseResult<Option<Ref>> {
        head_ref_in(&self.current()?.datasets, id)
    }

    /// The head commit of `id`, if the dataset exists.
    pub fn head(&self, id: &str) -> DatabaseResult<Option<Struct>> {
        match self.head_ref(id)? {
            Some(r) => Ok(Some(load_commit(&self.vs, &r)?)),
            None => Ok(None),
        }
    }

    /// The value of the head commit of `id`.
    pub fn head_value(&self, id: &str) -> DatabaseResult<Option<Value>> {
        match self.head(id)? {
            Some(c) => Ok(Some(commit_value(&c)?)),
            None => Ok(None),
        }
    }

    /// A handle on dataset `id`. The dataset need not exist yet.
    pub fn dataset(&self, id: &str) -> DatabaseResult<Dataset<'_>> {
        validate_dataset_id(id)?;
        Ok(Dataset::new(self, id.to_string()))
    }

    /// Commit `value` to dataset `id` and move its head to the new commit.
    ///
    /// The new commit must descend from the current head, otherwise this
    /// fails with [`DatabaseError::MergeNeeded`]. Committing a commit equal
    /// to the current head changes nothing.
    pub fn commit(&self, id: &str, value: Value, opts: CommitOptions) -> DatabaseResult<Struct> {
        validate_dataset_id(id)?;
        let snapshot = self.current()?;
        let head = head_ref_in(&snapshot.datasets, id)?;

        let parents = match opts.parents {
            Some(p) => p,
            None => head.into_iter().collect(),
        };
        let commit = new_commit(value, parents, opts.meta)?;
        let commit_ref = self.vs.write_value(&Value::Struct(commit.clone()))?;
        self.advance_head(id, &snapshot, head, &commit, commit_ref)?;
        Ok(commit)
    }

    /// Point dataset `id` at an existing commit. The same descent rule as
    /// [`Database::commit`] applies.
    pub fn set_head(&self, id: &str, commit_ref: Ref) -> DatabaseResult<Struct> {
        validate_dataset_id(id)?;
        let snapshot = self.current()?;
        let head = head_ref_in(&snapshot.datasets, id)?;
        let commit = load_commit(&self.vs, &commit_ref)?;
        self.advance_head(id, &snapshot, head, &commit, commit_ref)?;
        Ok(commit)
    }

    /// Bring dataset `id` up to the head of `source_id` in `source`.
    ///
    /// Chunks reachable from the source head are copied until one the sink
    /// already has is reached, then the head moves as in
    /// [`Database::set_head`]. Returns the new head, or `None` when the
    /// source dataset does not exist.
    pub fn pull(&self, source: &Database, source_id: &str, id: &str) -> DatabaseResult<Option<Struct>> {
        validate_dataset_id(source_id)?;
        validate_dataset_id(id)?;
        let Some(source_head) = source.head_ref(source_id)? else {
            return Ok(None);
        };
        if let Some(head) = self.head_ref(id)? {
            if head.target_hash() == source_head.target_hash() {
                debug!(dataset = %id, "already up to date");
                return self.head(id);
            }
        }
        let copied = copy_missing_chunks(source.value_store(), &self.vs, &source_head)?;
        debug!(dataset = %id, source = %source_id, copied, "pulled chunks");
        self.set_head(id, source_head).map(Some)
    }

    fn advance_head(
        &self,
        id: &str,
        snapshot: &Snapshot,
        head: Option<Ref>,
        commit: &Struct,
        commit_ref: Ref,
    ) -> DatabaseResult<()> {
        if let Some(head) = head {
            if head.target_hash() == commit_ref.target_hash() {
                debug!(dataset = %id, hash = %head.target_hash(), "commit equals head");
                return Ok(());
            }
            if !descends_from(&self.vs, commit, &head)? {
                warn!(dataset = %id, head = %head.target_hash(), "commit does not descend from head");
                return Err(DatabaseError::MergeNeeded {
                    dataset: id.to_string(),
                });
            }
        }

        let datasets = snapshot
            .datasets
            .set(Value::from(id), Value::Ref(commit_ref))?;
        self.swap_root(id, snapshot, datasets)?;
        info!(dataset = %id, hash = %commit_ref.target_hash(), height = commit_ref.height(), "committed");
        Ok(())
    }

    /// Remove dataset `id`. Removing an absent dataset is a no-op.
    pub fn delete(&self, id: &str) -> DatabaseResult<()> {
        validate_dataset_id(id)?;
        let snapshot = self.current()?;
        let key = Value::from(id);
        if !snapshot.datasets.has(&key)? {
            return Ok(());
        }
        let datasets = snapshot.datasets.remove(&key)?;
        self.swap_root(id, &snapshot, datasets)?;
        info!(dataset = %id, "deleted dataset");
        Ok(())
    }

    fn swap_root(&self, id: &str, snapshot: &Snapshot, datasets: Map) -> DatabaseResult<()> {
        let new_root = self.vs.write_value(&Value::Map(datasets.clone()))?.target_hash();
        self.vs.flush()?;
        if !self.vs.batch_store().update_root(new_root, snapshot.root)? {
            warn!(dataset = %id, expected = %snapshot.root, "root moved concurrently");
            return Err(DatabaseError::OptimisticLockFailed {
                dataset: id.to_string(),
            });
        }
        *self.lock()? = Snapshot {
            root: new_root,
            datasets,
        };
        Ok(())
    }

    /// Read any value stored in this database.
    pub fn read_value(&self, hash: &Hash) -> DatabaseResult<Option<Value>> {
        Ok(self.vs.read_value(hash)?)
    }

    /// Write a value without committing it.
    pub fn write_value(&self, value: &Value) -> DatabaseResult<Ref> {
        Ok(self.vs.write_value(value)?)
    }

    /// Make every written value durable.
    pub fn flush(&self) -> DatabaseResult<()> {
        Ok(self.vs.flush()?)
    }

    /// Flush and close the underlying store.
    pub fn close(&self) -> DatabaseResult<()> {
        Ok(self.vs.close()?)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let root = self.root().map(|h| h.to_string()).unwrap_or_default();
        f.debug_struct("Database").field("root", &root).finish()
    }
}

fn load_snapshot(vs: &ValueStore) -> DatabaseResult<Snapshot> {
    let root = vs.batch_store().root()?;
    if root.is_empty() {
        return Ok(Snapshot {
            root,
            datasets: Map::empty(),
        });
    }
    match vs.read_value(&root)? {
        Some(Value::Map(datasets)) => Ok(Snapshot { root, datasets }),
        Some(other) => Err(DatabaseError::CorruptRoot {
            root,
            reason: format!("expected a map, found {}", other.kind().name()),
        }),
        None => Err(DatabaseError::CorruptRoot {
            root,
            reason: "root chunk is missing".to_string(),
        }),
    }
}

fn head_ref_in(datasets: &Map, id: &str) -> DatabaseResult<Option<Ref>> {
    match datasets.get(&Value::from(id))? {
        Some(Value::Ref(r)) => Ok(Some(r)),
        Some(other) => Err(DatabaseError::NotACommit(other.hash())),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::commit_parents;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn parents(p: &[Ref]) -> CommitOptions {
        CommitOptions {
            parents: Some(p.to_vec()),
            meta: None,
        }
    }

    fn commit_ref(c: &Struct) -> Ref {
        Ref::new(&Value::Struct(c.clone()))
    }

    // ----------------------------------------------------------------
    // Heads
    // ----------------------------------------------------------------

    #[test]
    fn new_database_is_empty() {
        let db = Database::new_memory().unwrap();
        assert!(db.datasets().unwrap().is_empty());
        assert!(db.head("ds1").unwrap().is_none());
        assert!(db.head_value("ds1").unwrap().is_none());
        assert!(db.root().unwrap().is_empty());
    }

    #[test]
    fn commit_moves_head() {
        init_tracing();
        let db = Database::new_memory().unwrap();
        let a = db.commit("ds1", Value::from("a"), CommitOptions::default()).unwrap();
        assert_eq!(db.head("ds1").unwrap(), Some(a.clone()));
        assert_eq!(db.head_value("ds1").unwrap(), Some(Value::from("a")));
        assert!(commit_parents(&a).unwrap().is_empty());

        let b = db.commit("ds1", Value::from("b"), CommitOptions::default()).unwrap();
        assert_eq!(commit_parents(&b).unwrap(), vec![commit_ref(&a)]);
        assert_eq!(db.head_value("ds1").unwrap(), Some(Value::from("b")));
        assert_eq!(db.datasets().unwrap().len(), 1);
    }

    #[test]
    fn datasets_are_independent() {
        let db = Database::new_memory().unwrap();
        db.commit("one", Value::from(1), CommitOptions::default()).unwrap();
        db.commit("two", Value::from(2), CommitOptions::default()).unwrap();
        assert_eq!(db.head_value("one").unwrap(), Some(Value::from(1)));
        assert_eq!(db.head_value("two").unwrap(), Some(Value::from(2)));
        assert_eq!(db.datasets().unwrap().len(), 2);
    }

    #[test]
    fn commit_with_meta() {
        let db = Database::new_memory().unwrap();
        let meta = Struct::new("Meta", [("message", Value::from("first"))]).unwrap();
        let opts = CommitOptions {
            parents: None,
            meta: Some(meta.clone()),
        };
        let c = db.commit("ds", Value::from(1), opts).unwrap();
        assert_eq!(crate::commit::commit_meta(&c).unwrap(), meta);
    }

    // ----------------------------------------------------------------
    // Descent
    // ----------------------------------------------------------------

    #[test]
    fn commit_off_stale_parent_needs_merge() {
        init_tracing();
        let db = Database::new_memory().unwrap();
        let a = db.commit("ds1", Value::from("a"), parents(&[])).unwrap();
        let a_ref = commit_ref(&a);
        db.commit("ds1", Value::from("b"), parents(&[a_ref])).unwrap();

        let err = db
            .commit("ds1", Value::from("c"), parents(&[a_ref]))
            .unwrap_err();
        assert!(matches!(err, DatabaseError::MergeNeeded { .. }));
        assert!(err.needs_rebase());
        assert_eq!(db.head_value("ds1").unwrap(), Some(Value::from("b")));
    }

    #[test]
    fn root_commit_over_existing_head_needs_merge() {
        let db = Database::new_memory().unwrap();
        db.commit("ds", Value::from(1), CommitOptions::default()).unwrap();
        let err = db.commit("ds", Value::from(2), parents(&[])).unwrap_err();
        assert!(matches!(err, DatabaseError::MergeNeeded { .. }));
    }

    #[test]
    fn recommitting_head_is_a_no_op() {
        let db = Database::new_memory().unwrap();
        let a = db.commit("ds", Value::from(1), parents(&[])).unwrap();
        let root = db.root().unwrap();
        let again = db.commit("ds", Value::from(1), parents(&[])).unwrap();
        assert_eq!(again, a);
        assert_eq!(db.root().unwrap(), root);
    }

    #[test]
    fn merge_commit_is_accepted() {
        let db = Database::new_memory().unwrap();
        let base = db.commit("main", Value::from(0), CommitOptions::default()).unwrap();
        let base_ref = commit_ref(&base);
        let side = db.commit("side", Value::from(1), parents(&[base_ref])).unwrap();
        let head = commit_ref(&db.head("main").unwrap().unwrap());
        let merged = db
            .commit("main", Value::from(2), parents(&[head, commit_ref(&side)]))
            .unwrap();
        assert_eq!(commit_parents(&merged).unwrap().len(), 2);
        assert_eq!(db.head_value("main").unwrap(), Some(Value::from(2)));
    }

    // ----------------------------------------------------------------
    // Concurrency
    // ----------------------------------------------------------------

    fn open(store: &MemoryStore) -> Database {
        Database::new(
            Arc::new(LocalBatchStore::new(store.clone())),
            DatabaseConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn stale_handle_fails_optimistic_lock() {
        init_tracing();
        let store = MemoryStore::new();
        let first = open(&store);
        first.commit("ds1", Value::from("h"), CommitOptions::default()).unwrap();

        let second = open(&store);
        assert_eq!(second.head_value("ds1").unwrap(), Some(Value::from("h")));

        first.commit("ds1", Value::from("x"), CommitOptions::default()).unwrap();
        let err = second
            .commit("ds1", Value::from("y"), CommitOptions::default())
            .unwrap_err();
        assert!(matches!(err, DatabaseError::OptimisticLockFailed { .. }));
        assert!(err.is_retryable());

        second.rebase().unwrap();
        assert_eq!(second.head_value("ds1").unwrap(), Some(Value::from("x")));
        second.commit("ds1", Value::from("y"), CommitOptions::default()).unwrap();

        first.rebase().unwrap();
        assert_eq!(first.head_value("ds1").unwrap(), Some(Value::from("y")));
    }

    #[test]
    fn other_dataset_write_still_moves_root() {
        let store = MemoryStore::new();
        let first = open(&store);
        let second = open(&store);
        first.commit("a", Value::from(1), CommitOptions::default()).unwrap();
        let err = second
            .commit("b", Value::from(2), CommitOptions::default())
            .unwrap_err();
        assert!(matches!(err, DatabaseError::OptimisticLockFailed { .. }));

        second.rebase().unwrap();
        second.commit("b", Value::from(2), CommitOptions::default()).unwrap();
        assert_eq!(second.datasets().unwrap().len(), 2);
    }

    #[test]
    fn reopen_sees_committed_state() {
        let store = MemoryStore::new();
        {
            let db = open(&store);
            db.commit("ds", Value::from("kept"), CommitOptions::default()).unwrap();
        }
        let db = open(&store);
        assert_eq!(db.head_value("ds").unwrap(), Some(Value::from("kept")));
    }

    // ----------------------------------------------------------------
    // Pull
    // ----------------------------------------------------------------

    #[test]
    fn pull_copies_history_and_fast_forwards() {
        init_tracing();
        let source_store = MemoryStore::new();
        let sink_store = MemoryStore::new();
        let source = open(&source_store);
        let sink = open(&sink_store);

        let list = Value::List(strata_values::List::new((0..3000).map(Value::from).collect()));
        source.commit("ds", Value::from("first"), CommitOptions::default()).unwrap();
        source.commit("ds", list.clone(), CommitOptions::default()).unwrap();

        let head = sink.pull(&source, "ds", "ds").unwrap().unwrap();
        assert_eq!(commit_value(&head).unwrap(), list);
        assert_eq!(sink.head_ref("ds").unwrap(), source.head_ref("ds").unwrap());

        // History came along.
        let parent = commit_parents(&head).unwrap()[0];
        assert_eq!(
            commit_value(&load_commit(sink.value_store(), &parent).unwrap()).unwrap(),
            Value::from("first")
        );

        let before = sink_store.len();
        source.commit("ds", Value::from("third"), CommitOptions::default()).unwrap();
        sink.pull(&source, "ds", "ds").unwrap();
        assert_eq!(sink.head_value("ds").unwrap(), Some(Value::from("third")));
        assert!(sink_store.len() - before < 10);
    }

    #[test]
    fn pull_into_another_dataset_name() {
        let source = Database::new_memory().unwrap();
        let sink = Database::new_memory().unwrap();
        source.commit("upstream", Value::from(7), CommitOptions::default()).unwrap();
        sink.pull(&source, "upstream", "mirror").unwrap();
        assert_eq!(sink.head_value("mirror").unwrap(), Some(Value::from(7)));
        assert!(sink.head("upstream").unwrap().is_none());
    }

    #[test]
    fn pull_up_to_date_and_missing() {
        let source = Database::new_memory().unwrap();
        let sink = Database::new_memory().unwrap();
        assert!(sink.pull(&source, "ds", "ds").unwrap().is_none());

        source.commit("ds", Value::from(1), CommitOptions::default()).unwrap();
        sink.pull(&source, "ds", "ds").unwrap();
        let root = sink.root().unwrap();
        sink.pull(&source, "ds", "ds").unwrap();
        assert_eq!(sink.root().unwrap(), root);
    }

    #[test]
    fn pull_over_diverged_head_needs_merge() {
        let source = Database::new_memory().unwrap();
        let sink = Database::new_memory().unwrap();
        source.commit("ds", Value::from(1), CommitOptions::default()).unwrap();
        sink.pull(&source, "ds", "ds").unwrap();

        sink.commit("ds", Value::from("local"), CommitOptions::default()).unwrap();
        source.commit("ds", Value::from("remote"), CommitOptions::default()).unwrap();
        let err = sink.pull(&source, "ds", "ds").unwrap_err();
        assert!(matches!(err, DatabaseError::MergeNeeded { .. }));
        assert_eq!(sink.head_value("ds").unwrap(), Some(Value::from("local")));
    }

    #[test]
    fn set_head_rejects_non_commits() {
        let db = Database::new_memory().unwrap();
        let r = db.write_value(&Value::from("plain")).unwrap();
        assert!(matches!(
            db.set_head("ds", r),
            Err(DatabaseError::NotACommit(_))
        ));
    }

    // ----------------------------------------------------------------
    // Delete and ids
    // ----------------------------------------------------------------

    #[test]
    fn delete_dataset() {
        let db = Database::new_memory().unwrap();
        db.commit("gone", Value::from(1), CommitOptions::default()).unwrap();
        db.commit("kept", Value::from(2), CommitOptions::default()).unwrap();
        db.delete("gone").unwrap();
        assert!(db.head("gone").unwrap().is_none());
        assert_eq!(db.head_value("kept").unwrap(), Some(Value::from(2)));

        let root = db.root().unwrap();
        db.delete("gone").unwrap();
        assert_eq!(db.root().unwrap(), root);
    }

    #[test]
    fn invalid_ids_are_rejected() {
        let db = Database::new_memory().unwrap();
        for id in ["", "has space", "dots.not.ok", "ümlaut"] {
            let err = db
                .commit(id, Value::from(1), CommitOptions::default())
                .unwrap_err();
            assert!(matches!(err, DatabaseError::InvalidDatasetId { .. }), "{id:?}");
        }
        assert!(db.dataset("ok/path-1_x").is_ok());
        assert!(db.delete("bad id").is_err());
    }

    #[test]
    fn corrupt_root_is_reported() {
        let store = MemoryStore::new();
        let vs = ValueStore::new(
            Arc::new(LocalBatchStore::new(store.clone())),
            Default::default(),
        );
        let r = vs.write_value(&Value::from("not a map")).unwrap();
        vs.flush().unwrap();
        assert!(vs
            .batch_store()
            .update_root(r.target_hash(), Hash::empty())
            .unwrap());

        let err = Database::new(
            Arc::new(LocalBatchStore::new(store)),
            DatabaseConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DatabaseError::CorruptRoot { .. }));
    }

    #[test]
    fn values_round_trip_through_database() {
        let db = Database::new_memory().unwrap();
        let list = Value::List(strata_values::List::new((0..100).map(Value::from).collect()));
        let r = db.write_value(&list).unwrap();
        db.flush().unwrap();
        assert_eq!(db.read_value(&r.target_hash()).unwrap(), Some(list));
    }
}
