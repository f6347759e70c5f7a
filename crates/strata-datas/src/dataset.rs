use strata_values::{Ref, Struct, Value};

use crate::database::{CommitOptions, Database};
use crate::error::DatabaseResult;

/// A named line of history in a [`Database`].
#[derive(Debug)]
pub struct Dataset<'a> {
    db: &'a Database,
    id: String,
}

impl<'a> Dataset<'a> {
    pub(crate) fn new(db: &'a Database, id: String) -> Self {
        Self { db, id }
    }

    /// The dataset id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The database this dataset lives in.
    pub fn database(&self) -> &'a Database {
        self.db
    }

    /// The head commit, if anything was committed.
    pub fn head(&self) -> DatabaseResult<Option<Struct>> {
        self.db.head(&self.id)
    }

    /// Ref to the head commit.
    pub fn head_ref(&self) -> DatabaseResult<Option<Ref>> {
        self.db.head_ref(&self.id)
    }

    /// The value of the head commit.
    pub fn head_value(&self) -> DatabaseResult<Option<Value>> {
        self.db.head_value(&self.id)
    }

    /// Commit `value` on top of the current head.
    pub fn commit(&self, value: Value) -> DatabaseResult<Struct> {
        self.db.commit(&self.id, value, CommitOptions::default())
    }

    /// Commit `value` with explicit parents.
    pub fn commit_with_parents(&self, value: Value, parents: Vec<Ref>) -> DatabaseResult<Struct> {
        self.db.commit(
            &self.id,
            value,
            CommitOptions {
                parents: Some(parents),
                meta: None,
            },
        )
    }

    /// Copy `source`'s history into this dataset's database and move the
    /// head to the source head.
    pub fn pull(&self, source: &Dataset<'_>) -> DatabaseResult<Option<Struct>> {
        self.db.pull(source.db, &source.id, &self.id)
    }
}
