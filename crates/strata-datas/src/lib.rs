//! Datasets and commits for Strata.
//!
//! A [`Database`] keeps a map from dataset id to the ref of that dataset's
//! head commit. The map is itself a value; the store root names it. A commit
//! is a struct holding a value, the set of its parent commits and a metadata
//! struct, so every dataset is a DAG of immutable history.
//!
//! # Commit protocol
//!
//! 1. Read the head of the dataset from the handle's snapshot of the root.
//! 2. Write the new commit. Its parents default to the current head.
//! 3. Check that the commit descends from the head
//!    ([`DatabaseError::MergeNeeded`] if not).
//! 4. Write the updated dataset map and compare-and-swap the store root
//!    ([`DatabaseError::OptimisticLockFailed`] if another writer moved it).
//!
//! [`Database::pull`] copies the chunks of another database's head that are
//! missing locally, then fast-forwards a local dataset to it under the same
//! descent and compare-and-swap checks.
//!
//! ```
//! use strata_datas::{CommitOptions, Database};
//! use strata_values::Value;
//!
//! let db = Database::new_memory().unwrap();
//! db.commit("notes", Value::from("hello"), CommitOptions::default()).unwrap();
//! assert_eq!(db.head_value("notes").unwrap(), Some(Value::from("hello")));
//! ```

pub mod ancestry;
pub mod commit;
pub mod config;
pub mod database;
pub mod dataset;
pub mod error;
pub mod ids;

pub use ancestry::{descends_from, find_common_ancestor};
pub use commit::{
    commit_meta, commit_parents, commit_type, commit_value, is_commit, new_commit,
    COMMIT_STRUCT_NAME,
};
pub use config::DatabaseConfig;
pub use database::{CommitOptions, Database};
pub use dataset::Dataset;
pub use error::{DatabaseError, DatabaseResult};
pub use ids::validate_dataset_id;
