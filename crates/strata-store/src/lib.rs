//! Chunk storage for Strata.
//!
//! A chunk store is a hash-keyed map of immutable byte buffers plus a single
//! mutable root pointer. Everything above this crate (sequences, values,
//! datasets) is expressed as chunks; the root pointer is the only state that
//! ever changes in place.
//!
//! # Interfaces
//!
//! - [`ChunkStore`] -- `get` / `has` / `put` of chunks
//! - [`RootTracker`] -- `root` / `update_root` with compare-and-swap semantics
//! - [`BatchStore`] -- buffered writes with an explicit `flush`
//!
//! # Backends
//!
//! - [`MemoryStore`] -- thread-safe `HashMap` store; clones share state
//! - [`LocalBatchStore`] -- adapts any `ChunkStore + RootTracker` into a
//!   [`BatchStore`]
//!
//! # Rules
//!
//! 1. Chunks are immutable; writing the same content twice is a no-op.
//! 2. Absent chunks read back as [`Chunk::empty`](strata_types::Chunk::empty).
//! 3. `update_root` is an atomic compare-and-swap.
//! 4. A batch store flushes every scheduled chunk before moving the root.

pub mod batch;
pub mod error;
pub mod memory;
pub mod traits;

pub use batch::LocalBatchStore;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use traits::{BatchStore, ChunkStore, Hints, RootTracker};
