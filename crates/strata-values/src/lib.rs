//! The Strata value model.
//!
//! Values are immutable and content addressed: a value's identity is the
//! SHA-1 of its encoding. Collections (lists, sets, maps and blobs) are
//! probabilistic B-trees ("prolly trees"): their items are split into chunks
//! at content-defined boundaries, so two collections with equal contents
//! always have the same tree, and an edit rewrites only the nodes on the path
//! to the change.
//!
//! # Layers
//!
//! - [`rolling_hash`] -- boundary decisions over a sliding window of items
//! - [`sequence`] -- tree nodes; leaves hold items, meta nodes hold
//!   [`MetaTuple`]s pointing at children
//! - [`cursor`] -- positions in a tree, with lazy child loading
//! - [`chunker`] -- building trees and editing them in place
//! - [`sequence_diff`] -- top-down diffs that skip shared subtrees
//! - [`List`], [`Set`], [`Map`], [`Blob`] -- the collections
//! - [`ValueStore`] -- encoding to chunks, caching and type registry
//! - [`walk`] -- reachability over stored chunks and copying between stores
//!
//! # Example
//!
//! ```
//! use strata_values::{List, Value, ValueStore};
//!
//! let store = ValueStore::new_memory();
//! let list = List::new((0..10).map(Value::from).collect());
//! let edited = list.set(3, Value::from("three")).unwrap();
//! let r = store.write_value(&Value::List(edited)).unwrap();
//! let back = store.read_value(&r.target_hash()).unwrap().unwrap();
//! assert_eq!(back.as_list().unwrap().get(3).unwrap(), Value::from("three"));
//! ```

pub mod blob;
pub mod chunker;
pub mod codec;
pub mod cursor;
pub mod error;
pub mod list;
pub mod map;
pub mod ordered_key;
pub mod ref_value;
pub mod rolling_hash;
pub mod sequence;
pub mod sequence_diff;
pub mod set;
pub mod struct_value;
pub mod types;
pub mod value;
pub mod value_store;
pub mod walk;

pub use blob::{Blob, BlobReader};
pub use error::{ValueError, ValueResult};
pub use list::{List, ListIter};
pub use map::{Map, MapIter};
pub use ordered_key::OrderedKey;
pub use ref_value::Ref;
pub use sequence::{CollectionKind, MetaTuple, Sequence};
pub use sequence_diff::{DiffChangeType, OrderedDiff, ValueChanged};
pub use set::{Set, SetIter};
pub use struct_value::Struct;
pub use types::{StructType, Type, TypeRegistry};
pub use value::{Value, ValueKind};
pub use value_store::{ValueReader, ValueStore, ValueStoreConfig};
pub use walk::{copy_missing_chunks, walk_reachable};

pub use strata_diff::Splice;
