//! Tree nodes of chunked collections.
//!
//! A collection is a tree of [`Sequence`]s. Leaf sequences (level 0) hold the
//! collection's items; meta sequences (level > 0) hold [`MetaTuple`]s, one
//! per child node, each summarizing its subtree by a key and a leaf count.
//! Every node is stored as its own chunk.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use strata_types::Hash;

use crate::codec;
use crate::error::{ValueError, ValueResult};
use crate::ordered_key::OrderedKey;
use crate::ref_value::Ref;
use crate::value::Value;
use crate::value_store::ValueReader;

/// Which collection a sequence belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionKind {
    Blob,
    List,
    Set,
    Map,
}

impl CollectionKind {
    /// Ordered collections are keyed (sets, maps); the others are indexed.
    pub fn is_ordered(self) -> bool {
        matches!(self, CollectionKind::Set | CollectionKind::Map)
    }

    pub fn name(self) -> &'static str {
        match self {
            CollectionKind::Blob => "Blob",
            CollectionKind::List => "List",
            CollectionKind::Set => "Set",
            CollectionKind::Map => "Map",
        }
    }
}

/// One element of a sequence as seen by cursors and the chunker.
#[derive(Clone, Debug)]
pub enum SequenceItem {
    Byte(u8),
    Value(Value),
    Entry(Value, Value),
    Tuple(MetaTuple),
}

impl SequenceItem {
    /// Identity used when comparing items of two sequences.
    pub fn id(&self) -> ItemId {
        match self {
            SequenceItem::Byte(b) => ItemId::Byte(*b),
            SequenceItem::Value(v) => ItemId::Value(v.hash()),
            SequenceItem::Entry(k, v) => ItemId::Entry(k.hash(), v.hash()),
            SequenceItem::Tuple(t) => ItemId::Child(t.target().target_hash()),
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            SequenceItem::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_entry(self) -> Option<(Value, Value)> {
        match self {
            SequenceItem::Entry(k, v) => Some((k, v)),
            _ => None,
        }
    }

    pub fn into_tuple(self) -> Option<MetaTuple> {
        match self {
            SequenceItem::Tuple(t) => Some(t),
            _ => None,
        }
    }
}

/// Comparable identity of a sequence item; equal ids mean equal items.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ItemId {
    Byte(u8),
    Value(Hash),
    Entry(Hash, Hash),
    Child(Hash),
}

/// Items of a sequence, by representation.
#[derive(Clone, Debug)]
pub enum SequenceItems {
    Bytes(Vec<u8>),
    Values(Vec<Value>),
    Entries(Vec<(Value, Value)>),
    Tuples(Vec<MetaTuple>),
}

/// An immutable tree node. Cloning shares the node.
#[derive(Clone)]
pub struct Sequence(Arc<SequenceData>);

struct SequenceData {
    kind: CollectionKind,
    level: u32,
    items: SequenceItems,
    hash: OnceLock<Hash>,
    cumulative: OnceLock<Vec<u64>>,
}

impl Sequence {
    fn build(kind: CollectionKind, level: u32, items: SequenceItems) -> Self {
        Self(Arc::new(SequenceData {
            kind,
            level,
            items,
            hash: OnceLock::new(),
            cumulative: OnceLock::new(),
        }))
    }

    /// An empty leaf of `kind`.
    pub fn empty(kind: CollectionKind) -> Self {
        Self::leaf(kind, Vec::new())
    }

    /// A blob leaf holding `bytes`.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::build(CollectionKind::Blob, 0, SequenceItems::Bytes(bytes))
    }

    /// A list or set leaf holding `values`.
    pub fn from_values(kind: CollectionKind, values: Vec<Value>) -> Self {
        debug_assert!(matches!(kind, CollectionKind::List | CollectionKind::Set));
        Self::build(kind, 0, SequenceItems::Values(values))
    }

    /// A map leaf holding `entries`.
    pub fn from_entries(entries: Vec<(Value, Value)>) -> Self {
        Self::build(CollectionKind::Map, 0, SequenceItems::Entries(entries))
    }

    /// A meta node at `level` over `tuples`.
    pub fn meta(kind: CollectionKind, level: u32, tuples: Vec<MetaTuple>) -> Self {
        debug_assert!(level > 0);
        Self::build(kind, level, SequenceItems::Tuples(tuples))
    }

    /// Leaf sequence from chunker items. Items of the wrong shape for `kind`
    /// are dropped.
    pub fn leaf(kind: CollectionKind, items: Vec<SequenceItem>) -> Self {
        match kind {
            CollectionKind::Blob => Self::from_bytes(
                items
                    .into_iter()
                    .filter_map(|i| match i {
                        SequenceItem::Byte(b) => Some(b),
                        _ => None,
                    })
                    .collect(),
            ),
            CollectionKind::List | CollectionKind::Set => Self::from_values(
                kind,
                items.into_iter().filter_map(SequenceItem::into_value).collect(),
            ),
            CollectionKind::Map => Self::from_entries(
                items.into_iter().filter_map(SequenceItem::into_entry).collect(),
            ),
        }
    }

    /// Node at `level` built from chunker items.
    pub fn from_items(kind: CollectionKind, level: u32, items: Vec<SequenceItem>) -> Self {
        if level == 0 {
            Self::leaf(kind, items)
        } else {
            Self::meta(
                kind,
                level,
                items.into_iter().filter_map(SequenceItem::into_tuple).collect(),
            )
        }
    }

    /// The collection this node belongs to.
    pub fn kind(&self) -> CollectionKind {
        self.0.kind
    }

    /// Distance from the leaves; 0 for leaf sequences.
    pub fn level(&self) -> u32 {
        self.0.level
    }

    /// Whether this node holds meta tuples.
    pub fn is_meta(&self) -> bool {
        matches!(self.0.items, SequenceItems::Tuples(_))
    }

    pub fn is_leaf(&self) -> bool {
        !self.is_meta()
    }

    /// The items of this node.
    pub fn items(&self) -> &SequenceItems {
        &self.0.items
    }

    /// Number of items in this node.
    pub fn len(&self) -> usize {
        match &self.0.items {
            SequenceItems::Bytes(b) => b.len(),
            SequenceItems::Values(v) => v.len(),
            SequenceItems::Entries(e) => e.len(),
            SequenceItems::Tuples(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Item at `idx`. Panics if out of range.
    pub fn item(&self, idx: usize) -> SequenceItem {
        match &self.0.items {
            SequenceItems::Bytes(b) => SequenceItem::Byte(b[idx]),
            SequenceItems::Values(v) => SequenceItem::Value(v[idx].clone()),
            SequenceItems::Entries(e) => SequenceItem::Entry(e[idx].0.clone(), e[idx].1.clone()),
            SequenceItems::Tuples(t) => SequenceItem::Tuple(t[idx].clone()),
        }
    }

    /// Identity of the item at `idx`, for edit scripts.
    pub fn item_id(&self, idx: usize) -> ItemId {
        match &self.0.items {
            SequenceItems::Bytes(b) => ItemId::Byte(b[idx]),
            SequenceItems::Values(v) => ItemId::Value(v[idx].hash()),
            SequenceItems::Entries(e) => ItemId::Entry(e[idx].0.hash(), e[idx].1.hash()),
            SequenceItems::Tuples(t) => ItemId::Child(t[idx].target().target_hash()),
        }
    }

    /// Identities of all items, in order.
    pub fn item_ids(&self) -> Vec<ItemId> {
        (0..self.len()).map(|i| self.item_id(i)).collect()
    }

    /// The meta tuples of this node; empty for leaves.
    pub fn tuples(&self) -> &[MetaTuple] {
        match &self.0.items {
            SequenceItems::Tuples(t) => t,
            _ => &[],
        }
    }

    /// The bytes of a blob leaf.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.0.items {
            SequenceItems::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Ordering key of item `idx`: the element (set), the entry key (map) or
    /// the tuple key (meta). Indexed leaves are keyed by position.
    pub fn key(&self, idx: usize) -> OrderedKey {
        match &self.0.items {
            SequenceItems::Values(v) if self.0.kind.is_ordered() => OrderedKey::of(&v[idx]),
            SequenceItems::Entries(e) => OrderedKey::of(&e[idx].0),
            SequenceItems::Tuples(t) => t[idx].key().clone(),
            _ => OrderedKey::count(idx as u64),
        }
    }

    /// The value identifying item `idx` in an ordered diff: the element of a
    /// set, or the key of a map entry.
    pub fn key_value(&self, idx: usize) -> Option<Value> {
        match &self.0.items {
            SequenceItems::Values(v) => Some(v[idx].clone()),
            SequenceItems::Entries(e) => Some(e[idx].0.clone()),
            _ => None,
        }
    }

    /// Number of leaf items in the subtree.
    pub fn num_leaves(&self) -> u64 {
        match &self.0.items {
            SequenceItems::Tuples(_) => self.cumulative().last().copied().unwrap_or(0),
            _ => self.len() as u64,
        }
    }

    /// Leaf items in the subtrees of items `0..=idx`.
    pub fn cumulative_leaves(&self, idx: usize) -> u64 {
        match &self.0.items {
            SequenceItems::Tuples(_) => self.cumulative()[idx],
            _ => idx as u64 + 1,
        }
    }

    fn cumulative(&self) -> &[u64] {
        self.0.cumulative.get_or_init(|| {
            let mut sum = 0;
            self.tuples()
                .iter()
                .map(|t| {
                    sum += t.num_leaves();
                    sum
                })
                .collect()
        })
    }

    /// Child node `idx` of a meta sequence, loading it if needed.
    pub fn child(&self, idx: usize) -> ValueResult<Option<Sequence>> {
        match self.tuples().get(idx) {
            Some(t) => t.child().map(Some),
            None => Ok(None),
        }
    }

    /// One node at `level - 1` holding the concatenated items of children
    /// `start..start + len`.
    pub fn composite_child(&self, start: u64, len: u64) -> ValueResult<Sequence> {
        debug_assert!(self.is_meta());
        let kind = self.0.kind;
        let level = self.0.level.saturating_sub(1);
        let mut items = Vec::new();
        for idx in start..start + len {
            if let Some(child) = self.child(idx as usize)? {
                items.extend((0..child.len()).map(|i| child.item(i)));
            }
        }
        Ok(Sequence::from_items(kind, level, items))
    }

    /// Hash of the collection value rooted at this node.
    pub fn hash(&self) -> Hash {
        *self
            .0
            .hash
            .get_or_init(|| Hash::of(&codec::encode_sequence(self)))
    }

    pub(crate) fn prime_hash(&self, hash: Hash) {
        let _ = self.0.hash.set(hash);
    }

    /// Whether two handles share one node.
    pub fn ptr_eq(&self, other: &Sequence) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Wrap this node in the collection value of its kind.
    pub fn to_value(&self) -> Value {
        Value::from_sequence(self.clone())
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("kind", &self.0.kind)
            .field("level", &self.0.level)
            .field("len", &self.len())
            .finish()
    }
}

/// Child pointer of a meta sequence.
#[derive(Clone)]
pub enum ChildSequence {
    /// The child node is in memory (freshly built or already loaded).
    Resolved(Sequence),
    /// The child lives in a store and is loaded on first access.
    Unresolved {
        reader: Arc<dyn ValueReader>,
        loaded: Arc<OnceLock<Sequence>>,
    },
}

/// Entry of a meta sequence: `(child ref, key, leaf count)`.
#[derive(Clone)]
pub struct MetaTuple {
    target: Ref,
    key: OrderedKey,
    num_leaves: u64,
    child: ChildSequence,
}

impl MetaTuple {
    /// Summarize an in-memory child node.
    pub fn for_sequence(seq: Sequence) -> Self {
        let num_leaves = seq.num_leaves();
        let key = if seq.kind().is_ordered() {
            match seq.len() {
                0 => OrderedKey::count(0),
                n => seq.key(n - 1),
            }
        } else {
            OrderedKey::count(num_leaves)
        };
        Self {
            target: Ref::new(&seq.to_value()),
            key,
            num_leaves,
            child: ChildSequence::Resolved(seq),
        }
    }

    /// A tuple whose child is loaded through `reader` on first use.
    pub fn unresolved(
        target: Ref,
        key: OrderedKey,
        num_leaves: u64,
        reader: Arc<dyn ValueReader>,
    ) -> Self {
        Self {
            target,
            key,
            num_leaves,
            child: ChildSequence::Unresolved {
                reader,
                loaded: Arc::new(OnceLock::new()),
            },
        }
    }

    /// Ref to the child node.
    pub fn target(&self) -> &Ref {
        &self.target
    }

    /// The largest key below this tuple, or its leaf count for indexed collections.
    pub fn key(&self) -> &OrderedKey {
        &self.key
    }

    /// Number of leaf items below this tuple.
    pub fn num_leaves(&self) -> u64 {
        self.num_leaves
    }

    /// The child node if it is already in memory.
    pub fn resolved_child(&self) -> Option<&Sequence> {
        match &self.child {
            ChildSequence::Resolved(seq) => Some(seq),
            ChildSequence::Unresolved { loaded, .. } => loaded.get(),
        }
    }

    /// Whether the child was built in memory rather than read from a store.
    pub fn is_fresh(&self) -> bool {
        matches!(self.child, ChildSequence::Resolved(_))
    }

    /// The child node, loading and caching it on first use.
    pub fn child(&self) -> ValueResult<Sequence> {
        match &self.child {
            ChildSequence::Resolved(seq) => Ok(seq.clone()),
            ChildSequence::Unresolved { reader, loaded } => {
                if let Some(seq) = loaded.get() {
                    return Ok(seq.clone());
                }
                let hash = self.target.target_hash();
                let value = reader
                    .read_value(&hash)?
                    .ok_or(ValueError::MissingChunk(hash))?;
                let seq = value.sequence().cloned().ok_or(ValueError::UnexpectedKind {
                    hash,
                    expected: "collection node",
                    actual: value.kind().name(),
                })?;
                let _ = loaded.set(seq.clone());
                Ok(seq)
            }
        }
    }
}

impl fmt::Debug for MetaTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaTuple")
            .field("target", &self.target)
            .field("key", &self.key)
            .field("num_leaves", &self.num_leaves)
            .field("resolved", &self.resolved_child().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_leaf(range: std::ops::Range<i32>) -> Sequence {
        Sequence::from_values(CollectionKind::List, range.map(Value::from).collect())
    }

    #[test]
    fn leaf_basics() {
        let seq = list_leaf(0..5);
        assert!(seq.is_leaf());
        assert_eq!(seq.level(), 0);
        assert_eq!(seq.len(), 5);
        assert_eq!(seq.num_leaves(), 5);
        assert_eq!(seq.cumulative_leaves(2), 3);
        assert!(matches!(seq.item(1), SequenceItem::Value(v) if v == Value::from(1)));
    }

    #[test]
    fn meta_tuple_summarizes_child() {
        let child = list_leaf(0..10);
        let t = MetaTuple::for_sequence(child.clone());
        assert_eq!(t.num_leaves(), 10);
        assert_eq!(t.key().as_count(), 10);
        assert_eq!(t.target().target_hash(), child.hash());
        assert_eq!(t.target().height(), 1);
        assert!(t.child().unwrap().ptr_eq(&child));
    }

    #[test]
    fn ordered_tuple_key_is_last_key() {
        let child = Sequence::from_values(
            CollectionKind::Set,
            vec![Value::from(1), Value::from(5), Value::from(9)],
        );
        let t = MetaTuple::for_sequence(child);
        assert_eq!(t.key(), &OrderedKey::Number(9.0));
    }

    #[test]
    fn meta_cumulative_counts() {
        let tuples = vec![
            MetaTuple::for_sequence(list_leaf(0..3)),
            MetaTuple::for_sequence(list_leaf(3..10)),
            MetaTuple::for_sequence(list_leaf(10..12)),
        ];
        let meta = Sequence::meta(CollectionKind::List, 1, tuples);
        assert_eq!(meta.num_leaves(), 12);
        assert_eq!(meta.cumulative_leaves(0), 3);
        assert_eq!(meta.cumulative_leaves(1), 10);
        assert_eq!(meta.cumulative_leaves(2), 12);

        let composite = meta.composite_child(1, 2).unwrap();
        assert!(composite.is_leaf());
        assert_eq!(composite.len(), 9);
        assert!(matches!(composite.item(0), SequenceItem::Value(v) if v == Value::from(3)));

        let empty = meta.composite_child(0, 0).unwrap();
        assert!(empty.is_leaf() && empty.is_empty());
    }

    #[test]
    fn item_ids_compare_content() {
        let a = list_leaf(0..4);
        let b = list_leaf(0..4);
        assert_eq!(a.item_ids(), b.item_ids());
        assert_ne!(a.item_id(0), a.item_id(1));
    }
}
