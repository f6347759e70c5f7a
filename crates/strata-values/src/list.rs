//! Persistent lists.

use std::fmt;

use strata_diff::{Splice, DEFAULT_MAX_SPLICE_MATRIX_SIZE};
use strata_types::Hash;

use crate::chunker::{build_sequence, chunk_sequence};
use crate::cursor::{SequenceCursor, SequenceIter};
use crate::error::{ValueError, ValueResult};
use crate::sequence::{CollectionKind, Sequence, SequenceItem};
use crate::sequence_diff::indexed_diff;
use crate::value::Value;

/// An immutable, chunked sequence of values. Mutators return a new list
/// sharing unchanged chunks with this one.
#[derive(Clone)]
pub struct List {
    seq: Sequence,
}

impl List {
    /// Build a list holding `values` in order.
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            seq: build_sequence(
                CollectionKind::List,
                values.into_iter().map(SequenceItem::Value).collect(),
            ),
        }
    }

    /// The list with no items.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Wrap an existing list tree.
    pub fn from_sequence(seq: Sequence) -> Self {
        Self { seq }
    }

    /// The root node of the tree.
    pub fn sequence(&self) -> &Sequence {
        &self.seq
    }

    /// Content hash of the list.
    pub fn hash(&self) -> Hash {
        self.seq.hash()
    }

    /// Number of items.
    pub fn len(&self) -> u64 {
        self.seq.num_leaves()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The item at `idx`.
    pub fn get(&self, idx: u64) -> ValueResult<Value> {
        self.check_index(idx)?;
        match SequenceCursor::at_index(&self.seq, idx)?.current() {
            Some(SequenceItem::Value(v)) => Ok(v),
            _ => Err(ValueError::IndexOutOfBounds {
                index: idx,
                len: self.len(),
            }),
        }
    }

    /// Remove `remove` values at `idx` and insert `insert` there.
    pub fn splice(&self, idx: u64, remove: u64, insert: Vec<Value>) -> ValueResult<List> {
        let len = self.len();
        if idx > len {
            return Err(ValueError::IndexOutOfBounds { index: idx, len });
        }
        if remove > len - idx {
            return Err(ValueError::IndexOutOfBounds {
                index: idx + remove,
                len,
            });
        }
        if remove == 0 && insert.is_empty() {
            return Ok(self.clone());
        }
        let cur = SequenceCursor::at_index(&self.seq, idx)?;
        let items = insert.into_iter().map(SequenceItem::Value).collect();
        Ok(Self::from_sequence(chunk_sequence(cur, CollectionKind::List, remove, items)?))
    }

    /// Replace the value at `idx`. Setting the current value returns `self`.
    pub fn set(&self, idx: u64, value: Value) -> ValueResult<List> {
        if self.get(idx)? == value {
            return Ok(self.clone());
        }
        self.splice(idx, 1, vec![value])
    }

    /// Add `values` at the end.
    pub fn append(&self, values: Vec<Value>) -> ValueResult<List> {
        self.splice(self.len(), 0, values)
    }

    /// Insert `values` before position `idx`.
    pub fn insert(&self, idx: u64, values: Vec<Value>) -> ValueResult<List> {
        self.splice(idx, 0, values)
    }

    /// Remove the values in `start..end`.
    pub fn remove(&self, start: u64, end: u64) -> ValueResult<List> {
        if end < start {
            return Err(ValueError::InvalidArgument(format!(
                "remove range {start}..{end} is reversed"
            )));
        }
        self.splice(start, end - start, Vec::new())
    }

    /// Remove the item at `idx`.
    pub fn remove_at(&self, idx: u64) -> ValueResult<List> {
        self.check_index(idx)?;
        self.splice(idx, 1, Vec::new())
    }

    /// This list followed by the values of `other`.
    pub fn concat(&self, other: &List) -> ValueResult<List> {
        if other.is_empty() {
            return Ok(self.clone());
        }
        if self.is_empty() {
            return Ok(other.clone());
        }
        self.append(other.to_vec()?)
    }

    /// Iterate over all items in order.
    pub fn iter(&self) -> ListIter {
        match SequenceCursor::at_index(&self.seq, 0) {
            Ok(cur) => ListIter(SequenceIter::new(cur)),
            Err(err) => ListIter(SequenceIter::failed(err)),
        }
    }

    /// Iterate from position `idx`.
    pub fn iter_from(&self, idx: u64) -> ValueResult<ListIter> {
        Ok(ListIter(SequenceIter::new(SequenceCursor::at_index(
            &self.seq,
            idx.min(self.len()),
        )?)))
    }

    /// Visit every value with its index, in order.
    pub fn for_each(&self, mut f: impl FnMut(&Value, u64)) -> ValueResult<()> {
        for (idx, value) in self.iter().enumerate() {
            f(&value?, idx as u64);
        }
        Ok(())
    }

    /// All items, loading every chunk.
    pub fn to_vec(&self) -> ValueResult<Vec<Value>> {
        self.iter().collect()
    }

    /// Splices turning `last` into this list.
    pub fn diff(&self, last: &List) -> ValueResult<Vec<Splice>> {
        self.diff_with_limit(last, DEFAULT_MAX_SPLICE_MATRIX_SIZE)
    }

    /// Like [`List::diff`], reporting spans whose edit matrix exceeds
    /// `max_splice_matrix_size` as one splice.
    pub fn diff_with_limit(&self, last: &List, max_splice_matrix_size: u64) -> ValueResult<Vec<Splice>> {
        if self.hash() == last.hash() {
            return Ok(Vec::new());
        }
        if self.is_empty() {
            return Ok(vec![Splice::new(0, last.len(), 0, 0)]);
        }
        if last.is_empty() {
            return Ok(vec![Splice::new(0, 0, self.len(), 0)]);
        }
        indexed_diff(&last.seq, &self.seq, max_splice_matrix_size)
    }

    fn check_index(&self, idx: u64) -> ValueResult<()> {
        let len = self.len();
        if idx >= len {
            return Err(ValueError::IndexOutOfBounds { index: idx, len });
        }
        Ok(())
    }
}

impl Default for List {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "List(len={}, {})", self.len(), self.hash().short())
    }
}

impl FromIterator<Value> for List {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Iterator over list values.
pub struct ListIter(SequenceIter);

impl Iterator for ListIter {
    type Item = ValueResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.0.next()? {
                Ok(SequenceItem::Value(v)) => return Some(Ok(v)),
                Ok(_) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
