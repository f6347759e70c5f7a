//! Persistent sets, ordered by [`OrderedKey`].

use std::fmt;

use strata_types::Hash;

use crate::chunker::{build_sequence, chunk_sequence};
use crate::cursor::{SequenceCursor, SequenceIter};
use crate::error::ValueResult;
use crate::ordered_key::OrderedKey;
use crate::sequence::{CollectionKind, Sequence, SequenceItem};
use crate::sequence_diff::{ordered_diff, OrderedDiff};
use crate::value::Value;

#[derive(Clone)]
pub struct Set {
    seq: Sequence,
}

/// Sort by key and drop repeated keys.
fn sorted_unique(values: Vec<Value>) -> Vec<Value> {
    let mut keyed: Vec<(OrderedKey, Value)> =
        values.into_iter().map(|v| (OrderedKey::of(&v), v)).collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.dedup_by(|a, b| a.0 == b.0);
    keyed.into_iter().map(|(_, v)| v).collect()
}

impl Set {
    /// Build a set from `values`. Duplicates collapse.
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            seq: build_sequence(
                CollectionKind::Set,
                sorted_unique(values)
                    .into_iter()
                    .map(SequenceItem::Value)
                    .collect(),
            ),
        }
    }

    /// The set with no members.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Wrap an existing set tree.
    pub fn from_sequence(seq: Sequence) -> Self {
        Self { seq }
    }

    /// The root node of the tree.
    pub fn sequence(&self) -> &Sequence {
        &self.seq
    }

    /// Content hash of the set.
    pub fn hash(&self) -> Hash {
        self.seq.hash()
    }

    /// Number of members.
    pub fn len(&self) -> u64 {
        self.seq.num_leaves()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The smallest member.
    pub fn first(&self) -> ValueResult<Option<Value>> {
        let cur = SequenceCursor::at_key(&self.seq, None, false, false)?;
        Ok(cur.current().and_then(SequenceItem::into_value))
    }

    /// The largest member.
    pub fn last(&self) -> ValueResult<Option<Value>> {
        let cur = SequenceCursor::at_key(&self.seq, None, false, true)?;
        Ok(cur.current().and_then(SequenceItem::into_value))
    }

    /// Whether `value` is a member.
    pub fn has(&self, value: &Value) -> ValueResult<bool> {
        let key = OrderedKey::of(value);
        let cur = SequenceCursor::at_key(&self.seq, Some(&key), false, false)?;
        Ok(cur.current_key().as_ref() == Some(&key))
    }

    /// Add `value`. Adding a present value returns `self`.
    pub fn insert(&self, value: Value) -> ValueResult<Set> {
        let key = OrderedKey::of(&value);
        let cur = SequenceCursor::at_key(&self.seq, Some(&key), true, false)?;
        if cur.current_key().as_ref() == Some(&key) {
            return Ok(self.clone());
        }
        let seq = chunk_sequence(cur, CollectionKind::Set, 0, vec![SequenceItem::Value(value)])?;
        Ok(Self::from_sequence(seq))
    }

    /// Insert every value in `values`.
    pub fn insert_many(&self, values: Vec<Value>) -> ValueResult<Set> {
        sorted_unique(values)
            .into_iter()
            .try_fold(self.clone(), |set, v| set.insert(v))
    }

    /// Remove `value`. Removing an absent value returns `self`.
    pub fn remove(&self, value: &Value) -> ValueResult<Set> {
        let key = OrderedKey::of(value);
        let cur = SequenceCursor::at_key(&self.seq, Some(&key), false, false)?;
        if cur.current_key().as_ref() != Some(&key) {
            return Ok(self.clone());
        }
        let seq = chunk_sequence(cur, CollectionKind::Set, 1, Vec::new())?;
        Ok(Self::from_sequence(seq))
    }

    /// Remove every value in `values`.
    pub fn remove_many(&self, values: &[Value]) -> ValueResult<Set> {
        values.iter().try_fold(self.clone(), |set, v| set.remove(v))
    }

    /// Iterate over members in order.
    pub fn iter(&self) -> SetIter {
        match SequenceCursor::at_start(&self.seq) {
            Ok(cur) => SetIter(SequenceIter::new(cur)),
            Err(err) => SetIter(SequenceIter::failed(err)),
        }
    }

    /// Iterate from the first value not less than `value`.
    pub fn iter_from(&self, value: &Value) -> ValueResult<SetIter> {
        let key = OrderedKey::of(value);
        let cur = SequenceCursor::at_key(&self.seq, Some(&key), true, false)?;
        Ok(SetIter(SequenceIter::new(cur)))
    }

    /// Call `f` with every member in order.
    pub fn for_each(&self, mut f: impl FnMut(&Value)) -> ValueResult<()> {
        for value in self.iter() {
            f(&value?);
        }
        Ok(())
    }

    /// All members in order.
    pub fn to_vec(&self) -> ValueResult<Vec<Value>> {
        self.iter().collect()
    }

    /// Values added to and removed from `last` to reach this set.
    pub fn diff(&self, last: &Set) -> ValueResult<OrderedDiff> {
        Ok(OrderedDiff::from_changes(ordered_diff(&last.seq, &self.seq)?))
    }
}

impl Default for Set {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Set(len={}, {})", self.len(), self.hash().short())
    }
}

impl FromIterator<Value> for Set {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

pub struct SetIter(SequenceIter);

impl Iterator for SetIter {
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
