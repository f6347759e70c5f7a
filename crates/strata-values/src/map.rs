//! Persistent maps, ordered by the [`OrderedKey`] of their keys.

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
pub struct Map {
    seq: Sequence,
}

/// Sort entries by key; a repeated key keeps its last value.
fn sorted_entries(entries: Vec<(Value, Value)>) -> Vec<(Value, Value)> {
    let mut keyed: Vec<(OrderedKey, Value, Value)> = entries
        .into_iter()
        .map(|(k, v)| (OrderedKey::of(&k), k, v))
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    let mut out: Vec<(OrderedKey, Value, Value)> = Vec::with_capacity(keyed.len());
    for entry in keyed {
        match out.last_mut() {
            Some(prev) if prev.0 == entry.0 => *prev = entry,
            _ => out.push(entry),
        }
    }
    out.into_iter().map(|(_, k, v)| (k, v)).collect()
}

impl Map {
    /// Build a map from `entries`. A repeated key keeps its last value.
    pub fn new(entries: Vec<(Value, Value)>) -> Self {
        Self {
            seq: build_sequence(
                CollectionKind::Map,
                sorted_entries(entries)
                    .into_iter()
                    .map(|(k, v)| SequenceItem::Entry(k, v))
                    .collect(),
            ),
        }
    }

    /// The map with no entries.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Wrap an existing map tree.
    pub fn from_sequence(seq: Sequence) -> Self {
        Self { seq }
    }

    /// The root node of the tree.
    pub fn sequence(&self) -> &Sequence {
        &self.seq
    }

    /// Content hash of the map.
    pub fn hash(&self) -> Hash {
        self.seq.hash()
    }

    /// Number of entries.
    pub fn len(&self) -> u64 {
        self.seq.num_leaves()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The entry with the smallest key.
    pub fn first(&self) -> ValueResult<Option<(Value, Value)>> {
        let cur = SequenceCursor::at_key(&self.seq, None, false, false)?;
        Ok(cur.current().and_then(SequenceItem::into_entry))
    }

    /// The entry with the largest key.
    pub fn last(&self) -> ValueResult<Option<(Value, Value)>> {
        let cur = SequenceCursor::at_key(&self.seq, None, false, true)?;
        Ok(cur.current().and_then(SequenceItem::into_entry))
    }

    fn cursor_at(&self, key: &OrderedKey, for_insertion: bool) -> ValueResult<(SequenceCursor, bool)> {
        let cur = SequenceCursor::at_key(&self.seq, Some(key), for_insertion, false)?;
        let found = cur.current_key().as_ref() == Some(key);
        Ok((cur, found))
    }

    /// The value stored under `key`.
    pub fn get(&self, key: &Value) -> ValueResult<Option<Value>> {
        let (cur, found) = self.cursor_at(&OrderedKey::of(key), false)?;
        if !found {
            return Ok(None);
        }
        Ok(cur.current().and_then(SequenceItem::into_entry).map(|(_, v)| v))
    }

    /// Whether `key` is present.
    pub fn has(&self, key: &Value) -> ValueResult<bool> {
        Ok(self.cursor_at(&OrderedKey::of(key), false)?.1)
    }

    /// Map `key` to `value`. Setting the current value returns `self`.
    pub fn set(&self, key: Value, value: Value) -> ValueResult<Map> {
        let (cur, found) = self.cursor_at(&OrderedKey::of(&key), true)?;
        let remove = if found {
            if let Some(SequenceItem::Entry(_, existing)) = cur.current() {
                if existing == value {
                    return Ok(self.clone());
                }
            }
            1
        } else {
            0
        };
        let seq = chunk_sequence(
            cur,
            CollectionKind::Map,
            remove,
            vec![SequenceItem::Entry(key, value)],
        )?;
        Ok(Self::from_sequence(seq))
    }

    /// Set every entry in `entries`.
    pub fn set_many(&self, entries: Vec<(Value, Value)>) -> ValueResult<Map> {
        sorted_entries(entries)
            .into_iter()
            .try_fold(self.clone(), |map, (k, v)| map.set(k, v))
    }

    /// Remove `key`. Removing an absent key returns `self`.
    pub fn remove(&self, key: &Value) -> ValueResult<Map> {
        let (cur, found) = self.cursor_at(&OrderedKey::of(key), false)?;
        if !found {
            return Ok(self.clone());
        }
        let seq = chunk_sequence(cur, CollectionKind::Map, 1, Vec::new())?;
        Ok(Self::from_sequence(seq))
    }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> MapIter {
        match SequenceCursor::at_start(&self.seq) {
            Ok(cur) => MapIter(SequenceIter::new(cur)),
            Err(err) => MapIter(SequenceIter::failed(err)),
        }
    }

    /// Iterate from the first entry whose key is not less than `key`.
    pub fn iter_from(&self, key: &Value) -> ValueResult<MapIter> {
        let (cur, _) = self.cursor_at(&OrderedKey::of(key), true)?;
        Ok(MapIter(SequenceIter::new(cur)))
    }

    /// Call `f` with every entry in key order.
    pub fn for_each(&self, mut f: impl FnMut(&Value, &Value)) -> ValueResult<()> {
        for entry in self.iter() {
            let (k, v) = entry?;
            f(&k, &v);
        }
        Ok(())
    }

    /// All entries in key order.
    pub fn to_vec(&self) -> ValueResult<Vec<(Value, Value)>> {
        self.iter().collect()
    }

    /// Keys added, removed and modified from `last` to reach this map.
    pub fn diff(&self, last: &Map) -> ValueResult<OrderedDiff> {
        Ok(OrderedDiff::from_changes(ordered_diff(&last.seq, &self.seq)?))
    }
}

impl Default for Map {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Map(len={}, {})", self.len(), self.hash().short())
    }
}

impl FromIterator<(Value, Value)> for Map {
    fn from_iter<I: IntoIterator<Item = (Value, Value)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

pub struct MapIter(SequenceIter);

impl Iterator for MapIter {
    type Item = ValueResult<(Value, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.0.next()? {
                Ok(SequenceItem::Entry(k, v)) => return Some(Ok((k, v))),
                Ok(_) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
