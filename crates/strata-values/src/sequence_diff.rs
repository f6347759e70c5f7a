//! Structural diffs between two sequence trees.
//!
//! Both diffs walk the trees top-down and never descend into a pair of
//! subtrees whose refs are equal.

use std::fmt;

use serde::Serialize;
use strata_diff::{calc_splices, Splice};

use crate::cursor::SequenceCursor;
use crate::error::ValueResult;
use crate::sequence::Sequence;
use crate::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum DiffChangeType {
    Added,
    Removed,
    Modified,
}

impl fmt::Display for DiffChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiffChangeType::Added => "added",
            DiffChangeType::Removed => "removed",
            DiffChangeType::Modified => "modified",
        })
    }
}

/// One changed key of a set or map: the set element or the map key.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueChanged {
    pub change: DiffChangeType,
    pub key: Value,
}

/// Result of diffing two ordered collections, keys ascending in each list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OrderedDiff {
    pub added: Vec<Value>,
    pub removed: Vec<Value>,
    pub modified: Vec<Value>,
}

impl OrderedDiff {
    /// Group `changes` by kind, keeping their key order.
    pub fn from_changes(changes: Vec<ValueChanged>) -> Self {
        let mut diff = Self::default();
        for c in changes {
            match c.change {
                DiffChangeType::Added => diff.added.push(c.key),
                DiffChangeType::Removed => diff.removed.push(c.key),
                DiffChangeType::Modified => diff.modified.push(c.key),
            }
        }
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Total number of changes.
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}

/// Changes from `last` to `current`, ordered by key.
pub fn ordered_diff(last: &Sequence, current: &Sequence) -> ValueResult<Vec<ValueChanged>> {
    let mut changes = Vec::new();
    if last.hash() == current.hash() {
        return Ok(changes);
    }
    ordered_diff_internal(
        last.clone(),
        current.clone(),
        last.level(),
        current.level(),
        &mut changes,
    )?;
    Ok(changes)
}

fn ordered_diff_internal(
    last: Sequence,
    current: Sequence,
    last_level: u32,
    current_level: u32,
    changes: &mut Vec<ValueChanged>,
) -> ValueResult<()> {
    if last_level > current_level {
        let child = last.composite_child(0, last.len() as u64)?;
        return ordered_diff_internal(child, current, last_level - 1, current_level, changes);
    }
    if current_level > last_level {
        let child = current.composite_child(0, current.len() as u64)?;
        return ordered_diff_internal(last, child, last_level, current_level - 1, changes);
    }
    if last.is_leaf() && current.is_leaf() {
        return ordered_diff_left_right(&last, &current, changes);
    }

    let splices = calc_splices(
        &last.item_ids(),
        &current.item_ids(),
        strata_diff::DEFAULT_MAX_SPLICE_MATRIX_SIZE,
    );
    for splice in splices {
        let last_child = last.composite_child(splice.at, splice.removed)?;
        let current_child = current.composite_child(splice.from, splice.added)?;
        ordered_diff_internal(
            last_child,
            current_child,
            last_level - 1,
            current_level - 1,
            changes,
        )?;
    }
    Ok(())
}

/// Merge-walk two ordered trees with cursors, skipping equal runs.
pub fn ordered_diff_left_right(
    last: &Sequence,
    current: &Sequence,
    changes: &mut Vec<ValueChanged>,
) -> ValueResult<()> {
    let mut last_cur = SequenceCursor::at_start(last)?;
    let mut current_cur = SequenceCursor::at_start(current)?;

    while last_cur.valid() && current_cur.valid() {
        fast_forward(&mut last_cur, &mut current_cur)?;

        while last_cur.valid() && current_cur.valid() && !is_current_equal(&last_cur, &current_cur) {
            let (Some(last_key), Some(current_key)) = (last_cur.current_key(), current_cur.current_key())
            else {
                break;
            };
            if current_key < last_key {
                push_change(changes, DiffChangeType::Added, &current_cur);
                current_cur.advance()?;
            } else if last_key < current_key {
                push_change(changes, DiffChangeType::Removed, &last_cur);
                last_cur.advance()?;
            } else {
                push_change(changes, DiffChangeType::Modified, &last_cur);
                last_cur.advance()?;
                current_cur.advance()?;
            }
        }
    }

    while last_cur.valid() {
        push_change(changes, DiffChangeType::Removed, &last_cur);
        last_cur.advance()?;
    }
    while current_cur.valid() {
        push_change(changes, DiffChangeType::Added, &current_cur);
        current_cur.advance()?;
    }
    Ok(())
}

fn push_change(changes: &mut Vec<ValueChanged>, change: DiffChangeType, cur: &SequenceCursor) {
    let seq = cur.sequence();
    let idx = cur.index_in_chunk();
    if idx >= 0 {
        if let Some(key) = seq.key_value(idx as usize) {
            changes.push(ValueChanged { change, key });
        }
    }
}

fn is_current_equal(a: &SequenceCursor, b: &SequenceCursor) -> bool {
    match (a.current_id(), b.current_id()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn fast_forward(a: &mut SequenceCursor, b: &mut SequenceCursor) -> ValueResult<()> {
    if a.valid() && b.valid() {
        do_fast_forward(true, a, b)?;
    }
    Ok(())
}

/// Advance both cursors past their common run of equal items, jumping over
/// whole chunks when the parents agree. Returns whether each has more.
fn do_fast_forward(
    allow_past_end: bool,
    a: &mut SequenceCursor,
    b: &mut SequenceCursor,
) -> ValueResult<(bool, bool)> {
    let mut a_more = true;
    let mut b_more = true;
    while a_more && b_more && is_current_equal(a, b) {
        let parents_equal = match (a.parent(), b.parent()) {
            (Some(pa), Some(pb)) => is_current_equal(pa, pb),
            _ => false,
        };
        if parents_equal {
            if let (Some(pa), Some(pb)) = (a.parent_mut(), b.parent_mut()) {
                (a_more, b_more) = do_fast_forward(false, pa, pb)?;
            }
            a.sync_with_idx(a_more, allow_past_end)?;
            b.sync_with_idx(b_more, allow_past_end)?;
        } else {
            a_more = a.advance_maybe_allow_past_end(allow_past_end)?;
            b_more = b.advance_maybe_allow_past_end(allow_past_end)?;
        }
    }
    Ok((a_more, b_more))
}

/// Splices turning the indexed tree `last` into `current`, positions in
/// leaf items.
pub fn indexed_diff(
    last: &Sequence,
    current: &Sequence,
    max_splice_matrix_size: u64,
) -> ValueResult<Vec<Splice>> {
    let mut out = Vec::new();
    if last.hash() == current.hash() {
        return Ok(out);
    }
    indexed_diff_internal(
        last.clone(),
        last.level(),
        0,
        current.clone(),
        current.level(),
        0,
        max_splice_matrix_size,
        &mut out,
    )?;
    Ok(out)
}

fn leaves_before(seq: &Sequence, idx: u64) -> u64 {
    if idx == 0 {
        0
    } else {
        seq.cumulative_leaves(idx as usize - 1)
    }
}

#[allow(clippy::too_many_arguments)]
fn indexed_diff_internal(
    last: Sequence,
    last_level: u32,
    last_offset: u64,
    current: Sequence,
    current_level: u32,
    current_offset: u64,
    max: u64,
    out: &mut Vec<Splice>,
) -> ValueResult<()> {
    if last_level > current_level {
        let child = last.composite_child(0, last.len() as u64)?;
        return indexed_diff_internal(
            child, last_level - 1, last_offset, current, current_level, current_offset, max, out,
        );
    }
    if current_level > last_level {
        let child = current.composite_child(0, current.len() as u64)?;
        return indexed_diff_internal(
            last, last_level, last_offset, child, current_level - 1, current_offset, max, out,
        );
    }

    for splice in calc_splices(&last.item_ids(), &current.item_ids(), max) {
        if last.is_leaf() || splice.removed == 0 || splice.added == 0 {
            // Whole subtrees added or removed: leaf counts give the answer.
            let last_at = leaves_before(&last, splice.at);
            let last_end = leaves_before(&last, splice.at + splice.removed);
            let current_from = leaves_before(&current, splice.from);
            let current_end = leaves_before(&current, splice.from + splice.added);
            out.push(Splice::new(
                last_offset + last_at,
                last_end - last_at,
                current_end - current_from,
                current_offset + current_from,
            ));
        } else {
            let last_child = last.composite_child(splice.at, splice.removed)?;
            let current_child = current.composite_child(splice.from, splice.added)?;
            indexed_diff_internal(
                last_child,
                last_level - 1,
                last_offset + leaves_before(&last, splice.at),
                current_child,
                current_level - 1,
                current_offset + leaves_before(&current, splice.from),
                max,
                out,
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::build_sequence;
    use crate::sequence::{CollectionKind, SequenceItem};
    use strata_diff::DEFAULT_MAX_SPLICE_MATRIX_SIZE;

    fn set_of(values: impl IntoIterator<Item = i64>) -> Sequence {
        let mut v: Vec<i64> = values.into_iter().collect();
        v.sort();
        v.dedup();
        build_sequence(
            CollectionKind::Set,
            v.into_iter().map(|i| SequenceItem::Value(Value::from(i))).collect(),
        )
    }

    fn map_of(entries: impl IntoIterator<Item = (i64, i64)>) -> Sequence {
        let mut e: Vec<(i64, i64)> = entries.into_iter().collect();
        e.sort();
        build_sequence(
            CollectionKind::Map,
            e.into_iter()
                .map(|(k, v)| SequenceItem::Entry(Value::from(k), Value::from(v)))
                .collect(),
        )
    }

    fn list_of(values: impl IntoIterator<Item = i64>) -> Sequence {
        build_sequence(
            CollectionKind::List,
            values.into_iter().map(|i| SequenceItem::Value(Value::from(i))).collect(),
        )
    }

    fn numbers(values: &[Value]) -> Vec<f64> {
        values.iter().filter_map(Value::as_number).collect()
    }

    #[test]
    fn identical_sets_have_no_changes() {
        let a = set_of(0..1000);
        let b = set_of(0..1000);
        assert!(ordered_diff(&a, &b).unwrap().is_empty());
    }

    #[test]
    fn set_additions_and_removals() {
        let last = set_of(0..2000);
        let current = set_of((0..2000).filter(|i| i % 500 != 7).chain([5000, 6000]));
        let diff = OrderedDiff::from_changes(ordered_diff(&last, &current).unwrap());
        assert_eq!(numbers(&diff.added), vec![5000.0, 6000.0]);
        assert_eq!(numbers(&diff.removed), vec![7.0, 507.0, 1007.0, 1507.0]);
        assert!(diff.modified.is_empty());
    }

    #[test]
    fn map_modifications() {
        let last = map_of((0..1500).map(|i| (i, i)));
        let current = map_of((0..1500).map(|i| (i, if i == 42 || i == 1400 { -1 } else { i })));
        let diff = OrderedDiff::from_changes(ordered_diff(&last, &current).unwrap());
        assert_eq!(numbers(&diff.modified), vec![42.0, 1400.0]);
        assert!(diff.added.is_empty() && diff.removed.is_empty());
    }

    #[test]
    fn diff_across_heights() {
        let last = set_of(0..3);
        let current = set_of(0..3000);
        assert!(current.level() > last.level());
        let diff = OrderedDiff::from_changes(ordered_diff(&last, &current).unwrap());
        assert_eq!(diff.added.len(), 2997);
        assert!(diff.removed.is_empty());

        let back = OrderedDiff::from_changes(ordered_diff(&current, &last).unwrap());
        assert_eq!(back.removed.len(), 2997);
    }

    #[test]
    fn top_down_matches_left_right() {
        let last = set_of((0..3000).filter(|i| i % 3 != 0));
        let current = set_of((0..3000).filter(|i| i % 5 != 0));
        let top_down = ordered_diff(&last, &current).unwrap();
        let mut left_right = Vec::new();
        ordered_diff_left_right(&last, &current, &mut left_right).unwrap();
        assert_eq!(top_down, left_right);
    }

    #[test]
    fn list_single_change() {
        let last = list_of(0..3000);
        let current = list_of((0..3000).map(|i| if i == 1234 { -5 } else { i }));
        let splices = indexed_diff(&last, &current, DEFAULT_MAX_SPLICE_MATRIX_SIZE).unwrap();
        assert_eq!(splices, vec![Splice::new(1234, 1, 1, 1234)]);
    }

    #[test]
    fn list_append_and_truncate() {
        let last = list_of(0..2000);
        let current = list_of(0..2500);
        let splices = indexed_diff(&last, &current, DEFAULT_MAX_SPLICE_MATRIX_SIZE).unwrap();
        let added: u64 = splices.iter().map(|s| s.added).sum();
        let removed: u64 = splices.iter().map(|s| s.removed).sum();
        assert_eq!(added - removed, 500);

        let back = indexed_diff(&current, &last, DEFAULT_MAX_SPLICE_MATRIX_SIZE).unwrap();
        let removed: u64 = back.iter().map(|s| s.removed).sum();
        let added: u64 = back.iter().map(|s| s.added).sum();
        assert_eq!(removed - added, 500);
    }
}
