//! Positions inside a sequence tree.
//!
//! A [`SequenceCursor`] is a stack of `(node, index)` pairs, one per tree
//! level, leaf last. Moving past the end of a node moves the parent and loads
//! the adjacent child.

use std::fmt;

use crate::error::{ValueError, ValueResult};
use crate::ordered_key::OrderedKey;
use crate::sequence::{ItemId, Sequence, SequenceItem};

#[derive(Clone)]
pub struct SequenceCursor {
    parent: Option<Box<SequenceCursor>>,
    seq: Sequence,
    idx: isize,
}

impl SequenceCursor {
    /// Cursor on `seq` at `idx`; a negative `idx` counts back from the end.
    pub fn new(parent: Option<SequenceCursor>, seq: Sequence, idx: isize) -> Self {
        let idx = if idx < 0 { idx + seq.len() as isize } else { idx };
        Self {
            parent: parent.map(Box::new),
            seq,
            idx,
        }
    }

    /// Leaf cursor at absolute position `idx` of an indexed sequence. An
    /// `idx` equal to the length yields a cursor just past the last item.
    pub fn at_index(seq: &Sequence, idx: u64) -> ValueResult<Self> {
        let mut remaining = idx;
        let mut cur = Self::new(None, seq.clone(), 0);
        loop {
            remaining -= cur.advance_to_offset(remaining);
            match cur.child_sequence()? {
                Some(child) => cur = Self::new(Some(cur), child, 0),
                None => return Ok(cur),
            }
        }
    }

    /// Cursor at the first item of an ordered sequence whose key is `>= key`.
    ///
    /// With `key == None` the cursor is placed at the first item, or the last
    /// one if `last` is set. When `for_insertion` is false and the key is
    /// greater than every key in the tree, the returned cursor may stop at a
    /// meta level; it is invalid either way.
    pub fn at_key(
        seq: &Sequence,
        key: Option<&OrderedKey>,
        for_insertion: bool,
        last: bool,
    ) -> ValueResult<Self> {
        let start = if last { -1 } else { 0 };
        let mut cur = Self::new(None, seq.clone(), start);
        loop {
            if let Some(key) = key {
                let meta = cur.seq.is_meta();
                if !cur.seek_to(key, for_insertion && meta) {
                    return Ok(cur);
                }
            }
            match cur.child_sequence()? {
                Some(child) => cur = Self::new(Some(cur), child, start),
                None => return Ok(cur),
            }
        }
    }

    /// Leaf cursor at the first item.
    pub fn at_start(seq: &Sequence) -> ValueResult<Self> {
        Self::at_key(seq, None, false, false)
    }

    fn seek_to(&mut self, key: &OrderedKey, last_if_not_found: bool) -> bool {
        let len = self.seq.len();
        let mut lo = 0;
        let mut hi = len;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.seq.key(mid) < *key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        let mut idx = lo;
        if idx == len && last_if_not_found && len > 0 {
            idx -= 1;
        }
        self.idx = idx as isize;
        idx < len
    }

    /// Move to the child containing leaf `offset` of this node; returns the
    /// number of leaves before that child.
    fn advance_to_offset(&mut self, offset: u64) -> u64 {
        let len = self.seq.len();
        if self.seq.is_leaf() {
            self.idx = offset.min(len as u64) as isize;
            return self.idx as u64;
        }
        let mut lo = 0;
        let mut hi = len;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.seq.cumulative_leaves(mid) <= offset {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        let mut idx = lo;
        if idx == len && len > 0 {
            idx = len - 1;
        }
        self.idx = idx as isize;
        if idx == 0 {
            0
        } else {
            self.seq.cumulative_leaves(idx - 1)
        }
    }

    /// The node this cursor is positioned in.
    pub fn sequence(&self) -> &Sequence {
        &self.seq
    }

    /// The cursor one level up, if any.
    pub fn parent(&self) -> Option<&SequenceCursor> {
        self.parent.as_deref()
    }

    /// Number of items in the current node.
    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    /// Number of levels from here to the root, this one included.
    pub fn depth(&self) -> usize {
        1 + self.parent.as_ref().map_or(0, |p| p.depth())
    }

    /// Whether the cursor points at an item.
    pub fn valid(&self) -> bool {
        self.idx >= 0 && (self.idx as usize) < self.seq.len()
    }

    /// Position within the current node; `-1` before the start and `len`
    /// past the end.
    pub fn index_in_chunk(&self) -> isize {
        self.idx
    }

    /// The item under the cursor, or `None` outside the node.
    pub fn current(&self) -> Option<SequenceItem> {
        self.valid().then(|| self.seq.item(self.idx as usize))
    }

    /// Ordering key of the current item.
    pub fn current_key(&self) -> Option<OrderedKey> {
        self.valid().then(|| self.seq.key(self.idx as usize))
    }

    /// Child node under the current position, if this is a meta node.
    pub fn child_sequence(&self) -> ValueResult<Option<Sequence>> {
        if !self.seq.is_meta() || !self.valid() {
            return Ok(None);
        }
        self.seq.child(self.idx as usize)
    }

    /// Absolute leaf position of the cursor.
    pub fn leaf_index(&self) -> u64 {
        let mut total = self.idx.max(0) as u64;
        let mut parent = self.parent.as_deref();
        while let Some(p) = parent {
            if p.idx > 0 {
                total += p.seq.cumulative_leaves(p.idx as usize - 1);
            }
            parent = p.parent.as_deref();
        }
        total
    }

    pub(crate) fn parent_mut(&mut self) -> Option<&mut SequenceCursor> {
        self.parent.as_deref_mut()
    }

    /// Identity of the current item, for comparing positions in two trees.
    pub(crate) fn current_id(&self) -> Option<ItemId> {
        self.valid().then(|| self.seq.item_id(self.idx as usize))
    }

    /// Reload the node under the parent's position and move to its start,
    /// or to its end when the parent ran out.
    pub(crate) fn sync_with_idx(&mut self, has_more: bool, allow_past_end: bool) -> ValueResult<()> {
        self.sync()?;
        let len = self.seq.len() as isize;
        self.idx = if has_more {
            0
        } else if allow_past_end {
            len
        } else {
            len - 1
        };
        Ok(())
    }

    fn sync(&mut self) -> ValueResult<()> {
        if let Some(parent) = &self.parent {
            if let Some(child) = parent.child_sequence()? {
                self.seq = child;
            }
        }
        Ok(())
    }

    /// Step to the next item, crossing into the next node if needed.
    pub fn advance(&mut self) -> ValueResult<bool> {
        self.advance_maybe_allow_past_end(true)
    }

    /// Like [`SequenceCursor::advance`]; with `allow_past_end` the cursor may rest one past the last item.
    pub fn advance_maybe_allow_past_end(&mut self, allow_past_end: bool) -> ValueResult<bool> {
        let len = self.seq.len() as isize;
        if self.idx < len - 1 {
            self.idx += 1;
            return Ok(true);
        }
        if self.idx == len {
            return Ok(false);
        }
        if let Some(parent) = self.parent.as_mut() {
            if parent.advance_maybe_allow_past_end(false)? {
                self.sync()?;
                self.idx = 0;
                return Ok(true);
            }
        }
        if allow_past_end {
            self.idx += 1;
        }
        Ok(false)
    }

    /// Step to the previous item, crossing into the previous node if needed.
    pub fn retreat(&mut self) -> ValueResult<bool> {
        self.retreat_maybe_allow_before_start(true)
    }

    /// Like [`SequenceCursor::retreat`]; with `allow_before_start` the cursor may rest one before the first item.
    pub fn retreat_maybe_allow_before_start(
        &mut self,
        allow_before_start: bool,
    ) -> ValueResult<bool> {
        if self.idx > 0 {
            self.idx -= 1;
            return Ok(true);
        }
        if self.idx == -1 {
            return Ok(false);
        }
        if let Some(parent) = self.parent.as_mut() {
            if parent.retreat_maybe_allow_before_start(false)? {
                self.sync()?;
                self.idx = self.seq.len() as isize - 1;
                return Ok(true);
            }
        }
        if allow_before_start {
            self.idx -= 1;
        }
        Ok(false)
    }
}

impl fmt::Debug for SequenceCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceCursor")
            .field("level", &self.seq.level())
            .field("idx", &self.idx)
            .field("len", &self.seq.len())
            .field("parent", &self.parent)
            .finish()
    }
}

/// Forward iteration over the leaf items from a cursor's position.
///
/// A failed chunk load is yielded once, after the item preceding it, and
/// ends the iteration.
pub struct SequenceIter {
    cur: Option<SequenceCursor>,
    failed: Option<ValueError>,
}

impl SequenceIter {
    /// Iterate from `cur` to the end of the tree.
    pub fn new(cur: SequenceCursor) -> Self {
        Self {
            cur: Some(cur),
            failed: None,
        }
    }

    pub(crate) fn failed(err: ValueError) -> Self {
        Self {
            cur: None,
            failed: Some(err),
        }
    }
}

impl Iterator for SequenceIter {
    type Item = ValueResult<SequenceItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.failed.take() {
            self.cur = None;
            return Some(Err(err));
        }
        let cur = self.cur.as_mut()?;
        let Some(item) = cur.current() else {
            self.cur = None;
            return None;
        };
        if let Err(err) = cur.advance() {
            self.failed = Some(err);
        }
        Some(Ok(item))
    }
}
