//! Building and editing chunked sequence trees.
//!
//! [`build_sequence`] chunks a fresh item stream level by level.
//! [`SequenceChunker`] edits an existing tree: it resumes at a cursor,
//! accepts skips (removals) and appends (insertions), then re-chunks just
//! far enough past the edit for the boundaries to match the original tree
//! again, reusing every untouched subtree. Both produce the same tree for the
//! same items.

use tracing::trace;

use crate::cursor::SequenceCursor;
use crate::error::ValueResult;
use crate::rolling_hash::BoundaryChecker;
use crate::sequence::{CollectionKind, MetaTuple, Sequence, SequenceItem};

/// Chunk `items` into a fresh tree and return its root.
pub fn build_sequence(kind: CollectionKind, items: Vec<SequenceItem>) -> Sequence {
    let mut level = 0;
    let mut items = items;
    loop {
        let mut checker = BoundaryChecker::for_level(kind, level);
        let mut nodes = Vec::new();
        let mut current = Vec::new();
        for item in items {
            let boundary = checker.write(&item);
            current.push(item);
            if boundary {
                nodes.push(Sequence::from_items(kind, level, std::mem::take(&mut current)));
            }
        }
        if !current.is_empty() || nodes.is_empty() {
            nodes.push(Sequence::from_items(kind, level, current));
        }
        if let [root] = nodes.as_slice() {
            return root.clone();
        }
        trace!(kind = kind.name(), level, nodes = nodes.len(), "chunked level");
        items = nodes
            .into_iter()
            .map(|node| SequenceItem::Tuple(MetaTuple::for_sequence(node)))
            .collect();
        level += 1;
    }
}

/// Replace `remove` items at the leaf cursor `cur` with `insert` and return
/// the new root.
pub fn chunk_sequence(
    cur: SequenceCursor,
    kind: CollectionKind,
    remove: u64,
    insert: Vec<SequenceItem>,
) -> ValueResult<Sequence> {
    let mut chunker = SequenceChunker::new(Some(cur), kind, 0)?;
    for _ in 0..remove {
        chunker.skip()?;
    }
    for item in insert {
        chunker.append(item)?;
    }
    chunker.done()
}

/// One level of an in-progress tree edit. Parent levels are created on the
/// first chunk boundary, or up front when resuming inside an existing tree.
pub struct SequenceChunker {
    cur: Option<SequenceCursor>,
    kind: CollectionKind,
    level: u32,
    parent: Option<Box<SequenceChunker>>,
    current: Vec<SequenceItem>,
    checker: BoundaryChecker,
}

impl SequenceChunker {
    /// Chunker at `level`; with a cursor, it resumes editing at that position.
    pub fn new(cur: Option<SequenceCursor>, kind: CollectionKind, level: u32) -> ValueResult<Self> {
        let mut chunker = Self {
            cur,
            kind,
            level,
            parent: None,
            current: Vec::new(),
            checker: BoundaryChecker::for_level(kind, level),
        };
        if chunker.cur.is_some() {
            chunker.resume()?;
        }
        Ok(chunker)
    }

    /// Chunker for a tree built from nothing.
    pub fn empty(kind: CollectionKind) -> Self {
        Self {
            cur: None,
            kind,
            level: 0,
            parent: None,
            current: Vec::new(),
            checker: BoundaryChecker::for_level(kind, 0),
        }
    }

    /// Re-feed the items before the cursor so the checker and the pending
    /// chunk are in the state a full rebuild would have reached here.
    fn resume(&mut self) -> ValueResult<()> {
        let Some(cur) = self.cur.clone() else {
            return Ok(());
        };
        if cur.parent().is_some() {
            self.create_parent()?;
        }

        let mut prime_window = self.checker.window_size().saturating_sub(1);
        let mut retreater = cur.clone();
        let mut append_count = 0usize;
        let mut prime_count = 0usize;

        // Past the end, the last item may have been a boundary and must be
        // re-tested.
        let append_penultimate = cur.index_in_chunk() == cur.len() as isize;
        if append_penultimate && retreater.retreat_maybe_allow_before_start(false)? {
            append_count += 1;
            prime_count += 1;
        }

        // Back to the start of the current chunk.
        while retreater.index_in_chunk() > 0 && retreater.retreat_maybe_allow_before_start(false)? {
            append_count += 1;
            if prime_window > 0 {
                prime_count += 1;
                prime_window -= 1;
            }
        }

        // Further back until the hash window is filled.
        while prime_window > 0 && retreater.retreat_maybe_allow_before_start(false)? {
            prime_count += 1;
            prime_window -= 1;
        }

        while prime_count > 0 || append_count > 0 {
            let Some(item) = retreater.current() else {
                break;
            };
            if prime_count > append_count {
                self.checker.write(&item);
                prime_count -= 1;
            } else if append_count > prime_count {
                self.current.push(item);
                append_count -= 1;
            } else {
                if append_penultimate && append_count == 1 {
                    self.append(item)?;
                } else {
                    self.checker.write(&item);
                    self.current.push(item);
                }
                append_count -= 1;
                prime_count -= 1;
            }
            retreater.advance()?;
        }
        Ok(())
    }

    /// Add one item after the current position.
    pub fn append(&mut self, item: SequenceItem) -> ValueResult<()> {
        let boundary = self.checker.write(&item);
        self.current.push(item);
        if boundary {
            self.handle_chunk_boundary()?;
        }
        Ok(())
    }

    /// Drop the item under the cursor from the output.
    pub fn skip(&mut self) -> ValueResult<()> {
        if let Some(cur) = self.cur.as_mut() {
            if cur.advance()? && cur.index_in_chunk() == 0 {
                // Crossed into the next chunk: the parent must not re-emit
                // the one just left.
                self.skip_parent_if_exists()?;
            }
        }
        Ok(())
    }

    fn skip_parent_if_exists(&mut self) -> ValueResult<()> {
        if let Some(parent) = self.parent.as_mut() {
            if parent.cur.is_some() {
                parent.skip()?;
            }
        }
        Ok(())
    }

    fn create_parent(&mut self) -> ValueResult<()> {
        debug_assert!(self.parent.is_none());
        let parent_cur = self.cur.as_ref().and_then(|c| c.parent()).cloned();
        self.parent = Some(Box::new(SequenceChunker::new(
            parent_cur,
            self.kind,
            self.level + 1,
        )?));
        Ok(())
    }

    fn create_sequence(&mut self) -> Sequence {
        Sequence::from_items(self.kind, self.level, std::mem::take(&mut self.current))
    }

    fn handle_chunk_boundary(&mut self) -> ValueResult<()> {
        debug_assert!(!self.current.is_empty());
        let tuple = MetaTuple::for_sequence(self.create_sequence());
        if self.parent.is_none() {
            self.create_parent()?;
        }
        if let Some(parent) = self.parent.as_mut() {
            parent.append(SequenceItem::Tuple(tuple))?;
        }
        Ok(())
    }

    fn any_pending(&self) -> bool {
        !self.current.is_empty() || self.parent.as_ref().is_some_and(|p| p.any_pending())
    }

    /// Finish the edit and return the new root.
    pub fn done(mut self) -> ValueResult<Sequence> {
        if self.cur.is_some() {
            self.finalize_cursor()?;
        }

        if !self.parent.as_ref().is_some_and(|p| p.any_pending()) {
            if self.level == 0 {
                return Ok(self.create_sequence());
            }
            if self.current.len() == 1 {
                if let Some(SequenceItem::Tuple(tuple)) = self.current.pop() {
                    let mut seq = tuple.child()?;
                    while seq.is_meta() && seq.len() == 1 {
                        match seq.child(0)? {
                            Some(child) => seq = child,
                            None => break,
                        }
                    }
                    return Ok(seq);
                }
            }
        }

        if !self.current.is_empty() {
            self.handle_chunk_boundary()?;
        }
        match self.parent.take() {
            Some(parent) => parent.done(),
            None => Ok(Sequence::empty(self.kind)),
        }
    }

    /// Re-append the original items after the edit until the boundaries line
    /// up with the original tree again.
    fn finalize_cursor(&mut self) -> ValueResult<()> {
        let Some(mut fzr) = self.cur.clone() else {
            return Ok(());
        };
        if !fzr.valid() {
            // Past the end; the parent still points at its last chunk.
            return self.skip_parent_if_exists();
        }

        let mut hash_window = self.checker.window_size();
        let mut first = true;
        while hash_window > 0 || fzr.index_in_chunk() > 0 {
            if first || fzr.index_in_chunk() == 0 {
                // Every original chunk stepped into here is replaced.
                self.skip_parent_if_exists()?;
            }
            first = false;

            let Some(item) = fzr.current() else {
                break;
            };
            let did_advance = fzr.advance()?;
            if hash_window > 0 {
                self.append(item)?;
                hash_window -= 1;
            } else {
                self.current.push(item);
                if did_advance && fzr.index_in_chunk() == 0 {
                    self.handle_chunk_boundary()?;
                }
            }
            if !did_advance {
                break;
            }
        }
        Ok(())
    }
}
