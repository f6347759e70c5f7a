use std::hash::Hash;

use serde::{Deserialize, Serialize};
use similar::{capture_diff_slices, Algorithm, DiffOp};

/// Upper bound on `removed * added` for a fine-grained edit script. Larger
/// divergences are reported as one covering splice.
pub const DEFAULT_MAX_SPLICE_MATRIX_SIZE: u64 = 2_000_000;

/// One edit in an edit script.
///
/// `from` is only meaningful when `added > 0`; it is zero otherwise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Splice {
    /// Position in the old sequence.
    pub at: u64,
    /// Number of old items removed at `at`.
    pub removed: u64,
    /// Number of new items inserted at `at`.
    pub added: u64,
    /// Position in the new sequence of the first inserted item.
    pub from: u64,
}

impl Splice {
    /// Build a splice, zeroing `from` when nothing is added.
    pub fn new(at: u64, removed: u64, added: u64, from: u64) -> Self {
        Self {
            at,
            removed,
            added,
            from: if added > 0 { from } else { 0 },
        }
    }
}

/// Compute the splices that turn `previous` into `current`.
///
/// Common prefix and suffix are trimmed first. If what remains has more than
/// `max_matrix_size` cells (`removed * added`), a single splice covering the
/// whole changed span is returned instead of a minimal script.
pub fn calc_splices<T: Eq + Hash + Ord>(previous: &[T], current: &[T], max_matrix_size: u64) -> Vec<Splice> {
    let prefix = previous
        .iter()
        .zip(current)
        .take_while(|(a, b)| a == b)
        .count();
    let old = &previous[prefix..];
    let new = &current[prefix..];
    let suffix = old
        .iter()
        .rev()
        .zip(new.iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old = &old[..old.len() - suffix];
    let new = &new[..new.len() - suffix];
    let base = prefix as u64;

    match (old.len() as u64, new.len() as u64) {
        (0, 0) => Vec::new(),
        (0, added) => vec![Splice::new(base, 0, added, base)],
        (removed, 0) => vec![Splice::new(base, removed, 0, 0)],
        (removed, added) if removed.saturating_mul(added) > max_matrix_size => {
            vec![Splice::new(base, removed, added, base)]
        }
        _ => fold_ops(&capture_diff_slices(Algorithm::Myers, old, new), base),
    }
}

/// Merge runs of adjacent non-equal ops into splices.
///
/// Positions are tracked by walking the ops in order; each op advances the
/// old and new cursors by the lengths it consumes.
fn fold_ops(ops: &[DiffOp], base: u64) -> Vec<Splice> {
    let mut splices = Vec::new();
    let mut open: Option<Splice> = None;
    let (mut old_pos, mut new_pos) = (0u64, 0u64);

    for op in ops {
        let (removed, added) = match *op {
            DiffOp::Equal { len, .. } => {
                splices.extend(open.take().map(|s| Splice::new(s.at, s.removed, s.added, s.from)));
                old_pos += len as u64;
                new_pos += len as u64;
                continue;
            }
            DiffOp::Delete { old_len, .. } => (old_len as u64, 0),
            DiffOp::Insert { new_len, .. } => (0, new_len as u64),
            DiffOp::Replace {
                old_len, new_len, ..
            } => (old_len as u64, new_len as u64),
        };
        let s = open.get_or_insert(Splice {
            at: base + old_pos,
            removed: 0,
            added: 0,
            from: base + new_pos,
        });
        s.removed += removed;
        s.added += added;
        old_pos += removed;
        new_pos += added;
    }
    splices.extend(open.map(|s| Splice::new(s.at, s.removed, s.added, s.from)));
    splices
}
