//! Walks over commit history.
//!
//! Both walks load commits lazily through a [`ValueStore`] and use ref
//! heights to stop early: a commit's parents are always strictly lower than
//! the commit itself, so nothing below the target height can reach it.

use std::collections::{HashMap, HashSet, VecDeque};

use strata_types::Hash;
use strata_values::{Ref, Struct, ValueStore};
use tracing::trace;

use crate::commit::{commit_parents, load_commit};
use crate::error::DatabaseResult;

/// Whether `ancestor` is reachable from `commit` through its parents.
///
/// Breadth-first over the full parent set. A commit does not descend from
/// itself.
pub fn descends_from(vs: &ValueStore, commit: &Struct, ancestor: &Ref) -> DatabaseResult<bool> {
    let target = ancestor.target_hash();
    let mut visited: HashSet<Hash> = HashSet::new();
    let mut queue: VecDeque<Ref> = VecDeque::new();

    for parent in commit_parents(commit)? {
        if visited.insert(parent.target_hash()) {
            queue.push_back(parent);
        }
    }

    while let Some(current) = queue.pop_front() {
        if current.target_hash() == target {
            return Ok(true);
        }
        if current.height() <= ancestor.height() {
            continue;
        }
        let loaded = load_commit(vs, &current)?;
        for parent in commit_parents(&loaded)? {
            if visited.insert(parent.target_hash()) {
                queue.push_back(parent);
            }
        }
    }

    trace!(ancestor = %target, visited = visited.len(), "ancestor not reachable");
    Ok(false)
}

/// The closest commit that both `a` and `b` descend from (either may be the
/// answer itself). `None` when the histories are disjoint.
pub fn find_common_ancestor(vs: &ValueStore, a: &Ref, b: &Ref) -> DatabaseResult<Option<Ref>> {
    if a.target_hash() == b.target_hash() {
        return Ok(Some(*a));
    }
    let ancestors_a = all_ancestors(vs, a)?;
    let ancestors_b = all_ancestors(vs, b)?;

    Ok(ancestors_a
        .iter()
        .filter(|(hash, _)| ancestors_b.contains_key(hash))
        .map(|(_, r)| *r)
        .max_by(|x, y| {
            x.height()
                .cmp(&y.height())
                .then_with(|| y.target_hash().cmp(&x.target_hash()))
        }))
}

/// Every commit reachable from `start`, including `start`.
fn all_ancestors(vs: &ValueStore, start: &Ref) -> DatabaseResult<HashMap<Hash, Ref>> {
    let mut visited = HashMap::new();
    let mut queue = VecDeque::new();
    visited.insert(start.target_hash(), *start);
    queue.push_back(*start);

    while let Some(current) = queue.pop_front() {
        let commit = load_commit(vs, &current)?;
        for parent in commit_parents(&commit)? {
            if !visited.contains_key(&parent.target_hash()) {
                visited.insert(parent.target_hash(), parent);
                queue.push_back(parent);
            }
        }
    }

    Ok(visited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::new_commit;
    use strata_values::Value;

    fn write(vs: &ValueStore, v: i32, parents: &[Ref]) -> (Struct, Ref) {
        let c = new_commit(Value::from(v), parents.iter().copied(), None).unwrap();
        let r = vs.write_value(&Value::Struct(c.clone())).unwrap();
        (c, r)
    }

    // ----------------------------------------------------------------
    // descends_from
    // ----------------------------------------------------------------

    #[test]
    fn linear_history() {
        let vs = ValueStore::new_memory();
        let (_, a) = write(&vs, 1, &[]);
        let (_, b) = write(&vs, 2, &[a]);
        let (c, _) = write(&vs, 3, &[b]);
        assert!(descends_from(&vs, &c, &a).unwrap());
        assert!(descends_from(&vs, &c, &b).unwrap());
    }

    #[test]
    fn sibling_does_not_descend() {
        let vs = ValueStore::new_memory();
        let (_, a) = write(&vs, 1, &[]);
        let (_, b) = write(&vs, 2, &[a]);
        let (c, _) = write(&vs, 3, &[a]);
        assert!(!descends_from(&vs, &c, &b).unwrap());
    }

    #[test]
    fn root_commit_descends_from_nothing() {
        let vs = ValueStore::new_memory();
        let (a, a_ref) = write(&vs, 1, &[]);
        let (_, b) = write(&vs, 2, &[]);
        assert!(!descends_from(&vs, &a, &b).unwrap());
        assert!(!descends_from(&vs, &a, &a_ref).unwrap());
    }

    #[test]
    fn merge_commit_reaches_either_side() {
        let vs = ValueStore::new_memory();
        let (_, base) = write(&vs, 0, &[]);
        let (_, left) = write(&vs, 1, &[base]);
        let (_, l2) = write(&vs, 11, &[left]);
        let (_, right) = write(&vs, 2, &[base]);
        let (merge, _) = write(&vs, 3, &[l2, right]);
        assert!(descends_from(&vs, &merge, &left).unwrap());
        assert!(descends_from(&vs, &merge, &right).unwrap());
        assert!(descends_from(&vs, &merge, &base).unwrap());
    }

    // ----------------------------------------------------------------
    // find_common_ancestor
    // ----------------------------------------------------------------

    #[test]
    fn common_ancestor_of_branches() {
        let vs = ValueStore::new_memory();
        let (_, a) = write(&vs, 1, &[]);
        let (_, b) = write(&vs, 2, &[a]);
        let (_, c) = write(&vs, 3, &[b]);
        let (_, d) = write(&vs, 4, &[b]);
        let (_, e) = write(&vs, 5, &[d]);
        assert_eq!(find_common_ancestor(&vs, &c, &e).unwrap(), Some(b));
    }

    #[test]
    fn common_ancestor_on_one_line_is_the_older() {
        let vs = ValueStore::new_memory();
        let (_, a) = write(&vs, 1, &[]);
        let (_, b) = write(&vs, 2, &[a]);
        let (_, c) = write(&vs, 3, &[b]);
        assert_eq!(find_common_ancestor(&vs, &a, &c).unwrap(), Some(a));
        assert_eq!(find_common_ancestor(&vs, &c, &c).unwrap(), Some(c));
    }

    #[test]
    fn disjoint_histories() {
        let vs = ValueStore::new_memory();
        let (_, a) = write(&vs, 1, &[]);
        let (_, b) = write(&vs, 2, &[]);
        assert_eq!(find_common_ancestor(&vs, &a, &b).unwrap(), None);
    }
}
