//! Reachability over stored chunks.
//!
//! Every chunk is a value, and every value names the chunks it depends on
//! through its refs and the meta tuples of its collection trees. Following
//! those links from a root visits everything the root needs.

use std::collections::{HashSet, VecDeque};

use strata_store::Hints;
use strata_types::{Chunk, Hash};
use tracing::debug;

use crate::error::{ValueError, ValueResult};
use crate::ref_value::Ref;
use crate::value::Value;
use crate::value_store::ValueStore;

/// Visit every chunk reachable from `root`, `root` included, breadth-first.
///
/// `stop` is asked about each ref before it is loaded; returning `true`
/// skips that chunk and everything reachable only through it. Each chunk is
/// visited at most once. Returns the number of chunks visited.
pub fn walk_reachable<S, V>(vs: &ValueStore, root: &Ref, mut stop: S, mut visit: V) -> ValueResult<usize>
where
    S: FnMut(&Ref) -> ValueResult<bool>,
    V: FnMut(&Ref, &Chunk, &Value) -> ValueResult<()>,
{
    let mut seen: HashSet<Hash> = HashSet::new();
    let mut queue: VecDeque<Ref> = VecDeque::new();
    seen.insert(root.target_hash());
    queue.push_back(*root);

    let mut visited = 0;
    while let Some(current) = queue.pop_front() {
        if stop(&current)? {
            continue;
        }
        let hash = current.target_hash();
        let chunk = vs.batch_store().get(&hash)?;
        if chunk.is_empty() {
            return Err(ValueError::MissingChunk(hash));
        }
        let value = vs
            .read_value(&hash)?
            .ok_or(ValueError::MissingChunk(hash))?;
        visit(&current, &chunk, &value)?;
        visited += 1;

        for child in value.chunks() {
            if seen.insert(child.target_hash()) {
                queue.push_back(child);
            }
        }
    }
    Ok(visited)
}

/// Copy to `sink` every chunk reachable from `root` in `source`, stopping at
/// chunks `sink` already has. Flushes `sink` and returns the number of chunks
/// copied.
pub fn copy_missing_chunks(source: &ValueStore, sink: &ValueStore, root: &Ref) -> ValueResult<usize> {
    let sink_bs = sink.batch_store();
    let hints = Hints::new();
    let copied = walk_reachable(
        source,
        root,
        |r| Ok(sink_bs.has(&r.target_hash())?),
        |_, chunk, _| Ok(sink_bs.schedule_put(chunk.clone(), &hints)?),
    )?;
    sink.flush()?;
    debug!(root = %root.target_hash(), copied, "copied missing chunks");
    Ok(copied)
}
