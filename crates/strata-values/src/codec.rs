//! Binary encoding of values.
//!
//! Values are mapped onto a serde wire model and encoded with `bincode`.
//! Collections are encoded by their root sequence: leaf items inline, meta
//! tuples as `(child hash, height, key, leaf count)`. A chunk therefore
//! holds exactly one tree node; child nodes are separate chunks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_types::{Chunk, Hash};

use crate::error::{ValueError, ValueResult};
use crate::ordered_key::OrderedKey;
use crate::ref_value::Ref;
use crate::sequence::{CollectionKind, MetaTuple, Sequence, SequenceItems};
use crate::struct_value::Struct;
use crate::types::Type;
use crate::value::Value;
use crate::value_store::ValueReader;

#[derive(Serialize, Deserialize)]
enum WireValue {
    Bool(bool),
    Number(f64),
    String(String),
    Blob(WireSequence),
    List(WireSequence),
    Set(WireSequence),
    Map(WireSequence),
    Ref { target: Hash, height: u64 },
    Struct { name: String, fields: Vec<(String, WireValue)> },
    Type(Type),
}

#[derive(Serialize, Deserialize)]
enum WireSequence {
    Bytes(Vec<u8>),
    Values(Vec<WireValue>),
    Entries(Vec<(WireValue, WireValue)>),
    Meta { level: u32, tuples: Vec<WireTuple> },
}

#[derive(Serialize, Deserialize)]
struct WireTuple {
    target: Hash,
    height: u64,
    key: OrderedKey,
    num_leaves: u64,
}

/// Encode a value.
pub fn encode_value(value: &Value) -> Vec<u8> {
    serialize(&to_wire(value))
}

/// Encode a value into a chunk.
pub fn encode_chunk(value: &Value) -> Chunk {
    Chunk::new(encode_value(value))
}

/// Encode the collection value whose root is `seq`.
pub(crate) fn encode_sequence(seq: &Sequence) -> Vec<u8> {
    let wire = sequence_to_wire(seq);
    serialize(&match seq.kind() {
        CollectionKind::Blob => WireValue::Blob(wire),
        CollectionKind::List => WireValue::List(wire),
        CollectionKind::Set => WireValue::Set(wire),
        CollectionKind::Map => WireValue::Map(wire),
    })
}

fn serialize(wire: &WireValue) -> Vec<u8> {
    // The wire model has no maps or unsized sequences, so encoding into a
    // Vec cannot fail.
    bincode::serialize(wire).expect("wire values always encode")
}

/// Decode a value. Child tree nodes are left unresolved and load through
/// `reader` on demand.
pub fn decode_value(bytes: &[u8], reader: &Arc<dyn ValueReader>) -> ValueResult<Value> {
    let wire: WireValue =
        bincode::deserialize(bytes).map_err(|e| ValueError::Decode(e.to_string()))?;
    from_wire(wire, reader)
}

/// Decode a chunk, reusing its hash as the value's memoized hash.
pub fn decode_chunk(chunk: &Chunk, reader: &Arc<dyn ValueReader>) -> ValueResult<Value> {
    let value = decode_value(chunk.data(), reader)?;
    match &value {
        Value::Struct(s) => s.prime_hash(chunk.hash()),
        other => {
            if let Some(seq) = other.sequence() {
                seq.prime_hash(chunk.hash());
            }
        }
    }
    Ok(value)
}

fn to_wire(value: &Value) -> WireValue {
    match value {
        Value::Bool(b) => WireValue::Bool(*b),
        Value::Number(n) => WireValue::Number(*n),
        Value::String(s) => WireValue::String(s.clone()),
        Value::Blob(b) => WireValue::Blob(sequence_to_wire(b.sequence())),
        Value::List(l) => WireValue::List(sequence_to_wire(l.sequence())),
        Value::Set(s) => WireValue::Set(sequence_to_wire(s.sequence())),
        Value::Map(m) => WireValue::Map(sequence_to_wire(m.sequence())),
        Value::Ref(r) => WireValue::Ref {
            target: r.target_hash(),
            height: r.height(),
        },
        Value::Struct(s) => WireValue::Struct {
            name: s.name().to_string(),
            fields: s
                .fields()
                .map(|(k, v)| (k.to_string(), to_wire(v)))
                .collect(),
        },
        Value::Type(t) => WireValue::Type(t.clone()),
    }
}

fn sequence_to_wire(seq: &Sequence) -> WireSequence {
    match seq.items() {
        SequenceItems::Bytes(b) => WireSequence::Bytes(b.clone()),
        SequenceItems::Values(vs) => WireSequence::Values(vs.iter().map(to_wire).collect()),
        SequenceItems::Entries(es) => WireSequence::Entries(
            es.iter().map(|(k, v)| (to_wire(k), to_wire(v))).collect(),
        ),
        SequenceItems::Tuples(ts) => WireSequence::Meta {
            level: seq.level(),
            tuples: ts
                .iter()
                .map(|t| WireTuple {
                    target: t.target().target_hash(),
                    height: t.target().height(),
                    key: t.key().clone(),
                    num_leaves: t.num_leaves(),
                })
                .collect(),
        },
    }
}

fn from_wire(wire: WireValue, reader: &Arc<dyn ValueReader>) -> ValueResult<Value> {
    Ok(match wire {
        WireValue::Bool(b) => Value::Bool(b),
        WireValue::Number(n) => Value::Number(n),
        WireValue::String(s) => Value::String(s),
        WireValue::Blob(s) => Value::from_sequence(sequence_from_wire(CollectionKind::Blob, s, reader)?),
        WireValue::List(s) => Value::from_sequence(sequence_from_wire(CollectionKind::List, s, reader)?),
        WireValue::Set(s) => Value::from_sequence(sequence_from_wire(CollectionKind::Set, s, reader)?),
        WireValue::Map(s) => Value::from_sequence(sequence_from_wire(CollectionKind::Map, s, reader)?),
        WireValue::Ref { target, height } => Value::Ref(Ref::from_parts(target, height)),
        WireValue::Struct { name, fields } => {
            let fields = fields
                .into_iter()
                .map(|(k, v)| Ok((k, from_wire(v, reader)?)))
                .collect::<ValueResult<Vec<_>>>()?;
            Value::Struct(Struct::new(name, fields)?)
        }
        WireValue::Type(t) => Value::Type(t),
    })
}

fn sequence_from_wire(
    kind: CollectionKind,
    wire: WireSequence,
    reader: &Arc<dyn ValueReader>,
) -> ValueResult<Sequence> {
    let mismatch = |found: &str| {
        ValueError::Decode(format!("{} sequence cannot hold {found}", kind.name()))
    };
    match wire {
        WireSequence::Bytes(b) if kind == CollectionKind::Blob => Ok(Sequence::from_bytes(b)),
        WireSequence::Bytes(_) => Err(mismatch("bytes")),
        WireSequence::Values(vs) if matches!(kind, CollectionKind::List | CollectionKind::Set) => {
            let values = vs
                .into_iter()
                .map(|v| from_wire(v, reader))
                .collect::<ValueResult<Vec<_>>>()?;
            Ok(Sequence::from_values(kind, values))
        }
        WireSequence::Values(_) => Err(mismatch("values")),
        WireSequence::Entries(es) if kind == CollectionKind::Map => {
            let entries = es
                .into_iter()
                .map(|(k, v)| Ok((from_wire(k, reader)?, from_wire(v, reader)?)))
                .collect::<ValueResult<Vec<_>>>()?;
            Ok(Sequence::from_entries(entries))
        }
        WireSequence::Entries(_) => Err(mismatch("entries")),
        WireSequence::Meta { level, tuples } => {
            if level == 0 {
                return Err(ValueError::Decode("meta sequence at level 0".into()));
            }
            let tuples = tuples
                .into_iter()
                .map(|t| {
                    MetaTuple::unresolved(
                        Ref::from_parts(t.target, t.height),
                        t.key,
                        t.num_leaves,
                        Arc::clone(reader),
                    )
                })
                .collect();
            Ok(Sequence::meta(kind, level, tuples))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_store::ValueStore;
    use crate::{Blob, List, Map, Set};
    use proptest::prelude::*;

    fn reader() -> Arc<dyn ValueReader> {
        ValueStore::new_memory().reader()
    }

    fn roundtrip(v: &Value) -> Value {
        decode_value(&encode_value(v), &reader()).unwrap()
    }

    #[test]
    fn primitives_roundtrip() {
        for v in [
            Value::Bool(true),
            Value::from(3.25),
            Value::from(-0.0),
            Value::from(""),
            Value::from("héllo"),
        ] {
            assert_eq!(roundtrip(&v).hash(), v.hash());
        }
    }

    #[test]
    fn empty_collections_roundtrip() {
        for v in [
            Value::Blob(Blob::empty()),
            Value::List(List::new(vec![])),
            Value::Set(Set::new(vec![])),
            Value::Map(Map::new(vec![])),
        ] {
            let back = roundtrip(&v);
            assert_eq!(back.kind(), v.kind());
            assert_eq!(back.hash(), v.hash());
        }
    }

    #[test]
    fn nested_values_roundtrip() {
        let inner = Value::Map(Map::new(vec![(Value::from("k"), Value::from(1))]));
        let s = Struct::new(
            "Outer",
            [
                ("list", Value::List(List::new(vec![inner.clone(), Value::from(2)]))),
                ("ref", Value::Ref(Ref::new(&inner))),
                ("type", Value::Type(Type::set(Type::String))),
            ],
        )
        .unwrap();
        let v = Value::Struct(s);
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn chunked_collections_keep_hash() {
        let v = Value::List(List::new((0..2000).map(Value::from).collect()));
        assert!(v.sequence().unwrap().is_meta());
        let back = roundtrip(&v);
        assert_eq!(back.hash(), v.hash());
        assert!(back.sequence().unwrap().is_meta());
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            decode_value(&[0xff, 0xff, 0xff, 0xff, 0xff], &reader()),
            Err(ValueError::Decode(_))
        ));
    }

    #[test]
    fn decode_chunk_primes_hash() {
        let v = Value::Set(Set::new(vec![Value::from(1), Value::from(2)]));
        let chunk = encode_chunk(&v);
        let back = decode_chunk(&chunk, &reader()).unwrap();
        assert_eq!(back.hash(), chunk.hash());
    }

    proptest! {
        #[test]
        fn list_of_strings_roundtrip(items in proptest::collection::vec(".{0,8}", 0..50)) {
            let v = Value::List(List::new(items.into_iter().map(Value::from).collect()));
            prop_assert_eq!(roundtrip(&v).hash(), v.hash());
        }
    }
}
