use std::fmt;

use strata_types::Hash;

use crate::blob::Blob;
use crate::codec;
use crate::list::List;
use crate::map::Map;
use crate::ordered_key::OrderedKey;
use crate::ref_value::Ref;
use crate::sequence::{Sequence, SequenceItems};
use crate::set::Set;
use crate::struct_value::Struct;
use crate::types::Type;

/// Any value that can be stored.
///
/// Equality is content equality: two values are equal iff their hashes are.
#[derive(Clone)]
pub enum Value {
    Bool(bool),
    Number(f64),
    String(String),
    Blob(Blob),
    List(List),
    Set(Set),
    Map(Map),
    Ref(Ref),
    Struct(Struct),
    Type(Type),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,
    Number,
    String,
    Blob,
    List,
    Set,
    Map,
    Ref,
    Struct,
    Type,
}

impl ValueKind {
    /// Lowercase name used in messages.
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Bool => "Bool",
            ValueKind::Number => "Number",
            ValueKind::String => "String",
            ValueKind::Blob => "Blob",
            ValueKind::List => "List",
            ValueKind::Set => "Set",
            ValueKind::Map => "Map",
            ValueKind::Ref => "Ref",
            ValueKind::Struct => "Struct",
            ValueKind::Type => "Type",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    /// Which variant this value is.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Blob(_) => ValueKind::Blob,
            Value::List(_) => ValueKind::List,
            Value::Set(_) => ValueKind::Set,
            Value::Map(_) => ValueKind::Map,
            Value::Ref(_) => ValueKind::Ref,
            Value::Struct(_) => ValueKind::Struct,
            Value::Type(_) => ValueKind::Type,
        }
    }

    /// Content hash of the encoded value. Memoized for collections and structs.
    pub fn hash(&self) -> Hash {
        match self {
            Value::Struct(s) => s.hash(),
            other => match other.sequence() {
                Some(seq) => seq.hash(),
                None => Hash::of(&codec::encode_value(other)),
            },
        }
    }

    /// Type descriptor of this value. Collection and ref element types are
    /// `Value`.
    pub fn type_of(&self) -> Type {
        match self {
            Value::Bool(_) => Type::Bool,
            Value::Number(_) => Type::Number,
            Value::String(_) => Type::String,
            Value::Blob(_) => Type::Blob,
            Value::List(_) => Type::list(Type::Value),
            Value::Set(_) => Type::set(Type::Value),
            Value::Map(_) => Type::map(Type::Value, Type::Value),
            Value::Ref(_) => Type::reference(Type::Value),
            Value::Struct(s) => s.struct_type(),
            Value::Type(_) => Type::Type,
        }
    }

    /// The key this value sorts by in sets and maps.
    pub fn ordered_key(&self) -> OrderedKey {
        OrderedKey::of(self)
    }

    /// Direct child references: refs embedded in this value (including in
    /// nested inline values) and the child chunks of collection trees.
    pub fn chunks(&self) -> Vec<Ref> {
        let mut out = Vec::new();
        self.walk_refs(&mut |r| out.push(*r));
        out
    }

    /// Visit every direct child reference, see [`Value::chunks`].
    pub fn walk_refs(&self, f: &mut dyn FnMut(&Ref)) {
        self.walk_inline(&mut |v| match v {
            Value::Ref(r) => f(r),
            other => {
                if let Some(seq) = other.sequence() {
                    for t in seq.tuples() {
                        f(t.target());
                    }
                }
            }
        });
    }

    /// Visit this value and every value encoded inline inside it (struct
    /// fields and leaf items of collection roots). Does not load children.
    pub fn walk_inline(&self, f: &mut dyn FnMut(&Value)) {
        f(self);
        match self {
            Value::Struct(s) => {
                for (_, v) in s.fields() {
                    v.walk_inline(f);
                }
            }
            other => {
                if let Some(seq) = other.sequence() {
                    match seq.items() {
                        SequenceItems::Values(vs) => vs.iter().for_each(|v| v.walk_inline(f)),
                        SequenceItems::Entries(es) => es.iter().for_each(|(k, v)| {
                            k.walk_inline(f);
                            v.walk_inline(f);
                        }),
                        SequenceItems::Bytes(_) | SequenceItems::Tuples(_) => {}
                    }
                }
            }
        }
    }

    /// Root sequence of a collection value.
    pub fn sequence(&self) -> Option<&Sequence> {
        match self {
            Value::Blob(b) => Some(b.sequence()),
            Value::List(l) => Some(l.sequence()),
            Value::Set(s) => Some(s.sequence()),
            Value::Map(m) => Some(m.sequence()),
            _ => None,
        }
    }

    /// Wrap a sequence in the collection value of its kind.
    pub fn from_sequence(seq: Sequence) -> Value {
        use crate::sequence::CollectionKind;
        match seq.kind() {
            CollectionKind::Blob => Value::Blob(Blob::from_sequence(seq)),
            CollectionKind::List => Value::List(List::from_sequence(seq)),
            CollectionKind::Set => Value::Set(Set::from_sequence(seq)),
            CollectionKind::Map => Value::Map(Map::from_sequence(seq)),
        }
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The number, if this is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// The list, if this is one.
    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&Set> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    /// The map, if this is one.
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_ref_value(&self) -> Option<&Ref> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// The struct, if this is one.
    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&Type> {
        match self {
            Value::Type(t) => Some(t),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a == b,
            (a, b) => a.kind() == b.kind() && a.hash() == b.hash(),
        }
    }
}

impl Eq for Value {}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Ref(r) => write!(f, "{r:?}"),
            Value::Struct(s) => write!(f, "{s:?}"),
            Value::Type(t) => write!(f, "{t:?}"),
            Value::Blob(b) => write!(f, "Blob(len={}, {})", b.len(), self.hash().short()),
            Value::List(l) => write!(f, "List(len={}, {})", l.len(), self.hash().short()),
            Value::Set(s) => write!(f, "Set(len={}, {})", s.len(), self.hash().short()),
            Value::Map(m) => write!(f, "Map(len={}, {})", m.len(), self.hash().short()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! number_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Number(n as f64)
            }
        })*
    };
}

number_from!(f64, f32, i32, i64, u32, u64, usize);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Blob> for Value {
    fn from(b: Blob) -> Self {
        Value::Blob(b)
    }
}

impl From<List> for Value {
    fn from(l: List) -> Self {
        Value::List(l)
    }
}

impl From<Set> for Value {
    fn from(s: Set) -> Self {
        Value::Set(s)
    }
}

impl From<Map> for Value {
    fn from(m: Map) -> Self {
        Value::Map(m)
    }
}

impl From<Ref> for Value {
    fn from(r: Ref) -> Self {
        Value::Ref(r)
    }
}

impl From<Struct> for Value {
    fn from(s: Struct) -> Self {
        Value::Struct(s)
    }
}

impl From<Type> for Value {
    fn from(t: Type) -> Self {
        Value::Type(t)
    }
}
