//! Type descriptors and the per-store type registry.
//!
//! Recursive struct types are expressed with [`Type::Cycle`]: `Cycle(n)`
//! stands for the n-th enclosing struct type, counting outward from the
//! innermost. A type is only well formed if every `Cycle(n)` has at least
//! `n + 1` enclosing structs; [`Type::validate`] checks this.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strata_types::Hash;

use crate::error::{ValueError, ValueResult};
use crate::value::Value;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    Bool,
    Number,
    String,
    Blob,
    /// Any value.
    Value,
    Type,
    List(Box<Type>),
    Set(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Ref(Box<Type>),
    Struct(StructType),
    Union(Vec<Type>),
    Cycle(u32),
}

/// A named struct type with fields sorted by name.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructType {
    name: String,
    fields: Vec<(String, Type)>,
}

impl StructType {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields sorted by name.
    pub fn fields(&self) -> &[(String, Type)] {
        &self.fields
    }

    /// The type of field `name`.
    pub fn field(&self, name: &str) -> Option<&Type> {
        self.fields
            .binary_search_by(|(n, _)| n.as_str().cmp(name))
            .ok()
            .map(|i| &self.fields[i].1)
    }
}

/// Validate a struct name: empty, or an identifier.
pub(crate) fn validate_struct_name(name: &str) -> ValueResult<()> {
    if name.is_empty() || is_identifier(name) {
        Ok(())
    } else {
        Err(ValueError::InvalidArgument(format!(
            "invalid struct name {name:?}"
        )))
    }
}

/// Validate a struct field name: an identifier.
pub(crate) fn validate_field_name(name: &str) -> ValueResult<()> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(ValueError::InvalidArgument(format!(
            "invalid field name {name:?}"
        )))
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Type {
    /// `List<elem>`.
    pub fn list(elem: Type) -> Self {
        Type::List(Box::new(elem))
    }

    /// `Set<elem>`.
    pub fn set(elem: Type) -> Self {
        Type::Set(Box::new(elem))
    }

    /// `Map<key, value>`.
    pub fn map(key: Type, value: Type) -> Self {
        Type::Map(Box::new(key), Box::new(value))
    }

    /// `Ref<target>`.
    pub fn reference(target: Type) -> Self {
        Type::Ref(Box::new(target))
    }

    /// Build a struct type. Fields are sorted by name; duplicates are rejected.
    pub fn structure(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = (String, Type)>,
    ) -> ValueResult<Self> {
        let name = name.into();
        validate_struct_name(&name)?;
        let mut fields: Vec<(String, Type)> = fields.into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        for w in fields.windows(2) {
            if w[0].0 == w[1].0 {
                return Err(ValueError::InvalidArgument(format!(
                    "duplicate field {:?} in struct {name:?}",
                    w[0].0
                )));
            }
        }
        for (f, _) in &fields {
            validate_field_name(f)?;
        }
        Ok(Type::Struct(StructType { name, fields }))
    }

    /// Union of `types`, flattened and deduplicated. A union of one type is
    /// that type.
    pub fn union(types: impl IntoIterator<Item = Type>) -> Self {
        let mut flat = Vec::new();
        for t in types {
            match t {
                Type::Union(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        flat.sort_by_key(|t| t.hash());
        flat.dedup();
        if flat.len() == 1 {
            flat.pop().unwrap_or(Type::Value)
        } else {
            Type::Union(flat)
        }
    }

    /// Content hash of the type descriptor; the registry key.
    pub fn hash(&self) -> Hash {
        Hash::of(&bincode::serialize(self).unwrap_or_default())
    }

    /// The struct descriptor, for struct types.
    pub fn as_struct(&self) -> Option<&StructType> {
        match self {
            Type::Struct(st) => Some(st),
            _ => None,
        }
    }

    /// Check that every `Cycle(n)` refers to an enclosing struct.
    pub fn validate(&self) -> ValueResult<()> {
        self.validate_at(0)
    }

    fn validate_at(&self, depth: u32) -> ValueResult<()> {
        match self {
            Type::Cycle(n) if *n >= depth => Err(ValueError::InvalidArgument(format!(
                "Cycle<{n}> has only {depth} enclosing struct(s)"
            ))),
            Type::List(t) | Type::Set(t) | Type::Ref(t) => t.validate_at(depth),
            Type::Map(k, v) => {
                k.validate_at(depth)?;
                v.validate_at(depth)
            }
            Type::Union(ts) => ts.iter().try_for_each(|t| t.validate_at(depth)),
            Type::Struct(st) => st
                .fields
                .iter()
                .try_for_each(|(_, t)| t.validate_at(depth + 1)),
            _ => Ok(()),
        }
    }

    /// Whether `value` is an instance of this type.
    ///
    /// Collection and ref element types are not checked: collections do not
    /// carry element types, so only the kind is compared for them.
    pub fn accepts(&self, value: &Value) -> bool {
        self.accepts_in(value, &mut Vec::new())
    }

    fn accepts_in<'a>(&'a self, value: &Value, enclosing: &mut Vec<&'a StructType>) -> bool {
        match (self, value) {
            (Type::Value, _) => true,
            (Type::Bool, Value::Bool(_))
            | (Type::Number, Value::Number(_))
            | (Type::String, Value::String(_))
            | (Type::Blob, Value::Blob(_))
            | (Type::Type, Value::Type(_))
            | (Type::List(_), Value::List(_))
            | (Type::Set(_), Value::Set(_))
            | (Type::Map(_, _), Value::Map(_))
            | (Type::Ref(_), Value::Ref(_)) => true,
            (Type::Union(ts), v) => ts.iter().any(|t| t.accepts_in(v, enclosing)),
            (Type::Cycle(n), v) => {
                let idx = enclosing.len().checked_sub(*n as usize + 1);
                match idx {
                    Some(i) => {
                        let target = enclosing[i];
                        let mut outer: Vec<&StructType> = enclosing[..i].to_vec();
                        accepts_struct(target, v, &mut outer)
                    }
                    None => false,
                }
            }
            (Type::Struct(st), v) => accepts_struct(st, v, enclosing),
            _ => false,
        }
    }

    /// Human-readable rendering, e.g. `Map<String, List<Number>>`.
    pub fn describe(&self) -> String {
        self.to_string()
    }
}

fn accepts_struct<'a>(st: &'a StructType, value: &Value, enclosing: &mut Vec<&'a StructType>) -> bool {
    let Value::Struct(s) = value else {
        return false;
    };
    if s.name() != st.name || s.len() != st.fields.len() {
        return false;
    }
    enclosing.push(st);
    let ok = st.fields.iter().all(|(name, t)| match s.maybe_get(name) {
        Some(v) => t.accepts_in(v, enclosing),
        None => false,
    });
    enclosing.pop();
    ok
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "Bool"),
            Type::Number => write!(f, "Number"),
            Type::String => write!(f, "String"),
            Type::Blob => write!(f, "Blob"),
            Type::Value => write!(f, "Value"),
            Type::Type => write!(f, "Type"),
            Type::List(t) => write!(f, "List<{t}>"),
            Type::Set(t) => write!(f, "Set<{t}>"),
            Type::Map(k, v) => write!(f, "Map<{k}, {v}>"),
            Type::Ref(t) => write!(f, "Ref<{t}>"),
            Type::Cycle(n) => write!(f, "Cycle<{n}>"),
            Type::Union(ts) => {
                let parts: Vec<String> = ts.iter().map(|t| t.to_string()).collect();
                write!(f, "{}", parts.join(" | "))
            }
            Type::Struct(st) => {
                if st.name.is_empty() {
                    write!(f, "struct {{")?;
                } else {
                    write!(f, "struct {} {{", st.name)?;
                }
                for (i, (name, t)) in st.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {name}: {t}")?;
                }
                if st.fields.is_empty() {
                    write!(f, "}}")
                } else {
                    write!(f, " }}")
                }
            }
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({self})")
    }
}

/// Struct types seen by one value store, keyed by type hash.
///
/// Each store owns its own registry; it starts empty.
#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<Hash, Type>,
}

impl TypeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a type and return its hash.
    pub fn register(&mut self, t: Type) -> Hash {
        let h = t.hash();
        self.types.entry(h).or_insert(t);
        h
    }

    /// The type registered under `hash`.
    pub fn get(&self, hash: &Hash) -> Option<&Type> {
        self.types.get(hash)
    }

    /// Whether a type is registered under `hash`.
    pub fn contains(&self, hash: &Hash) -> bool {
        self.types.contains_key(hash)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Struct types whose name is `name`.
    pub fn structs_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Type> + 'a {
        self.types
            .values()
            .filter(move |t| t.as_struct().is_some_and(|st| st.name == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{List, Struct};

    fn node_type() -> Type {
        Type::structure(
            "Node",
            [
                ("value".to_string(), Type::Number),
                ("next".to_string(), Type::union([Type::Cycle(0), Type::Bool])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn struct_fields_are_sorted() {
        let t = Type::structure(
            "S",
            [("b".to_string(), Type::Bool), ("a".to_string(), Type::Number)],
        )
        .unwrap();
        let st = t.as_struct().unwrap();
        assert_eq!(st.fields()[0].0, "a");
        assert_eq!(st.field("b"), Some(&Type::Bool));
        assert_eq!(t.describe(), "struct S { a: Number, b: Bool }");
    }

    #[test]
    fn invalid_names_rejected() {
        assert!(Type::structure("1abc", []).is_err());
        assert!(Type::structure("S", [("".to_string(), Type::Bool)]).is_err());
        assert!(Type::structure(
            "S",
            [("a".to_string(), Type::Bool), ("a".to_string(), Type::Number)]
        )
        .is_err());
    }

    #[test]
    fn union_flattens_and_dedups() {
        let u = Type::union([Type::Bool, Type::union([Type::Number, Type::Bool])]);
        match u {
            Type::Union(ts) => assert_eq!(ts.len(), 2),
            other => panic!("expected union, got {other}"),
        }
        assert_eq!(Type::union([Type::String]), Type::String);
    }

    #[test]
    fn cycle_validation() {
        assert!(node_type().validate().is_ok());
        assert!(Type::list(Type::Cycle(0)).validate().is_err());
        let nested = Type::structure(
            "Outer",
            [(
                "inner".to_string(),
                Type::structure("Inner", [("up".to_string(), Type::Cycle(1))]).unwrap(),
            )],
        )
        .unwrap();
        assert!(nested.validate().is_ok());
    }

    #[test]
    fn accepts_recursive_values() {
        let leaf = Struct::new(
            "Node",
            [("value", Value::from(1)), ("next", Value::Bool(false))],
        )
        .unwrap();
        let head = Struct::new(
            "Node",
            [("value", Value::from(0)), ("next", Value::Struct(leaf))],
        )
        .unwrap();
        assert!(node_type().accepts(&Value::Struct(head)));

        let wrong = Struct::new("Node", [("value", Value::from("x")), ("next", Value::Bool(true))]).unwrap();
        assert!(!node_type().accepts(&Value::Struct(wrong)));
    }

    #[test]
    fn accepts_checks_kinds() {
        assert!(Type::Value.accepts(&Value::from(1)));
        assert!(Type::list(Type::Number).accepts(&Value::List(List::new(vec![]))));
        assert!(!Type::Number.accepts(&Value::from("1")));
    }

    #[test]
    fn registry_is_keyed_by_hash() {
        let mut reg = TypeRegistry::new();
        assert!(reg.is_empty());
        let h = reg.register(node_type());
        reg.register(node_type());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(&h), Some(&node_type()));
        assert_eq!(reg.structs_named("Node").count(), 1);
    }
}
