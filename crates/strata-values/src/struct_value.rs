use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use strata_types::Hash;

use crate::codec;
use crate::error::{ValueError, ValueResult};
use crate::types::{validate_field_name, validate_struct_name, Type};
use crate::value::Value;

/// A named record of fields, ordered by field name.
///
/// Structs are immutable; `set` and `delete` return new structs.
#[derive(Clone)]
pub struct Struct(Arc<StructData>);

struct StructData {
    name: String,
    fields: BTreeMap<String, Value>,
    hash: OnceLock<Hash>,
}

impl Struct {
    /// Build a struct. Names must be identifiers and field names unique.
    pub fn new<K: Into<String>>(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = (K, Value)>,
    ) -> ValueResult<Self> {
        let name = name.into();
        validate_struct_name(&name)?;
        let mut map = BTreeMap::new();
        for (k, v) in fields {
            let k = k.into();
            validate_field_name(&k)?;
            if map.insert(k.clone(), v).is_some() {
                return Err(ValueError::InvalidArgument(format!(
                    "duplicate field {k:?} in struct {name:?}"
                )));
            }
        }
        Ok(Self::from_map(name, map))
    }

    fn from_map(name: String, fields: BTreeMap<String, Value>) -> Self {
        Self(Arc::new(StructData {
            name,
            fields,
            hash: OnceLock::new(),
        }))
    }

    /// The struct name; empty for anonymous structs.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.fields.is_empty()
    }

    /// The value of `field`, or [`ValueError::NoSuchField`].
    pub fn get(&self, field: &str) -> ValueResult<&Value> {
        self.maybe_get(field).ok_or_else(|| ValueError::NoSuchField {
            name: self.0.name.clone(),
            field: field.to_string(),
        })
    }

    /// The value of `field`, if present.
    pub fn maybe_get(&self, field: &str) -> Option<&Value> {
        self.0.fields.get(field)
    }

    /// Fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Return a struct with `field` set to `value`. Returns `self` unchanged
    /// when the field already holds an equal value.
    pub fn set(&self, field: &str, value: Value) -> ValueResult<Struct> {
        validate_field_name(field)?;
        if self.maybe_get(field) == Some(&value) {
            return Ok(self.clone());
        }
        let mut fields = self.0.fields.clone();
        fields.insert(field.to_string(), value);
        Ok(Self::from_map(self.0.name.clone(), fields))
    }

    /// Return a struct without `field`.
    pub fn delete(&self, field: &str) -> Struct {
        if !self.0.fields.contains_key(field) {
            return self.clone();
        }
        let mut fields = self.0.fields.clone();
        fields.remove(field);
        Self::from_map(self.0.name.clone(), fields)
    }

    /// The type of this struct, derived from its field values.
    pub fn struct_type(&self) -> Type {
        let fields: Vec<(String, Type)> = self
            .0
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.type_of()))
            .collect();
        // Name and field names were validated on construction.
        Type::structure(self.0.name.clone(), fields).unwrap_or(Type::Value)
    }

    /// Content hash of the struct.
    pub fn hash(&self) -> Hash {
        *self
            .0
            .hash
            .get_or_init(|| Hash::of(&codec::encode_value(&Value::Struct(self.clone()))))
    }

    pub(crate) fn prime_hash(&self, hash: Hash) {
        let _ = self.0.hash.set(hash);
    }

    /// Names of fields that were added, removed or changed relative to
    /// `last`, in ascending order.
    pub fn diff(&self, last: &Struct) -> Vec<String> {
        let mut changed: Vec<String> = Vec::new();
        for (k, v) in &self.0.fields {
            if last.0.fields.get(k) != Some(v) {
                changed.push(k.clone());
            }
        }
        for k in last.0.fields.keys() {
            if !self.0.fields.contains_key(k) {
                changed.push(k.clone());
            }
        }
        changed.sort();
        changed
    }
}

impl PartialEq for Struct {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Struct {}

impl fmt::Debug for Struct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct(if self.0.name.is_empty() {
            "struct"
        } else {
            &self.0.name
        });
        for (k, v) in &self.0.fields {
            d.field(k, v);
        }
        d.finish()
    }
}
