//! Commit values.
//!
//! A commit is a struct named `Commit` with three fields:
//!
//! - `meta`: a struct of caller-defined metadata (empty by default)
//! - `parents`: a set of refs to the parent commits
//! - `value`: the committed value

use strata_values::{Ref, Set, Struct, Type, Value, ValueError, ValueStore};

use crate::error::{DatabaseError, DatabaseResult};

pub const COMMIT_STRUCT_NAME: &str = "Commit";

const META_FIELD: &str = "meta";
const PARENTS_FIELD: &str = "parents";
const VALUE_FIELD: &str = "value";

/// Build a commit of `value` on top of `parents`.
pub fn new_commit(
    value: Value,
    parents: impl IntoIterator<Item = Ref>,
    meta: Option<Struct>,
) -> DatabaseResult<Struct> {
    let meta = match meta {
        Some(m) => m,
        None => Struct::new("", Vec::<(String, Value)>::new())?,
    };
    let parents = Set::new(parents.into_iter().map(Value::Ref).collect());
    Ok(Struct::new(
        COMMIT_STRUCT_NAME,
        [
            (META_FIELD, Value::Struct(meta)),
            (PARENTS_FIELD, Value::Set(parents)),
            (VALUE_FIELD, value),
        ],
    )?)
}

/// The type every commit conforms to. Parents are refs to the enclosing
/// commit type.
pub fn commit_type() -> DatabaseResult<Type> {
    Ok(Type::structure(
        COMMIT_STRUCT_NAME,
        vec![
            (META_FIELD.to_string(), Type::structure("", Vec::new())?),
            (PARENTS_FIELD.to_string(), Type::set(Type::reference(Type::Cycle(0)))),
            (VALUE_FIELD.to_string(), Type::Value),
        ],
    )?)
}

/// Whether `value` has the shape of a commit.
pub fn is_commit(value: &Value) -> bool {
    let Value::Struct(s) = value else {
        return false;
    };
    s.name() == COMMIT_STRUCT_NAME
        && s.len() == 3
        && matches!(s.maybe_get(META_FIELD), Some(Value::Struct(_)))
        && matches!(s.maybe_get(PARENTS_FIELD), Some(Value::Set(_)))
        && s.maybe_get(VALUE_FIELD).is_some()
}

/// Interpret `value` as a commit.
pub fn as_commit(value: Value) -> DatabaseResult<Struct> {
    if !is_commit(&value) {
        return Err(DatabaseError::NotACommit(value.hash()));
    }
    match value {
        Value::Struct(s) => Ok(s),
        other => Err(DatabaseError::NotACommit(other.hash())),
    }
}

fn field<'a>(commit: &'a Struct, name: &str) -> DatabaseResult<&'a Value> {
    commit
        .maybe_get(name)
        .ok_or_else(|| DatabaseError::NotACommit(commit.hash()))
}

/// The committed value.
pub fn commit_value(commit: &Struct) -> DatabaseResult<Value> {
    field(commit, VALUE_FIELD).cloned()
}

/// The metadata struct of `commit`.
pub fn commit_meta(commit: &Struct) -> DatabaseResult<Struct> {
    match field(commit, META_FIELD)? {
        Value::Struct(s) => Ok(s.clone()),
        _ => Err(DatabaseError::NotACommit(commit.hash())),
    }
}

/// Refs to the parents of `commit`, in set order.
pub fn commit_parents(commit: &Struct) -> DatabaseResult<Vec<Ref>> {
    let Value::Set(parents) = field(commit, PARENTS_FIELD)? else {
        return Err(DatabaseError::NotACommit(commit.hash()));
    };
    let mut out = Vec::with_capacity(parents.len() as usize);
    for v in parents.iter() {
        match v? {
            Value::Ref(r) => out.push(r),
            _ => return Err(DatabaseError::NotACommit(commit.hash())),
        }
    }
    Ok(out)
}

/// Load the commit `r` points at.
pub fn load_commit(vs: &ValueStore, r: &Ref) -> DatabaseResult<Struct> {
    let hash = r.target_hash();
    match vs.read_value(&hash)? {
        Some(v) => as_commit(v),
        None => Err(DatabaseError::Value(ValueError::MissingChunk(hash))),
    }
}
