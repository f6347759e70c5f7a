use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use strata_types::Hash;

use crate::value::Value;

/// Sort key of a value inside ordered collections and meta tuples.
///
/// Booleans, numbers and strings order by value (in that kind order) and
/// sort before every other value. All other values order by content hash.
#[derive(Clone, Serialize, Deserialize)]
pub enum OrderedKey {
    Bool(bool),
    Number(f64),
    String(String),
    Hash(Hash),
}

impl OrderedKey {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Bool(b) => OrderedKey::Bool(*b),
            Value::Number(n) => OrderedKey::Number(*n),
            Value::String(s) => OrderedKey::String(s.clone()),
            other => OrderedKey::Hash(other.hash()),
        }
    }

    /// Key used by indexed (list, blob) meta tuples: the subtree's leaf count.
    pub fn count(n: u64) -> Self {
        OrderedKey::Number(n as f64)
    }

    /// Inverse of [`OrderedKey::count`]; zero for non-numeric keys.
    pub fn as_count(&self) -> u64 {
        match self {
            OrderedKey::Number(n) if *n >= 0.0 => *n as u64,
            _ => 0,
        }
    }

    /// Whether the key orders by value rather than by hash.
    pub fn is_by_value(&self) -> bool {
        !matches!(self, OrderedKey::Hash(_))
    }

    fn rank(&self) -> u8 {
        match self {
            OrderedKey::Bool(_) => 0,
            OrderedKey::Number(_) => 1,
            OrderedKey::String(_) => 2,
            OrderedKey::Hash(_) => 3,
        }
    }
}

impl Ord for OrderedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (OrderedKey::Bool(a), OrderedKey::Bool(b)) => a.cmp(b),
            (OrderedKey::Number(a), OrderedKey::Number(b)) => a.total_cmp(b),
            (OrderedKey::String(a), OrderedKey::String(b)) => a.cmp(b),
            (OrderedKey::Hash(a), OrderedKey::Hash(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for OrderedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OrderedKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderedKey {}

impl fmt::Debug for OrderedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderedKey::Bool(b) => write!(f, "{b}"),
            OrderedKey::Number(n) => write!(f, "{n}"),
            OrderedKey::String(s) => write!(f, "{s:?}"),
            OrderedKey::Hash(h) => write!(f, "{}", h.short()),
        }
    }
}
