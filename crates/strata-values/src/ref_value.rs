use std::fmt;

use strata_types::Hash;

use crate::error::ValueResult;
use crate::value::Value;
use crate::value_store::ValueReader;

/// A hash-based pointer to a stored value.
///
/// `height` is one more than the greatest height of any ref directly inside
/// the target, so a ref to a value without refs has height 1.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ref {
    target: Hash,
    height: u64,
}

impl Ref {
    /// A ref to `value`. Its height is one more than the tallest ref inside `value`.
    pub fn new(value: &Value) -> Self {
        let mut max = 0;
        value.walk_refs(&mut |r| max = max.max(r.height));
        Self {
            target: value.hash(),
            height: max + 1,
        }
    }

    /// Rebuild a ref from its encoded parts.
    pub fn from_parts(target: Hash, height: u64) -> Self {
        Self { target, height }
    }

    /// Hash of the value this ref points at.
    pub fn target_hash(&self) -> Hash {
        self.target
    }

    /// Length of the longest ref chain below and including this one.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Load the target. `None` if the reader does not have it.
    pub fn target_value(&self, reader: &dyn ValueReader) -> ValueResult<Option<Value>> {
        reader.read_value(&self.target)
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref({}, height={})", self.target.short(), self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{List, Set};

    #[test]
    fn height_of_primitive_ref_is_one() {
        let r = Ref::new(&Value::from(42));
        assert_eq!(r.height(), 1);
        assert_eq!(r.target_hash(), Value::from(42).hash());
    }

    #[test]
    fn height_of_ref_to_ref_is_two() {
        let inner = Ref::new(&Value::from(42));
        let outer = Ref::new(&Value::Ref(inner));
        assert_eq!(outer.height(), 2);
    }

    #[test]
    fn height_takes_maximum_over_children() {
        let h1 = Ref::new(&Value::from(1));
        let h2 = Ref::new(&Value::Ref(h1));
        let set = Value::Set(Set::new(vec![Value::Ref(h1), Value::Ref(h2)]));
        assert_eq!(Ref::new(&set).height(), 3);
        let list = Value::List(List::new(vec![Value::from(1)]));
        assert_eq!(Ref::new(&list).height(), 1);
    }
}
