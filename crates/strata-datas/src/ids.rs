//! Dataset id validation.
//!
//! A dataset id is a non-empty string of ASCII letters, digits, `-`, `_`
//! and `/`.

use crate::error::{DatabaseError, DatabaseResult};

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/')
}

/// Validate a dataset id.
///
/// ```
/// use strata_datas::ids::validate_dataset_id;
///
/// assert!(validate_dataset_id("photos/2024-summer").is_ok());
/// assert!(validate_dataset_id("").is_err());
/// assert!(validate_dataset_id("has space").is_err());
/// ```
pub fn validate_dataset_id(id: &str) -> DatabaseResult<()> {
    if id.is_empty() {
        return Err(DatabaseError::InvalidDatasetId {
            id: id.to_string(),
            reason: "must not be empty".into(),
        });
    }
    if let Some(c) = id.chars().find(|c| !is_id_char(*c)) {
        return Err(DatabaseError::InvalidDatasetId {
            id: id.to_string(),
            reason: format!("contains forbidden character {c:?}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn valid_ids() {
        for id in ["ds1", "a-b_c", "nested/path/ok", "UPPER", "0", "/", "--"] {
            assert!(validate_dataset_id(id).is_ok(), "{id}");
        }
    }

    #[test]
    fn invalid_ids() {
        for id in ["", "a b", "a.b", "a:b", "é", "tab\t", "x@y"] {
            assert!(
                matches!(validate_dataset_id(id), Err(DatabaseError::InvalidDatasetId { .. })),
                "{id:?}"
            );
        }
    }

    proptest! {
        #[test]
        fn matches_charset(id in "[A-Za-z0-9_/-]{1,40}") {
            prop_assert!(validate_dataset_id(&id).is_ok());
        }

        #[test]
        fn rejects_other_chars(prefix in "[a-z]{0,5}", bad in "[^A-Za-z0-9_/-]", suffix in "[a-z]{0,5}") {
            let id = format!("{prefix}{bad}{suffix}");
            prop_assert!(validate_dataset_id(&id).is_err());
        }
    }
}
