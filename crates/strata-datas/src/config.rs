use serde::{Deserialize, Serialize};
use strata_values::ValueStoreConfig;

use crate::error::{DatabaseError, DatabaseResult};

/// Database settings, loadable from TOML.
///
/// ```toml
/// [value_store]
/// cache_capacity = 4096
/// validate_refs_on_write = true
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub value_store: ValueStoreConfig,
}

impl DatabaseConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> DatabaseResult<Self> {
        toml::from_str(s).map_err(|e| DatabaseError::Config(e.to_string()))
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> DatabaseResult<String> {
        toml::to_string(self).map_err(|e| DatabaseError::Config(e.to_string()))
    }
}
