//! Foundation types for Strata.
//!
//! Every other Strata crate depends on `strata-types`. It defines the two
//! primitives the storage engine is built from:
//!
//! - [`Hash`] — 20-byte SHA-1 content digest with a `sha1-<hex>` text form
//! - [`Chunk`] — an immutable byte buffer named by the hash of its contents

pub mod chunk;
pub mod error;
pub mod hash;

pub use chunk::Chunk;
pub use error::TypeError;
pub use hash::{Hash, HASH_BYTE_LEN};
