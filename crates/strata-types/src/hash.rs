use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::TypeError;

/// Number of bytes in a digest.
pub const HASH_BYTE_LEN: usize = 20;

const PREFIX: &str = "sha1-";

/// Content hash of a chunk.
///
/// A `Hash` is the SHA-1 digest of a chunk's bytes. Ordering is byte-wise,
/// which is the same as ordering by the lowercase hex text form. The all-zero
/// hash is reserved to mean "no value" (for example an empty store root).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; HASH_BYTE_LEN]);

impl Hash {
    /// Hash raw bytes.
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha1::digest(data);
        let mut out = [0u8; HASH_BYTE_LEN];
        out.copy_from_slice(&digest);
        Self(out)
    }

    /// Wrap a pre-computed digest.
    pub const fn from_digest(digest: [u8; HASH_BYTE_LEN]) -> Self {
        Self(digest)
    }

    /// Build a hash from a byte slice of exactly [`HASH_BYTE_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        if bytes.len() != HASH_BYTE_LEN {
            return Err(TypeError::InvalidHashLength {
                expected: HASH_BYTE_LEN,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; HASH_BYTE_LEN];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    /// The empty hash (all zeros).
    pub const fn empty() -> Self {
        Self([0u8; HASH_BYTE_LEN])
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; HASH_BYTE_LEN]
    }

    /// The raw digest bytes.
    pub fn digest(&self) -> &[u8; HASH_BYTE_LEN] {
        &self.0
    }

    /// Short form for log output (`sha1-` plus the first 8 hex characters).
    pub fn short(&self) -> String {
        format!("{PREFIX}{}", hex::encode(&self.0[..4]))
    }

    /// Parse the textual form `sha1-<40 lowercase hex characters>`.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        Self::maybe_parse(s).ok_or_else(|| TypeError::InvalidHashString(s.to_string()))
    }

    /// Like [`Hash::parse`] but returns `None` on malformed input.
    pub fn maybe_parse(s: &str) -> Option<Self> {
        let hex_part = s.strip_prefix(PREFIX)?;
        if hex_part.len() != HASH_BYTE_LEN * 2
            || !hex_part
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return None;
        }
        let mut out = [0u8; HASH_BYTE_LEN];
        hex::decode_to_slice(hex_part, &mut out).ok()?;
        Some(Self(out))
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}", hex::encode(self.0))
    }
}

impl FromStr for Hash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<[u8; HASH_BYTE_LEN]> for Hash {
    fn from(bytes: [u8; HASH_BYTE_LEN]) -> Self {
        Self(bytes)
    }
}
