//! Edit scripts between two item sequences.
//!
//! Indexed collections (lists, blobs) report differences as [`Splice`]s:
//! "at position `at` of the old sequence, remove `removed` items and insert
//! `added` items taken from position `from` of the new sequence".
//! [`calc_splices`] computes a minimal list of them with the Myers O(ND)
//! algorithm (via `similar`), bounded by a matrix-size cap.

pub mod splice;

pub use splice::{calc_splices, Splice, DEFAULT_MAX_SPLICE_MATRIX_SIZE};
