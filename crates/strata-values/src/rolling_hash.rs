//! Content-defined chunk boundaries.
//!
//! A [`BuzHash`] rolls over the bytes derived from the last `window` items of
//! a stream; a [`BoundaryChecker`] closes a chunk after an item whenever the
//! low bits of the hash are all set. The hash only depends on the bytes in its
//! window, so replaying the `window` items before a position reproduces the
//! decision made there by any earlier run.

use crate::sequence::{CollectionKind, SequenceItem};

/// Window (in items) over raw blob bytes.
pub const BLOB_WINDOW: usize = 64;
/// Average blob leaf of 2 KiB.
pub const BLOB_PATTERN: u32 = (1 << 11) - 1;
/// Window (in items) over list element hashes.
pub const LIST_WINDOW: usize = 64;
pub const LIST_PATTERN: u32 = (1 << 6) - 1;
/// Window (in items) over set element / map key hashes.
pub const ORDERED_LEAF_WINDOW: usize = 1;
pub const ORDERED_LEAF_PATTERN: u32 = (1 << 6) - 1;
/// Window over child refs of ordered meta nodes.
pub const ORDERED_META_WINDOW: usize = 1;
/// Window over child refs of indexed (list, blob) meta nodes.
pub const INDEXED_META_WINDOW: usize = 8;
pub const META_PATTERN: u32 = (1 << 6) - 1;

const DIGEST_LEN: usize = 20;

/// Byte substitution table: a fixed splitmix64 stream, so chunking is stable
/// across builds and platforms.
static TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut state: u64 = 0x5374_7261_7461_4442;
    let mut i = 0;
    while i < 256 {
        state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^= z >> 31;
        table[i] = (z >> 32) as u32;
        i += 1;
    }
    table
}

/// Cyclic-polynomial rolling hash over a fixed byte window.
#[derive(Clone, Debug)]
pub struct BuzHash {
    state: u32,
    buf: Vec<u8>,
    pos: usize,
    full: bool,
}

impl BuzHash {
    /// A hash over the last `window` bytes.
    pub fn new(window: usize) -> Self {
        assert!(window > 0, "rolling hash window must be positive");
        Self {
            state: 0,
            buf: vec![0; window],
            pos: 0,
            full: false,
        }
    }

    /// Roll `b` into the window and return the new hash.
    pub fn hash_byte(&mut self, b: u8) -> u32 {
        let n = self.buf.len();
        if self.pos == n {
            self.full = true;
            self.pos = 0;
        }
        let out = self.buf[self.pos];
        self.buf[self.pos] = b;
        self.pos += 1;

        self.state = self.state.rotate_left(1) ^ TABLE[b as usize];
        if self.full {
            self.state ^= TABLE[out as usize].rotate_left(n as u32);
        }
        self.state
    }

    /// Roll every byte of `bytes` into the window.
    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.hash_byte(b);
        }
    }

    /// The current hash.
    pub fn sum32(&self) -> u32 {
        self.state
    }
}

/// Decides after each item whether the current chunk ends there.
#[derive(Clone, Debug)]
pub struct BoundaryChecker {
    hash: BuzHash,
    window: usize,
    pattern: u32,
}

impl BoundaryChecker {
    /// `window` is counted in items of `item_len` bytes each.
    pub fn new(window: usize, item_len: usize, pattern: u32) -> Self {
        Self {
            hash: BuzHash::new(window * item_len),
            window,
            pattern,
        }
    }

    /// Checker for nodes of `kind` at tree `level`.
    pub fn for_level(kind: CollectionKind, level: u32) -> Self {
        match (kind, level) {
            (CollectionKind::Blob, 0) => Self::new(BLOB_WINDOW, 1, BLOB_PATTERN),
            (CollectionKind::List, 0) => Self::new(LIST_WINDOW, DIGEST_LEN, LIST_PATTERN),
            (CollectionKind::Set | CollectionKind::Map, 0) => {
                Self::new(ORDERED_LEAF_WINDOW, DIGEST_LEN, ORDERED_LEAF_PATTERN)
            }
            (k, _) if k.is_ordered() => Self::new(ORDERED_META_WINDOW, DIGEST_LEN, META_PATTERN),
            _ => Self::new(INDEXED_META_WINDOW, DIGEST_LEN, META_PATTERN),
        }
    }

    /// Number of items whose bytes fill the window.
    pub fn window_size(&self) -> usize {
        self.window
    }

    /// Feed one item; true if the chunk should close after it.
    pub fn write(&mut self, item: &SequenceItem) -> bool {
        match item {
            SequenceItem::Byte(b) => {
                self.hash.hash_byte(*b);
            }
            SequenceItem::Value(v) => self.hash.write(v.hash().digest()),
            SequenceItem::Entry(k, _) => self.hash.write(k.hash().digest()),
            SequenceItem::Tuple(t) => self.hash.write(t.target().target_hash().digest()),
        }
        self.hash.sum32() & self.pattern == self.pattern
    }
}
