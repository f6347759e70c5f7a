//! Persistent byte strings, chunked by content.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

use strata_diff::{Splice, DEFAULT_MAX_SPLICE_MATRIX_SIZE};
use strata_types::Hash;

use crate::chunker::{build_sequence, chunk_sequence};
use crate::cursor::SequenceCursor;
use crate::error::{ValueError, ValueResult};
use crate::sequence::{CollectionKind, Sequence, SequenceItem};
use crate::sequence_diff::indexed_diff;

#[derive(Clone)]
pub struct Blob {
    seq: Sequence,
}

impl Blob {
    /// Build a blob from bytes.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            seq: build_sequence(
                CollectionKind::Blob,
                data.into().into_iter().map(SequenceItem::Byte).collect(),
            ),
        }
    }

    /// The blob with no bytes.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Read `reader` to the end into a new blob.
    pub fn from_reader(mut reader: impl Read) -> ValueResult<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Self::new(data))
    }

    /// Wrap an existing blob tree.
    pub fn from_sequence(seq: Sequence) -> Self {
        Self { seq }
    }

    /// The root node of the tree.
    pub fn sequence(&self) -> &Sequence {
        &self.seq
    }

    /// Content hash of the blob.
    pub fn hash(&self) -> Hash {
        self.seq.hash()
    }

    /// Length in bytes.
    pub fn len(&self) -> u64 {
        self.seq.num_leaves()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy bytes starting at `offset` into `buf`; returns the count copied,
    /// zero at or past the end.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> ValueResult<usize> {
        let len = self.len();
        let mut read = 0;
        while read < buf.len() && offset + (read as u64) < len {
            let cur = SequenceCursor::at_index(&self.seq, offset + read as u64)?;
            let Some(bytes) = cur.sequence().bytes() else {
                break;
            };
            let start = (cur.index_in_chunk().max(0) as usize).min(bytes.len());
            let available = &bytes[start..];
            if available.is_empty() {
                break;
            }
            let n = available.len().min(buf.len() - read);
            buf[read..read + n].copy_from_slice(&available[..n]);
            read += n;
        }
        Ok(read)
    }

    /// A reader positioned at the start.
    pub fn reader(&self) -> BlobReader {
        BlobReader {
            blob: self.clone(),
            pos: 0,
        }
    }

    /// All bytes, loading every chunk.
    pub fn to_vec(&self) -> ValueResult<Vec<u8>> {
        let mut out = vec![0; self.len() as usize];
        let n = self.read_at(0, &mut out)?;
        out.truncate(n);
        Ok(out)
    }

    /// Remove `remove` bytes at `idx` and insert `insert` there.
    pub fn splice(&self, idx: u64, remove: u64, insert: &[u8]) -> ValueResult<Blob> {
        let len = self.len();
        if idx > len {
            return Err(ValueError::IndexOutOfBounds { index: idx, len });
        }
        if remove > len - idx {
            return Err(ValueError::IndexOutOfBounds {
                index: idx + remove,
                len,
            });
        }
        if remove == 0 && insert.is_empty() {
            return Ok(self.clone());
        }
        let cur = SequenceCursor::at_index(&self.seq, idx)?;
        let items = insert.iter().copied().map(SequenceItem::Byte).collect();
        Ok(Self::from_sequence(chunk_sequence(cur, CollectionKind::Blob, remove, items)?))
    }

    /// This blob followed by `other`.
    pub fn concat(&self, other: &Blob) -> ValueResult<Blob> {
        if other.is_empty() {
            return Ok(self.clone());
        }
        if self.is_empty() {
            return Ok(other.clone());
        }
        self.splice(self.len(), 0, &other.to_vec()?)
    }

    /// Splices (in bytes) turning `last` into this blob.
    pub fn diff(&self, last: &Blob) -> ValueResult<Vec<Splice>> {
        if self.hash() == last.hash() {
            return Ok(Vec::new());
        }
        indexed_diff(&last.seq, &self.seq, DEFAULT_MAX_SPLICE_MATRIX_SIZE)
    }
}

impl Default for Blob {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blob(len={}, {})", self.len(), self.hash().short())
    }
}

/// Seekable reader over a blob.
pub struct BlobReader {
    blob: Blob,
    pos: u64,
}

impl Read for BlobReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.blob.read_at(self.pos, buf).map_err(io::Error::other)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for BlobReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(delta) => self.blob.len().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(p) => {
                self.pos = p;
                Ok(p)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            )),
        }
    }
}
