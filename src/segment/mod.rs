//! Segment Module
//!
//! An on-disk **segment** is the immutable, sorted materialization of one
//! historical memtable. Each segment is identified by its **generation**
//! number: generation `0` is the oldest, and every close of the engine
//! appends exactly one new generation.
//!
//! A generation is made of exactly [`FILES_PER_GENERATION`] files:
//!
//! - `{generation:06}.data` holds the encoded entries, back to back.
//! - `{generation:06}.index` holds a checksummed header, the bloom filter
//!   bytes and one fixed-width offset per entry, which makes binary search
//!   over the data file possible without decoding it.
//!
//! # On-disk layout
//!
//! ```text
//! {gen}.data  : [MAGIC "GKVD"][VERSION_LE]
//!               [KEY_LEN_LE][VALUE_LEN_LE | u32::MAX][KEY][VALUE] ...
//!
//! {gen}.index : [MAGIC "GKVI"][VERSION_LE][ENTRY_COUNT_LE][DATA_LEN_LE]
//!               [DATA_CRC32_LE][BLOOM_LEN_LE][HEADER_CRC32_LE]
//!               [BLOOM_BYTES]
//!               [OFFSET_LE] * ENTRY_COUNT
//! ```
//!
//! A `VALUE_LEN` of `u32::MAX` marks a tombstone; no value bytes follow it.
//! All integers are little-endian.
//!
//! # Sub-modules
//!
//! - [`reader`]: [`SegmentReader`] and its lazy [`SegmentCursor`].
//! - [`writer`]: [`SegmentWriter`], a single-pass, pre-sized builder.
//! - [`scope`]: [`SegmentScope`], the shared liveness flag of all readers.
//!
//! # Atomicity
//!
//! Both files are first written under a `.tmp` suffix, which discovery
//! ignores. The index is renamed into place before the data file, so a crash
//! between the two renames leaves an odd number of finalized files; the
//! generation count `files / 2` then rounds down to the previous value.
//!
//! # Generation discovery
//!
//! The generation count is the number of files in the directory divided by
//! [`FILES_PER_GENERATION`], with one deviation from a plain entry count:
//! only finalized segment names (`{digits}.data`, `{digits}.index`) are
//! counted. Staging files must be skipped for the rename protocol above to
//! be atomic. Foreign files and subdirectories are skipped as well, so an
//! unrelated file in the base directory cannot shift the count.

// ------------------------------------------------------------------------------------------------
// Sub-modules
// ------------------------------------------------------------------------------------------------

pub mod reader;
pub mod scope;
pub mod writer;

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Re-exports
// ------------------------------------------------------------------------------------------------

pub use reader::{SegmentCursor, SegmentReader};
pub use scope::SegmentScope;
pub use writer::{SegmentMeta, SegmentWriter};

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crc32fast::Hasher as Crc32;
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Number of files that make up one on-disk generation.
pub const FILES_PER_GENERATION: u64 = 2;

const DATA_MAGIC: [u8; 4] = *b"GKVD";
const INDEX_MAGIC: [u8; 4] = *b"GKVI";
const FORMAT_VERSION: u32 = 1;

pub(crate) const DATA_HEADER_SIZE: usize = 8;
pub(crate) const CELL_HEADER_SIZE: usize = 8;
pub(crate) const OFFSET_SIZE: usize = 8;
pub(crate) const INDEX_HEADER_SIZE: usize = 36;

/// `value_len` sentinel for a tombstone cell.
pub(crate) const TOMBSTONE_LEN: u32 = u32::MAX;

const DATA_EXTENSION: &str = "data";
const INDEX_EXTENSION: &str = "index";
const STAGING_SUFFIX: &str = "tmp";

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by segment operations (open, lookup, scan, write).
#[derive(Debug, Error)]
pub enum SegmentError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// One of the two files of a generation does not exist.
    #[error("Segment file missing: {}", path.display())]
    Missing {
        /// Path that was expected to exist.
        path: PathBuf,
    },

    /// The file contents do not match the segment format.
    #[error("Corrupted segment: {0}")]
    Corrupted(String),

    /// Checksum mismatch.
    #[error("Checksum mismatch")]
    ChecksumMismatch,

    /// A key was not strictly greater than its predecessor.
    #[error("Keys written out of order")]
    OutOfOrder,

    /// More entries or bytes than the writer was sized for.
    #[error("Segment capacity exceeded")]
    CapacityExceeded,

    /// A key or value is too long to be encoded.
    #[error("Entry too large: {len} bytes")]
    EntryTooLarge {
        /// Offending length.
        len: usize,
    },

    /// `finish` was called before all announced entries were written.
    #[error("Incomplete segment: expected {expected} entries, written {written}")]
    Incomplete {
        /// Announced entry count.
        expected: u64,
        /// Entries actually written.
        written: u64,
    },

    /// The engine released its disk resources; the segment is unreadable.
    #[error("Segment scope closed")]
    ScopeClosed,

    /// Bloom filter construction or decoding failed.
    #[error("Bloom filter error: {0}")]
    Bloom(String),
}

// ------------------------------------------------------------------------------------------------
// IndexHeader
// ------------------------------------------------------------------------------------------------

/// Fixed-size header at the start of every `.index` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IndexHeader {
    /// Number of entries in the generation.
    pub(crate) entry_count: u64,

    /// Exact length of the `.data` file in bytes.
    pub(crate) data_len: u64,

    /// CRC32 of the entire `.data` file.
    pub(crate) data_crc: u32,

    /// Length of the serialized bloom filter that follows the header.
    pub(crate) bloom_len: u32,
}

impl IndexHeader {
    /// Serializes the header, appending a CRC32 over all preceding bytes.
    pub(crate) fn encode(&self) -> [u8; INDEX_HEADER_SIZE] {
        let mut buf = [0u8; INDEX_HEADER_SIZE];
        buf[0..4].copy_from_slice(&INDEX_MAGIC);
        buf[4..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[8..16].copy_from_slice(&self.entry_count.to_le_bytes());
        buf[16..24].copy_from_slice(&self.data_len.to_le_bytes());
        buf[24..28].copy_from_slice(&self.data_crc.to_le_bytes());
        buf[28..32].copy_from_slice(&self.bloom_len.to_le_bytes());

        let mut hasher = Crc32::new();
        hasher.update(&buf[..32]);
        buf[32..36].copy_from_slice(&hasher.finalize().to_le_bytes());
        buf
    }

    /// Parses and verifies a header from the start of `buf`.
    pub(crate) fn decode(buf: &[u8]) -> Result<Self, SegmentError> {
        if buf.len() < INDEX_HEADER_SIZE {
            return Err(SegmentError::Corrupted("index file too small".into()));
        }

        let mut hasher = Crc32::new();
        hasher.update(&buf[..32]);
        if hasher.finalize() != read_u32(buf, 32) {
            return Err(SegmentError::ChecksumMismatch);
        }

        if buf[0..4] != INDEX_MAGIC {
            return Err(SegmentError::Corrupted("index magic mismatch".into()));
        }
        if read_u32(buf, 4) != FORMAT_VERSION {
            return Err(SegmentError::Corrupted("index version mismatch".into()));
        }

        Ok(Self {
            entry_count: read_u64(buf, 8),
            data_len: read_u64(buf, 16),
            data_crc: read_u32(buf, 24),
            bloom_len: read_u32(buf, 28),
        })
    }
}

/// Returns the fixed header that starts every `.data` file.
pub(crate) fn data_header() -> [u8; DATA_HEADER_SIZE] {
    let mut buf = [0u8; DATA_HEADER_SIZE];
    buf[0..4].copy_from_slice(&DATA_MAGIC);
    buf[4..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf
}

/// Verifies the fixed header of a `.data` file.
pub(crate) fn check_data_header(buf: &[u8]) -> Result<(), SegmentError> {
    if buf.len() < DATA_HEADER_SIZE {
        return Err(SegmentError::Corrupted("data file too small".into()));
    }
    if buf[0..4] != DATA_MAGIC {
        return Err(SegmentError::Corrupted("data magic mismatch".into()));
    }
    if read_u32(buf, 4) != FORMAT_VERSION {
        return Err(SegmentError::Corrupted("data version mismatch".into()));
    }
    Ok(())
}

// Callers guarantee `buf` holds at least `at + 4` / `at + 8` bytes.
pub(crate) fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(raw)
}

pub(crate) fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(raw)
}

// ------------------------------------------------------------------------------------------------
// File naming & discovery
// ------------------------------------------------------------------------------------------------

/// The two files of a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SegmentFile {
    Data,
    Index,
}

impl SegmentFile {
    fn extension(self) -> &'static str {
        match self {
            SegmentFile::Data => DATA_EXTENSION,
            SegmentFile::Index => INDEX_EXTENSION,
        }
    }
}

/// Final path of one file of `generation` inside `dir`.
pub(crate) fn segment_path(dir: &Path, generation: u64, kind: SegmentFile) -> PathBuf {
    dir.join(format!("{generation:06}.{}", kind.extension()))
}

/// Staging path used while `generation` is being written.
pub(crate) fn staging_path(dir: &Path, generation: u64, kind: SegmentFile) -> PathBuf {
    dir.join(format!(
        "{generation:06}.{}.{STAGING_SUFFIX}",
        kind.extension()
    ))
}

/// Returns `true` for names of finalized segment files.
///
/// Staging files and unrelated files are rejected.
pub(crate) fn is_segment_file(name: &str) -> bool {
    let Some((stem, ext)) = name.rsplit_once('.') else {
        return false;
    };
    (ext == DATA_EXTENSION || ext == INDEX_EXTENSION)
        && !stem.is_empty()
        && stem.bytes().all(|b| b.is_ascii_digit())
}

/// Counts the generations present in `dir`.
///
/// The count is the number of finalized segment files divided by
/// [`FILES_PER_GENERATION`], rounded down. Unlike a raw directory count,
/// staging files, foreign files and subdirectories are not counted; see
/// the module docs.
pub(crate) fn discover_generations(dir: &Path) -> io::Result<u64> {
    let mut files = 0u64;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if entry.file_name().to_str().is_some_and(is_segment_file) {
            files += 1;
        }
    }
    Ok(files / FILES_PER_GENERATION)
}
