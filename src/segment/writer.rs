//! Segment writer: builds one generation from a sorted stream of entries.
//!
//! The writer is sized up front. The caller announces how many entries it
//! will write and an upper bound on their combined key and value bytes; the
//! staging files are allocated to their final capacity and memory-mapped, so
//! every entry is a plain copy into the map with no resizing.
//!
//! # Input Requirements
//!
//! - Keys **must be strictly increasing** under the writer's [`KeyOrder`].
//! - Exactly the announced number of entries must be written before
//!   [`SegmentWriter::finish`].
//!
//! # Atomicity
//!
//! 1. Write everything to `{gen}.data.tmp` and `{gen}.index.tmp`.
//! 2. Flush both maps, trim the data file to its used length, sync both files.
//! 3. Rename the index, then the data file, and sync the directory.
//!
//! A writer dropped before `finish` removes its staging files.

use std::{
    fs::{self, File, OpenOptions},
    io,
    marker::PhantomData,
    path::{Path, PathBuf},
};

use bloomfilter::Bloom;
use crc32fast::Hasher as Crc32;
use memmap2::MmapMut;
use tracing::{debug, trace, warn};

use crate::entry::{Entry, Value};
use crate::order::{HexKey, KeyOrder, Lexicographic};

use super::{
    CELL_HEADER_SIZE, DATA_HEADER_SIZE, INDEX_HEADER_SIZE, IndexHeader, OFFSET_SIZE, SegmentError,
    SegmentFile, TOMBSTONE_LEN, data_header, segment_path, staging_path,
};

// ------------------------------------------------------------------------------------------------
// SegmentMeta
// ------------------------------------------------------------------------------------------------

/// Summary of a successfully published generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMeta {
    /// Generation number that was written.
    pub generation: u64,

    /// Number of entries, tombstones included.
    pub entry_count: u64,

    /// Final size of the `.data` file.
    pub data_bytes: u64,

    /// Final size of the `.index` file.
    pub index_bytes: u64,
}

// ------------------------------------------------------------------------------------------------
// Staging files
// ------------------------------------------------------------------------------------------------

/// Owns the `.tmp` paths of a generation until they are published.
struct Staging {
    dir: PathBuf,
    generation: u64,
    data: PathBuf,
    index: PathBuf,
    armed: bool,
}

impl Staging {
    fn new(dir: &Path, generation: u64) -> Self {
        Self {
            dir: dir.to_path_buf(),
            generation,
            data: staging_path(dir, generation, SegmentFile::Data),
            index: staging_path(dir, generation, SegmentFile::Index),
            armed: true,
        }
    }

    /// Renames both staging files into place, index first.
    fn publish(mut self) -> io::Result<()> {
        fs::rename(
            &self.index,
            segment_path(&self.dir, self.generation, SegmentFile::Index),
        )?;
        fs::rename(
            &self.data,
            segment_path(&self.dir, self.generation, SegmentFile::Data),
        )?;
        self.armed = false;
        File::open(&self.dir)?.sync_all()
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for path in [&self.data, &self.index] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove staging file"),
            }
        }
    }
}

fn create_sized(path: &Path, len: u64) -> io::Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    file.set_len(len)?;
    Ok(file)
}

// ------------------------------------------------------------------------------------------------
// SegmentWriter
// ------------------------------------------------------------------------------------------------

/// Writes one generation in a single forward pass.
///
/// # Example
///
/// ```rust,ignore
/// let mut writer = SegmentWriter::<Lexicographic>::create(dir, 3, count, footprint, 0.01)?;
/// for entry in memtable.iter() {
///     writer.write_entry(&entry)?;
/// }
/// let meta = writer.finish()?;
/// ```
pub struct SegmentWriter<O: KeyOrder = Lexicographic> {
    generation: u64,
    staging: Staging,
    data_file: File,
    index_file: File,
    data: MmapMut,
    index: MmapMut,
    bloom: Bloom<[u8]>,
    bloom_len: usize,
    crc: Crc32,
    expected: u64,
    written: u64,
    cursor: usize,
    last_key: Option<Vec<u8>>,
    _order: PhantomData<fn() -> O>,
}

impl<O: KeyOrder> SegmentWriter<O> {
    /// Allocates and maps the staging files of `generation` in `dir`.
    ///
    /// # Parameters
    ///
    /// - `entry_count`: exact number of entries that will be written.
    /// - `footprint`: upper bound on the sum of key and present value lengths.
    /// - `false_positive_rate`: target rate of the segment's bloom filter.
    ///
    /// # Errors
    ///
    /// - [`SegmentError::Bloom`] if the false-positive rate is outside `(0, 1)`.
    /// - [`SegmentError::CapacityExceeded`] if the sizes overflow `usize`.
    /// - I/O errors while creating, sizing or mapping the files.
    pub fn create(
        dir: &Path,
        generation: u64,
        entry_count: u64,
        footprint: u64,
        false_positive_rate: f64,
    ) -> Result<Self, SegmentError> {
        if !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
            return Err(SegmentError::Bloom(format!(
                "false-positive rate {false_positive_rate} outside (0, 1)"
            )));
        }
        let bloom_items =
            usize::try_from(entry_count.max(1)).map_err(|_| SegmentError::CapacityExceeded)?;
        let bloom: Bloom<[u8]> = Bloom::new_for_fp_rate(bloom_items, false_positive_rate)
            .map_err(|e| SegmentError::Bloom(e.to_string()))?;
        let bloom_len = bloom.as_slice().len();

        let data_capacity = entry_count
            .checked_mul(CELL_HEADER_SIZE as u64)
            .and_then(|cells| cells.checked_add(footprint))
            .and_then(|n| n.checked_add(DATA_HEADER_SIZE as u64))
            .ok_or(SegmentError::CapacityExceeded)?;
        let index_len = entry_count
            .checked_mul(OFFSET_SIZE as u64)
            .and_then(|n| n.checked_add((INDEX_HEADER_SIZE + bloom_len) as u64))
            .ok_or(SegmentError::CapacityExceeded)?;
        usize::try_from(data_capacity).map_err(|_| SegmentError::CapacityExceeded)?;
        usize::try_from(index_len).map_err(|_| SegmentError::CapacityExceeded)?;

        // From here on a failure drops `staging`, which removes the files.
        let staging = Staging::new(dir, generation);
        let data_file = create_sized(&staging.data, data_capacity)?;
        let index_file = create_sized(&staging.index, index_len)?;

        // SAFETY: the staging files are private to this writer until publish.
        let mut data = unsafe { MmapMut::map_mut(&data_file)? };
        let index = unsafe { MmapMut::map_mut(&index_file)? };

        let header = data_header();
        data[..DATA_HEADER_SIZE].copy_from_slice(&header);
        let mut crc = Crc32::new();
        crc.update(&header);

        debug!(
            generation,
            entry_count, data_capacity, index_len, "segment writer created"
        );

        Ok(Self {
            generation,
            staging,
            data_file,
            index_file,
            data,
            index,
            bloom,
            bloom_len,
            crc,
            expected: entry_count,
            written: 0,
            cursor: DATA_HEADER_SIZE,
            last_key: None,
            _order: PhantomData,
        })
    }

    /// Appends one entry.
    ///
    /// # Errors
    ///
    /// - [`SegmentError::OutOfOrder`] if `entry.key` is not strictly greater
    ///   than the previously written key.
    /// - [`SegmentError::CapacityExceeded`] if more entries or bytes are
    ///   written than announced.
    /// - [`SegmentError::EntryTooLarge`] if a key or value length does not
    ///   fit the cell encoding.
    pub fn write_entry(&mut self, entry: &Entry) -> Result<(), SegmentError> {
        if self.written == self.expected {
            return Err(SegmentError::CapacityExceeded);
        }
        if let Some(last) = &self.last_key {
            if O::compare(last, &entry.key).is_ge() {
                return Err(SegmentError::OutOfOrder);
            }
        }

        let key_len = encode_len(entry.key.len())?;
        let (value_len, value): (u32, &[u8]) = match &entry.value {
            Value::Present(v) => (encode_len(v.len())?, v),
            Value::Tombstone => (TOMBSTONE_LEN, &[]),
        };

        let cell_len = CELL_HEADER_SIZE + entry.key.len() + value.len();
        let start = self.cursor;
        let end = start
            .checked_add(cell_len)
            .filter(|end| *end <= self.data.len())
            .ok_or(SegmentError::CapacityExceeded)?;

        let cell = &mut self.data[start..end];
        cell[0..4].copy_from_slice(&key_len.to_le_bytes());
        cell[4..8].copy_from_slice(&value_len.to_le_bytes());
        cell[CELL_HEADER_SIZE..CELL_HEADER_SIZE + entry.key.len()].copy_from_slice(&entry.key);
        cell[CELL_HEADER_SIZE + entry.key.len()..].copy_from_slice(value);
        self.crc.update(cell);

        // `written < expected` keeps the slot inside the pre-sized index.
        let slot = INDEX_HEADER_SIZE + self.bloom_len + self.written as usize * OFFSET_SIZE;
        self.index[slot..slot + OFFSET_SIZE].copy_from_slice(&(start as u64).to_le_bytes());

        self.bloom.set(&entry.key[..]);
        self.last_key = Some(entry.key.clone());
        self.written += 1;
        self.cursor = end;

        trace!(
            generation = self.generation,
            key = %HexKey(&entry.key),
            offset = start,
            "segment cell written"
        );
        Ok(())
    }

    /// Number of entries written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Seals the generation and publishes both files.
    ///
    /// # Errors
    ///
    /// - [`SegmentError::Incomplete`] if fewer entries were written than
    ///   announced. The staging files are removed.
    /// - I/O errors while flushing, syncing or renaming.
    pub fn finish(self) -> Result<SegmentMeta, SegmentError> {
        let Self {
            generation,
            staging,
            data_file,
            index_file,
            data,
            mut index,
            bloom,
            bloom_len,
            crc,
            expected,
            written,
            cursor,
            ..
        } = self;

        if written != expected {
            return Err(SegmentError::Incomplete { expected, written });
        }

        let data_len = cursor as u64;
        let header = IndexHeader {
            entry_count: written,
            data_len,
            data_crc: crc.finalize(),
            bloom_len: u32::try_from(bloom_len).map_err(|_| SegmentError::CapacityExceeded)?,
        };
        index[..INDEX_HEADER_SIZE].copy_from_slice(&header.encode());
        index[INDEX_HEADER_SIZE..INDEX_HEADER_SIZE + bloom_len].copy_from_slice(bloom.as_slice());

        data.flush()?;
        index.flush()?;
        let index_bytes = index.len() as u64;
        drop(data);
        drop(index);

        data_file.set_len(data_len)?;
        data_file.sync_all()?;
        index_file.sync_all()?;
        drop(data_file);
        drop(index_file);

        staging.publish()?;

        debug!(
            generation,
            entries = written,
            data_bytes = data_len,
            index_bytes,
            "segment published"
        );

        Ok(SegmentMeta {
            generation,
            entry_count: written,
            data_bytes: data_len,
            index_bytes,
        })
    }
}

fn encode_len(len: usize) -> Result<u32, SegmentError> {
    match u32::try_from(len) {
        Ok(n) if n != TOMBSTONE_LEN => Ok(n),
        _ => Err(SegmentError::EntryTooLarge { len }),
    }
}
