//! Segment reader: memory-mapped, read-only access to one generation.
//!
//! A [`SegmentReader`] is opened once, when the engine starts, and keeps both
//! files of its generation mapped until the engine closes. Opening verifies
//! the whole generation up front:
//!
//! 1. Both files exist (else [`SegmentError::Missing`]).
//! 2. The index header checksum, magic and version.
//! 3. The index length matches `header + bloom + entry_count * 8`.
//! 4. The data file length and CRC32 match the index header.
//! 5. Every offset points at a cell that lies inside the data file and the
//!    offsets are strictly increasing.
//! 6. The bloom filter deserializes.
//!
//! After this, lookups and cursors only need to decode cells.

use std::{fs::File, io, marker::PhantomData, path::Path, sync::Arc};

use bloomfilter::Bloom;
use memmap2::Mmap;
use tracing::{debug, trace};

use crate::entry::{Entry, Value};
use crate::order::{HexKey, KeyOrder, Lexicographic};

use super::{
    CELL_HEADER_SIZE, DATA_HEADER_SIZE, INDEX_HEADER_SIZE, IndexHeader, OFFSET_SIZE, SegmentError,
    SegmentFile, SegmentScope, TOMBSTONE_LEN, check_data_header, read_u32, read_u64, segment_path,
};

// ------------------------------------------------------------------------------------------------
// SegmentData: the mapped files of one generation
// ------------------------------------------------------------------------------------------------

/// Both maps of a generation plus the parsed index metadata.
///
/// Shared between a reader and all of its cursors.
struct SegmentData {
    data: Mmap,
    index: Mmap,
    bloom: Bloom<[u8]>,
    entry_count: u64,
    offsets_start: usize,
}

/// A decoded cell, borrowing from the data map.
struct Cell<'a> {
    key: &'a [u8],
    value: Option<&'a [u8]>,
}

impl Cell<'_> {
    fn to_entry(&self) -> Entry {
        let value = match self.value {
            Some(v) => Value::Present(v.to_vec()),
            None => Value::Tombstone,
        };
        Entry {
            key: self.key.to_vec(),
            value,
        }
    }
}

impl SegmentData {
    fn offset(&self, i: u64) -> usize {
        let at = self.offsets_start + i as usize * OFFSET_SIZE;
        read_u64(&self.index, at) as usize
    }

    fn cell_at(&self, offset: usize) -> Result<(Cell<'_>, usize), SegmentError> {
        let data = &self.data[..];
        let header_end = offset
            .checked_add(CELL_HEADER_SIZE)
            .filter(|end| *end <= data.len())
            .ok_or_else(|| SegmentError::Corrupted(format!("cell header out of bounds at {offset}")))?;

        let key_len = read_u32(data, offset) as usize;
        let raw_value_len = read_u32(data, offset + 4);
        let value_len = if raw_value_len == TOMBSTONE_LEN {
            0
        } else {
            raw_value_len as usize
        };

        let key_end = header_end + key_len;
        let cell_end = key_end + value_len;
        if cell_end > data.len() {
            return Err(SegmentError::Corrupted(format!(
                "cell body out of bounds at {offset}"
            )));
        }

        let value = if raw_value_len == TOMBSTONE_LEN {
            None
        } else {
            Some(&data[key_end..cell_end])
        };
        Ok((
            Cell {
                key: &data[header_end..key_end],
                value,
            },
            cell_end,
        ))
    }

    fn cell(&self, i: u64) -> Result<Cell<'_>, SegmentError> {
        self.cell_at(self.offset(i)).map(|(cell, _)| cell)
    }

    /// Index of the first entry whose key is not less than `key`.
    fn lower_bound<O: KeyOrder>(&self, key: &[u8]) -> Result<u64, SegmentError> {
        let (mut lo, mut hi) = (0u64, self.entry_count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if O::compare(self.cell(mid)?.key, key).is_lt() {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }
}

fn open_mapped(path: &Path) -> Result<Mmap, SegmentError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(SegmentError::Missing {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(e.into()),
    };
    // SAFETY: finalized segment files are never modified by the engine.
    Ok(unsafe { Mmap::map(&file)? })
}

// ------------------------------------------------------------------------------------------------
// SegmentReader
// ------------------------------------------------------------------------------------------------

/// Read-only handle to one on-disk generation.
pub struct SegmentReader<O: KeyOrder = Lexicographic> {
    generation: u64,
    inner: Arc<SegmentData>,
    scope: SegmentScope,
    _order: PhantomData<fn() -> O>,
}

impl<O: KeyOrder> SegmentReader<O> {
    /// Opens and verifies generation `generation` in `dir`.
    ///
    /// # Errors
    ///
    /// - [`SegmentError::Missing`] if either file is absent.
    /// - [`SegmentError::ChecksumMismatch`] if the index header or the data
    ///   file fails its CRC32 check.
    /// - [`SegmentError::Corrupted`] for any other structural mismatch.
    /// - [`SegmentError::Bloom`] if the stored bloom filter is unreadable.
    pub fn open(dir: &Path, generation: u64, scope: SegmentScope) -> Result<Self, SegmentError> {
        let index = open_mapped(&segment_path(dir, generation, SegmentFile::Index))?;
        let data = open_mapped(&segment_path(dir, generation, SegmentFile::Data))?;

        let header = IndexHeader::decode(&index)?;

        let bloom_len = header.bloom_len as usize;
        let offsets_start = INDEX_HEADER_SIZE + bloom_len;
        let expected_index_len = usize::try_from(header.entry_count)
            .ok()
            .and_then(|n| n.checked_mul(OFFSET_SIZE))
            .and_then(|n| n.checked_add(offsets_start));
        if expected_index_len != Some(index.len()) {
            return Err(SegmentError::Corrupted(format!(
                "index length {} does not match {} entries",
                index.len(),
                header.entry_count
            )));
        }

        if data.len() as u64 != header.data_len {
            return Err(SegmentError::Corrupted(format!(
                "data length {} does not match header {}",
                data.len(),
                header.data_len
            )));
        }
        check_data_header(&data)?;
        if crc32fast::hash(&data) != header.data_crc {
            return Err(SegmentError::ChecksumMismatch);
        }

        let bloom = Bloom::from_slice(&index[INDEX_HEADER_SIZE..offsets_start])
            .map_err(|e| SegmentError::Bloom(e.to_string()))?;

        let inner = SegmentData {
            data,
            index,
            bloom,
            entry_count: header.entry_count,
            offsets_start,
        };
        verify_offsets(&inner)?;

        debug!(
            generation,
            entries = header.entry_count,
            data_bytes = header.data_len,
            "segment opened"
        );

        Ok(Self {
            generation,
            inner: Arc::new(inner),
            scope,
            _order: PhantomData,
        })
    }

    /// Generation number of this segment.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of entries, tombstones included.
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count
    }

    /// Bloom filter check. `false` means the key is certainly absent.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        self.inner.bloom.check(key)
    }

    /// Point lookup.
    ///
    /// Returns the stored entry (tombstones included) or `None`.
    pub fn lookup(&self, key: &[u8]) -> Result<Option<Entry>, SegmentError> {
        self.scope.ensure_alive()?;

        if !self.may_contain(key) {
            trace!(generation = self.generation, key = %HexKey(key), "bloom negative");
            return Ok(None);
        }

        let pos = self.inner.lower_bound::<O>(key)?;
        if pos == self.inner.entry_count {
            return Ok(None);
        }
        let cell = self.inner.cell(pos)?;
        if O::compare(cell.key, key).is_eq() {
            Ok(Some(cell.to_entry()))
        } else {
            Ok(None)
        }
    }

    /// Lazy ascending cursor over `from <= key < to`.
    ///
    /// `None` on either side means unbounded. The start position is located
    /// on the first call to `next`.
    pub fn range(&self, from: Option<&[u8]>, to: Option<&[u8]>) -> SegmentCursor<O> {
        SegmentCursor {
            inner: Arc::clone(&self.inner),
            scope: self.scope.clone(),
            from: from.map(<[u8]>::to_vec),
            to: to.map(<[u8]>::to_vec),
            pos: None,
            done: false,
            _order: PhantomData,
        }
    }
}

fn verify_offsets(inner: &SegmentData) -> Result<(), SegmentError> {
    let mut expected = DATA_HEADER_SIZE;
    for i in 0..inner.entry_count {
        let offset = inner.offset(i);
        if offset != expected {
            return Err(SegmentError::Corrupted(format!(
                "entry {i} at offset {offset}, expected {expected}"
            )));
        }
        let (_, end) = inner.cell_at(offset)?;
        expected = end;
    }
    if expected != inner.data.len() {
        return Err(SegmentError::Corrupted(format!(
            "{} trailing bytes after last entry",
            inner.data.len() - expected
        )));
    }
    Ok(())
}

// ------------------------------------------------------------------------------------------------
// SegmentCursor
// ------------------------------------------------------------------------------------------------

/// Lazy iterator over a bounded slice of one segment.
///
/// Each step re-checks the [`SegmentScope`]; once the scope is closed the
/// cursor yields a single [`SegmentError::ScopeClosed`] and then ends.
pub struct SegmentCursor<O: KeyOrder = Lexicographic> {
    inner: Arc<SegmentData>,
    scope: SegmentScope,
    from: Option<Vec<u8>>,
    to: Option<Vec<u8>>,
    pos: Option<u64>,
    done: bool,
    _order: PhantomData<fn() -> O>,
}

impl<O: KeyOrder> SegmentCursor<O> {
    fn step(&mut self) -> Result<Option<Entry>, SegmentError> {
        self.scope.ensure_alive()?;

        let pos = match self.pos {
            Some(pos) => pos,
            None => match &self.from {
                Some(from) => self.inner.lower_bound::<O>(from)?,
                None => 0,
            },
        };
        if pos >= self.inner.entry_count {
            return Ok(None);
        }

        let cell = self.inner.cell(pos)?;
        let past_end = self
            .to
            .as_deref()
            .is_some_and(|to| O::compare(cell.key, to).is_ge());
        if past_end {
            return Ok(None);
        }

        let entry = cell.to_entry();
        self.pos = Some(pos + 1);
        Ok(Some(entry))
    }
}

impl<O: KeyOrder> Iterator for SegmentCursor<O> {
    type Item = Result<Entry, SegmentError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
