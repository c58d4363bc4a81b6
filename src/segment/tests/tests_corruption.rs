//! Segment corruption tests.
//!
//! Every structural defect must be reported by `SegmentReader::open`, before
//! any lookup runs.
//!
//! ## On-disk layout reference
//! ```text
//! .data  : [MAGIC 4B][VERSION 4B][cells ...]
//! .index : [MAGIC 4B][VERSION 4B][COUNT 8B][DATA_LEN 8B][DATA_CRC 4B]
//!          [BLOOM_LEN 4B][HEADER_CRC 4B][bloom][offsets]
//! ```

#[cfg(test)]
mod tests {
    use std::fs::{self, OpenOptions};
    use std::path::Path;

    use tempfile::TempDir;

    use crate::segment::tests::helpers::{init_tracing, sequential, write_segment};
    use crate::segment::{
        IndexHeader, SegmentError, SegmentFile, SegmentReader, SegmentScope, segment_path,
    };

    fn open(dir: &Path) -> Result<SegmentReader, SegmentError> {
        SegmentReader::open(dir, 0, SegmentScope::new())
    }

    fn flip_byte(path: &Path, at: usize) {
        let mut bytes = fs::read(path).unwrap();
        bytes[at] ^= 0xFF;
        fs::write(path, bytes).unwrap();
    }

    fn setup() -> TempDir {
        init_tracing();
        let tmp = TempDir::new().unwrap();
        write_segment(tmp.path(), 0, &sequential(50));
        tmp
    }

    /// # Scenario
    /// Remove one file of the generation.
    ///
    /// # Expected behavior
    /// `Missing` naming the absent path.
    #[test]
    fn missing_file() {
        let tmp = setup();
        let data = segment_path(tmp.path(), 0, SegmentFile::Data);
        fs::remove_file(&data).unwrap();

        match open(tmp.path()) {
            Err(SegmentError::Missing { path }) => assert_eq!(path, data),
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    /// # Scenario
    /// Flip one byte inside the cells of the data file.
    ///
    /// # Expected behavior
    /// The data CRC check fails.
    #[test]
    fn data_byte_flip() {
        let tmp = setup();
        flip_byte(&segment_path(tmp.path(), 0, SegmentFile::Data), 20);
        assert!(matches!(open(tmp.path()), Err(SegmentError::ChecksumMismatch)));
    }

    /// # Scenario
    /// Flip one byte of the index header.
    ///
    /// # Expected behavior
    /// The header CRC check fails.
    #[test]
    fn index_header_byte_flip() {
        let tmp = setup();
        flip_byte(&segment_path(tmp.path(), 0, SegmentFile::Index), 10);
        assert!(matches!(open(tmp.path()), Err(SegmentError::ChecksumMismatch)));
    }

    /// # Scenario
    /// Truncate the index file by one offset.
    ///
    /// # Expected behavior
    /// The length check fails with `Corrupted`.
    #[test]
    fn truncated_index() {
        let tmp = setup();
        let path = segment_path(tmp.path(), 0, SegmentFile::Index);
        let len = fs::metadata(&path).unwrap().len();
        OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(len - 8)
            .unwrap();
        assert!(matches!(open(tmp.path()), Err(SegmentError::Corrupted(_))));
    }

    /// # Scenario
    /// Append garbage to the data file.
    ///
    /// # Expected behavior
    /// The data length no longer matches the header: `Corrupted`.
    #[test]
    fn extended_data() {
        let tmp = setup();
        let path = segment_path(tmp.path(), 0, SegmentFile::Data);
        let mut bytes = fs::read(&path).unwrap();
        bytes.extend_from_slice(b"garbage");
        fs::write(&path, bytes).unwrap();
        assert!(matches!(open(tmp.path()), Err(SegmentError::Corrupted(_))));
    }

    /// # Scenario
    /// Index file shorter than its fixed header.
    ///
    /// # Expected behavior
    /// `Corrupted`.
    #[test]
    fn tiny_index() {
        let tmp = setup();
        fs::write(segment_path(tmp.path(), 0, SegmentFile::Index), b"GKVI").unwrap();
        assert!(matches!(open(tmp.path()), Err(SegmentError::Corrupted(_))));
    }

    /// # Scenario
    /// Rewrite the index with a valid header checksum but a wrong magic.
    ///
    /// # Expected behavior
    /// `Corrupted` rather than a checksum error.
    #[test]
    fn wrong_index_magic() {
        let tmp = setup();
        let path = segment_path(tmp.path(), 0, SegmentFile::Index);
        let mut bytes = fs::read(&path).unwrap();
        let header = IndexHeader::decode(&bytes).unwrap();
        let mut encoded = header.encode();
        encoded[0] = b'X';
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&encoded[..32]);
        encoded[32..36].copy_from_slice(&hasher.finalize().to_le_bytes());
        bytes[..36].copy_from_slice(&encoded);
        fs::write(&path, bytes).unwrap();

        assert!(matches!(open(tmp.path()), Err(SegmentError::Corrupted(_))));
    }

    /// # Scenario
    /// Swap two offsets in the index and fix up nothing else.
    ///
    /// # Expected behavior
    /// Offset verification fails with `Corrupted`.
    #[test]
    fn shuffled_offsets() {
        let tmp = setup();
        let path = segment_path(tmp.path(), 0, SegmentFile::Index);
        let mut bytes = fs::read(&path).unwrap();
        let header = IndexHeader::decode(&bytes).unwrap();
        let start = 36 + header.bloom_len as usize;
        let (first, second) = bytes[start..start + 16].split_at_mut(8);
        first.swap_with_slice(second);
        fs::write(&path, bytes).unwrap();

        assert!(matches!(open(tmp.path()), Err(SegmentError::Corrupted(_))));
    }
}
