//! Shared helpers for segment tests.

use std::path::Path;

use tracing_subscriber::{EnvFilter, fmt::Subscriber};

use crate::entry::Entry;
use crate::order::{KeyOrder, Lexicographic};
use crate::segment::{SegmentMeta, SegmentReader, SegmentScope, SegmentWriter};

pub(crate) const FP_RATE: f64 = 0.01;

pub(crate) fn init_tracing() {
    let _ = Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Writes `entries` (already sorted) as `generation` with an exact footprint.
pub(crate) fn write_segment_with<O: KeyOrder>(
    dir: &Path,
    generation: u64,
    entries: &[Entry],
) -> SegmentMeta {
    let footprint = entries.iter().map(Entry::footprint).sum();
    let mut writer =
        SegmentWriter::<O>::create(dir, generation, entries.len() as u64, footprint, FP_RATE)
            .unwrap();
    for entry in entries {
        writer.write_entry(entry).unwrap();
    }
    writer.finish().unwrap()
}

pub(crate) fn write_segment(dir: &Path, generation: u64, entries: &[Entry]) -> SegmentMeta {
    write_segment_with::<Lexicographic>(dir, generation, entries)
}

pub(crate) fn open_segment(dir: &Path, generation: u64) -> SegmentReader {
    SegmentReader::open(dir, generation, SegmentScope::new()).unwrap()
}

pub(crate) fn put(key: &str, value: &str) -> Entry {
    Entry::new(key.as_bytes(), value.as_bytes())
}

pub(crate) fn del(key: &str) -> Entry {
    Entry::tombstone(key.as_bytes())
}

/// `count` sorted entries `key00000 .. key{count-1}`, every fifth a tombstone.
pub(crate) fn sequential(count: usize) -> Vec<Entry> {
    (0..count)
        .map(|i| {
            let key = format!("key{i:05}");
            if i % 5 == 4 {
                Entry::tombstone(key.into_bytes())
            } else {
                Entry::new(key.into_bytes(), format!("value{i}").into_bytes())
            }
        })
        .collect()
}
