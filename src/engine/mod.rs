//! # Generational Storage Engine
//!
//! Binds the memtable, the on-disk segments and the merge iterator into one
//! key-value store with a single-shot lifecycle.
//!
//! ## Design Overview
//!
//! Data lives in generations, queried newest-first:
//!
//! 1. **Memtable**: the implicit generation `G`, receiving every write.
//! 2. **Segments**: generations `G-1 .. 0`, one [`SegmentReader`] each,
//!    opened when the engine starts and kept until it closes.
//!
//! There is no background flushing. The memtable is written to disk exactly
//! once, by [`Engine::close`], which appends generation `G`.
//!
//! ## Reads
//!
//! - [`Engine::get`] returns the entry from the highest generation holding
//!   the key, collapsing a tombstone to `None`.
//! - [`Engine::range`] merges one cursor per generation into a lazy
//!   [`Scan`]. Tombstones are **not** filtered from scans.
//!
//! ## Concurrency Model
//!
//! The reader set sits behind a `crossbeam` [`ShardedLock`]. `get`, `range`
//! and `upsert` hold it shared; `close` holds it exclusively while it drops
//! the readers and writes the new generation. The open check runs inside the
//! shared section, so no write can land after the close has flushed.
//!
//! ## Lifecycle
//!
//! `Open -> Closed`. Closing first invalidates the shared [`SegmentScope`],
//! which makes every outstanding segment cursor fail with
//! [`SegmentError::ScopeClosed`]. From then on every operation
//! except `close` returns [`EngineError::Closed`].

mod scan;

#[cfg(test)]
mod tests;

pub use scan::Scan;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::sync::{ShardedLock, ShardedLockReadGuard, ShardedLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::entry::Entry;
use crate::memtable::MemTable;
use crate::merge::{MergeIterator, PeekableCursor};
use crate::order::{HexKey, KeyOrder, Lexicographic};
use crate::segment::{
    self, SegmentError, SegmentMeta, SegmentReader, SegmentScope, SegmentWriter,
};

/// Bloom filter false-positive rate used when none is configured.
pub const DEFAULT_BLOOM_FALSE_POSITIVE_RATE: f64 = 0.01;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Error originating from a segment reader, writer or cursor.
    #[error("Segment error: {0}")]
    Segment(#[from] SegmentError),

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation is not offered by this engine.
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// The engine has been closed.
    #[error("Engine is closed")]
    Closed,

    /// Invalid configuration parameter.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Internal invariant violation (poisoned lock, unexpected state, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Configuration for an [`Engine`] instance.
///
/// # Example
///
/// ```rust
/// use genkv::EngineConfig;
///
/// // Purely in memory: nothing is read or written on disk.
/// let config = EngineConfig::default();
/// assert!(config.base_path.is_none());
///
/// // Persistent, with a tighter bloom filter.
/// let config = EngineConfig {
///     bloom_false_positive_rate: 0.001,
///     ..EngineConfig::at("/tmp/genkv")
/// };
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding the segment files.
    ///
    /// `None` runs the engine purely in memory: no generations are loaded
    /// and closing discards the memtable.
    pub base_path: Option<PathBuf>,

    /// Target false-positive rate of each new segment's bloom filter.
    ///
    /// Default: 0.01. Must be in (0.0, 1.0).
    pub bloom_false_positive_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_path: None,
            bloom_false_positive_rate: DEFAULT_BLOOM_FALSE_POSITIVE_RATE,
        }
    }
}

impl EngineConfig {
    /// Persistent configuration rooted at `path`.
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            base_path: Some(path.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    /// Validates all configuration parameters.
    pub fn validate(&self) -> Result<(), EngineError> {
        let rate = self.bloom_false_positive_rate;
        if !(rate > 0.0 && rate < 1.0) {
            return Err(EngineError::InvalidConfig(
                "bloom_false_positive_rate must be in (0.0, 1.0)".into(),
            ));
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Engine
// ------------------------------------------------------------------------------------------------

struct EngineInner<O: KeyOrder> {
    /// Readers for generations `0 .. G`, oldest first.
    readers: Vec<SegmentReader<O>>,
}

/// The generational storage engine handle.
///
/// `Engine` is `Send + Sync`; share it across threads with `Arc<Engine>`.
pub struct Engine<O: KeyOrder = Lexicographic> {
    section: ShardedLock<EngineInner<O>>,
    memtable: MemTable<O>,
    footprint: AtomicU64,
    scope: SegmentScope,
    generations: u64,
    config: EngineConfig,
}

impl<O: KeyOrder> std::fmt::Debug for Engine<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("base_path", &self.config.base_path)
            .field("generations", &self.generations)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl<O: KeyOrder> Engine<O> {
    // --------------------------------------------------------------------------------------------
    // Lock helpers
    // --------------------------------------------------------------------------------------------

    fn read_section(&self) -> Result<ShardedLockReadGuard<'_, EngineInner<O>>, EngineError> {
        self.section
            .read()
            .map_err(|_| EngineError::Internal("ShardedLock poisoned".into()))
    }

    fn write_section(&self) -> Result<ShardedLockWriteGuard<'_, EngineInner<O>>, EngineError> {
        self.section
            .write()
            .map_err(|_| EngineError::Internal("ShardedLock poisoned".into()))
    }

    /// Returns `Err(EngineError::Closed)` once `close` has started.
    fn check_open(&self) -> Result<(), EngineError> {
        if self.scope.is_alive() {
            Ok(())
        } else {
            Err(EngineError::Closed)
        }
    }

    // --------------------------------------------------------------------------------------------
    // Lifecycle
    // --------------------------------------------------------------------------------------------

    /// Opens an engine.
    ///
    /// With a base path, the generation count `G` is the number of segment
    /// files in the directory divided by two, and generations `0 .. G` are
    /// opened oldest first. A missing directory means `G = 0`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidConfig`] for an out-of-range parameter.
    /// - [`EngineError::Segment`] if any existing generation is missing a
    ///   file or fails verification.
    /// - [`EngineError::Io`] if the directory cannot be listed.
    pub fn open(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let scope = SegmentScope::new();
        let mut readers = Vec::new();

        if let Some(base) = &config.base_path {
            let generations = match segment::discover_generations(base) {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
                Err(e) => return Err(e.into()),
            };
            for generation in 0..generations {
                readers.push(SegmentReader::open(base, generation, scope.clone())?);
            }
        }

        let generations = readers.len() as u64;
        info!(
            path = ?config.base_path,
            generations,
            "engine opened"
        );

        Ok(Self {
            section: ShardedLock::new(EngineInner { readers }),
            memtable: MemTable::new(),
            footprint: AtomicU64::new(0),
            scope,
            generations,
            config,
        })
    }

    /// Closes the engine, persisting the memtable as a new generation.
    ///
    /// 1. Invalidate the segment scope; outstanding cursors start failing.
    /// 2. Enter the exclusive section and drop every segment reader.
    /// 3. With a base path, write the whole memtable as generation `G`.
    /// 4. Clear the memtable.
    ///
    /// Only the first call does any work; later calls return `Ok(())`.
    /// If writing the generation fails, that call returns the error and
    /// nothing is published.
    pub fn close(&self) -> Result<(), EngineError> {
        if !self.scope.close() {
            debug!("engine already closed");
            return Ok(());
        }

        let mut inner = self.write_section()?;

        // Release the mappings before the new generation is allocated.
        inner.readers.clear();

        match &self.config.base_path {
            Some(base) => {
                let meta = self.persist_memtable(base)?;
                info!(
                    generation = meta.generation,
                    entries = meta.entry_count,
                    data_bytes = meta.data_bytes,
                    index_bytes = meta.index_bytes,
                    "engine closed"
                );
            }
            None => info!(entries = self.memtable.len(), "in-memory engine closed"),
        }

        self.memtable.clear();
        self.footprint.store(0, Ordering::Release);
        Ok(())
    }

    /// Writes the memtable as generation `G`. Caller holds the exclusive section.
    fn persist_memtable(&self, base: &Path) -> Result<SegmentMeta, EngineError> {
        fs::create_dir_all(base)?;

        let entry_count = self.memtable.len() as u64;
        let footprint = self.footprint.load(Ordering::Acquire);
        let mut writer = SegmentWriter::<O>::create(
            base,
            self.generations,
            entry_count,
            footprint,
            self.config.bloom_false_positive_rate,
        )?;
        for entry in self.memtable.iter() {
            writer.write_entry(&entry)?;
        }
        Ok(writer.finish()?)
    }

    /// Explicit flushing is not offered; the memtable is flushed by
    /// [`close`](Self::close) only.
    pub fn flush(&self) -> Result<(), EngineError> {
        Err(EngineError::Unsupported("flush"))
    }

    // --------------------------------------------------------------------------------------------
    // Reads
    // --------------------------------------------------------------------------------------------

    /// Looks up a single key.
    ///
    /// The memtable is consulted first, then generations `G-1 .. 0`. The
    /// first entry found decides: a live value is returned, a tombstone
    /// yields `None`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>, EngineError> {
        let inner = self.read_section()?;
        self.check_open()?;
        trace!(key = %HexKey(key), "engine get");

        if let Some(entry) = self.memtable.get(key) {
            return Ok(entry.into_live());
        }
        for reader in inner.readers.iter().rev() {
            if let Some(entry) = reader.lookup(key)? {
                return Ok(entry.into_live());
            }
        }
        Ok(None)
    }

    /// Lazily scans `from <= key < to` across all generations.
    ///
    /// `None` on either side means unbounded. Each key appears once, with
    /// its entry from the highest generation holding it; tombstones are
    /// included.
    pub fn range(&self, from: Option<&[u8]>, to: Option<&[u8]>) -> Result<Scan<O>, EngineError> {
        let inner = self.read_section()?;
        self.check_open()?;
        trace!(
            from = ?from.map(HexKey),
            to = ?to.map(HexKey),
            "engine range"
        );

        let mut cursors: Vec<PeekableCursor> = inner
            .readers
            .iter()
            .map(|r| PeekableCursor::segment(r.generation(), r.range(from, to)))
            .collect();
        cursors.push(PeekableCursor::memtable(self.memtable.view(from, to)));

        Ok(Scan::new(MergeIterator::new(cursors)))
    }

    // --------------------------------------------------------------------------------------------
    // Writes
    // --------------------------------------------------------------------------------------------

    /// Inserts or overwrites an entry. A tombstone entry deletes the key.
    pub fn upsert(&self, entry: Entry) -> Result<(), EngineError> {
        let _inner = self.read_section()?;
        self.check_open()?;
        trace!(
            key = %HexKey(&entry.key),
            tombstone = entry.is_tombstone(),
            "engine upsert"
        );

        self.footprint
            .fetch_add(entry.footprint(), Ordering::AcqRel);
        self.memtable.put(entry);
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Introspection
    // --------------------------------------------------------------------------------------------

    /// Number of on-disk generations loaded at open.
    pub fn generation_count(&self) -> u64 {
        self.generations
    }

    /// Number of distinct keys in the memtable.
    pub fn memtable_len(&self) -> usize {
        self.memtable.len()
    }

    /// Running sum of key and value bytes written since open.
    ///
    /// Overwrites are counted again, so this is an upper bound on the size
    /// of the memtable's contents.
    pub fn footprint(&self) -> u64 {
        self.footprint.load(Ordering::Acquire)
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        !self.scope.is_alive()
    }

    /// Configuration the engine was opened with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl<O: KeyOrder> Drop for Engine<O> {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.close() {
            warn!(error = %e, "close on drop failed");
        }
    }
}
