//! # genkv
//!
//! The core of a generational, log-structured key-value store. Writes land
//! in a concurrent in-memory skip list; closing the engine persists it as a
//! new immutable on-disk generation. Reads consult generations from newest
//! to oldest, and range scans merge all of them lazily.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use genkv::{Engine, EngineConfig, Entry};
//!
//! let engine: Engine = Engine::open(EngineConfig::at("/tmp/genkv")).unwrap();
//!
//! // Write
//! engine.upsert(Entry::new(*b"hello", *b"world")).unwrap();
//!
//! // Read
//! let entry = engine.get(b"hello").unwrap().unwrap();
//! assert_eq!(entry.value.as_bytes(), Some(&b"world"[..]));
//!
//! // Delete
//! engine.upsert(Entry::tombstone(*b"hello")).unwrap();
//! assert_eq!(engine.get(b"hello").unwrap(), None);
//!
//! // Scan `[a, c)`; tombstones are part of the stream
//! for entry in engine.range(Some(&b"a"[..]), Some(&b"c"[..])).unwrap() {
//!     let entry = entry.unwrap();
//!     println!("{:?} tombstone={}", entry.key, entry.is_tombstone());
//! }
//!
//! // Persist the memtable as the next generation
//! engine.close().unwrap();
//! ```
//!
//! ## Features
//!
//! - **Lock-free memtable** on `crossbeam-skiplist`, safe under concurrent
//!   writers and readers.
//! - **Memory-mapped segments** with a per-generation bloom filter and CRC32
//!   verification at open.
//! - **Atomic publishing**: a generation becomes visible only once both of
//!   its files are complete.
//! - **Lazy k-way merge** with newest-generation-wins deduplication.
//! - **Pluggable key order** through the [`KeyOrder`] trait.

pub mod engine;
pub mod entry;
pub mod memtable;
pub mod merge;
pub mod order;
pub mod segment;

pub use engine::{DEFAULT_BLOOM_FALSE_POSITIVE_RATE, Engine, EngineConfig, EngineError, Scan};
pub use entry::{Entry, Value};
pub use memtable::{MemTable, MemTableView};
pub use merge::{CursorSource, MergeIterator, PeekableCursor};
pub use order::{KeyOrder, Lexicographic};
pub use segment::{SegmentError, SegmentMeta, SegmentReader, SegmentScope, SegmentWriter};
