//! # Memtable Module
//!
//! The mutable, in-memory generation of the engine. It always has the
//! highest priority: anything written here shadows every on-disk segment.
//!
//! ## Features
//! - Lock-free concurrent readers **and** writers (`crossbeam-skiplist`)
//! - Insert-or-overwrite semantics with explicit tombstones
//! - Bounded ascending views with inclusive start and exclusive end
//! - Views own a handle to the table and walk it lazily, so they may
//!   outlive the call that created them
//!
//! ## Ordering
//!
//! Keys are ordered by the [`KeyOrder`] type parameter. The skip list
//! stores [`OrderedKey`] values whose `Ord` delegates to that comparator.
//!
//! ## Consistency
//!
//! Each key owns one skip-list node for the lifetime of the table. The
//! value lives in a per-key `RwLock` cell and an overwrite replaces it in
//! place, so a key that has been written is never missing from `get` or a
//! view, not even while it is being overwritten.
//!
//! Views are *weakly consistent*: an entry inserted concurrently with a
//! running view may or may not be observed, but every observed entry is
//! reported in ascending key order and at most once.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{
    cmp::Ordering,
    ops::Bound,
    sync::{Arc, PoisonError, RwLock},
};

use crossbeam_skiplist::SkipMap;
use tracing::{debug, trace};

use crate::entry::{Entry, Value};
use crate::order::{HexKey, KeyOrder, Lexicographic, OrderedKey};

// ------------------------------------------------------------------------------------------------
// MemTable
// ------------------------------------------------------------------------------------------------

type Cell = RwLock<Value>;

/// Copies the value out of a cell. A poisoned cell still holds a whole value.
fn read_cell(cell: &Cell) -> Value {
    cell.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn write_cell(cell: &Cell, value: Value) {
    *cell.write().unwrap_or_else(PoisonError::into_inner) = value;
}

/// A concurrent, ordered, in-memory key → value table.
///
/// Cloning a `MemTable` yields another handle to the same table.
pub struct MemTable<O: KeyOrder = Lexicographic> {
    map: Arc<SkipMap<OrderedKey<O>, Cell>>,
}

impl<O: KeyOrder> Clone for MemTable<O> {
    fn clone(&self) -> Self {
        Self {
            map: Arc::clone(&self.map),
        }
    }
}

impl<O: KeyOrder> Default for MemTable<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: KeyOrder> MemTable<O> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            map: Arc::new(SkipMap::new()),
        }
    }

    /// Inserts an entry, replacing any previous value for the key.
    pub fn put(&self, entry: Entry) {
        trace!(
            key = %HexKey(&entry.key),
            tombstone = entry.is_tombstone(),
            "memtable put"
        );
        let key = OrderedKey::new(entry.key);
        if let Some(existing) = self.map.get(&key) {
            write_cell(existing.value(), entry.value);
            return;
        }
        // A racing first insert of the same key may win; the write below
        // then lands in its cell.
        let node = self
            .map
            .get_or_insert_with(key, || RwLock::new(entry.value.clone()));
        write_cell(node.value(), entry.value);
    }

    /// Returns the current entry for `key`, tombstones included.
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        let probe = OrderedKey::new(key.to_vec());
        self.map.get(&probe).map(|e| Entry {
            key: e.key().as_bytes().to_vec(),
            value: read_cell(e.value()),
        })
    }

    /// Returns an ascending view over `from <= key < to`.
    ///
    /// `None` on either side means unbounded.
    pub fn view(&self, from: Option<&[u8]>, to: Option<&[u8]>) -> MemTableView<O> {
        let next = match from {
            Some(k) => Bound::Included(OrderedKey::new(k.to_vec())),
            None => Bound::Unbounded,
        };
        MemTableView {
            map: Arc::clone(&self.map),
            next,
            end: to.map(|k| k.to_vec()),
            done: false,
        }
    }

    /// Returns an ascending view over the whole table.
    pub fn iter(&self) -> MemTableView<O> {
        self.view(None, None)
    }

    /// Number of distinct keys currently held.
    ///
    /// Exact only while no writer is active.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        debug!(entries = self.map.len(), "clearing memtable");
        self.map.clear();
    }
}

// ------------------------------------------------------------------------------------------------
// MemTableView
// ------------------------------------------------------------------------------------------------

/// Lazy ascending iterator over a bounded slice of a [`MemTable`].
///
/// Each step re-seeks the skip list just past the last returned key, so
/// the view never borrows the table and concurrent writers are never
/// blocked.
pub struct MemTableView<O: KeyOrder = Lexicographic> {
    map: Arc<SkipMap<OrderedKey<O>, Cell>>,
    next: Bound<OrderedKey<O>>,
    end: Option<Vec<u8>>,
    done: bool,
}

impl<O: KeyOrder> Iterator for MemTableView<O> {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let found = match &self.next {
            Bound::Unbounded => self.map.front(),
            Bound::Included(k) => self.map.lower_bound(Bound::Included(k)),
            Bound::Excluded(k) => self.map.lower_bound(Bound::Excluded(k)),
        };

        let Some(found) = found else {
            self.done = true;
            return None;
        };

        let past_end = self
            .end
            .as_deref()
            .is_some_and(|end| O::compare(found.key().as_bytes(), end) != Ordering::Less);
        if past_end {
            self.done = true;
            return None;
        }

        let key = found.key().clone();
        let entry = Entry {
            key: key.as_bytes().to_vec(),
            value: read_cell(found.value()),
        };
        self.next = Bound::Excluded(key);
        Some(entry)
    }
}
