//! # Merge Module
//!
//! Reconciles the ordered entry streams of several generations into one
//! ascending, key-deduplicated stream.
//!
//! ## Algorithm
//!
//! A binary heap holds one slot per cursor that still has entries, keyed by
//! the cursor's peeked key. The heap pops the **smallest key** first and,
//! among equal keys, the cursor with the **highest priority** (the memtable,
//! then newer generations). After the winning entry is taken, every other
//! cursor peeking the same key is advanced past it, so stale versions are
//! dropped. Each step costs `O(log k)` for `k` cursors.
//!
//! Tombstones are *not* filtered: a tombstone that wins its key is emitted
//! like any other entry.
//!
//! ## Errors
//!
//! A cursor error is yielded once, after which the iterator is fused.

mod cursor;

#[cfg(test)]
mod tests;

pub use cursor::{CursorSource, PeekableCursor};

use std::{cmp::Ordering, collections::BinaryHeap, iter::FusedIterator, marker::PhantomData};

use tracing::trace;

use crate::entry::Entry;
use crate::order::{KeyOrder, Lexicographic};
use crate::segment::SegmentError;

// ------------------------------------------------------------------------------------------------
// HeapSlot
// ------------------------------------------------------------------------------------------------

struct HeapSlot<O: KeyOrder> {
    key: Vec<u8>,
    priority: u64,
    cursor: usize,
    _order: PhantomData<fn() -> O>,
}

impl<O: KeyOrder> Ord for HeapSlot<O> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: reverse the key order so the smallest key pops first,
        // then let the higher priority win among equal keys.
        O::compare(&other.key, &self.key).then(self.priority.cmp(&other.priority))
    }
}

impl<O: KeyOrder> PartialOrd for HeapSlot<O> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<O: KeyOrder> PartialEq for HeapSlot<O> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<O: KeyOrder> Eq for HeapSlot<O> {}

// ------------------------------------------------------------------------------------------------
// MergeIterator
// ------------------------------------------------------------------------------------------------

/// Lazy k-way merge over [`PeekableCursor`]s.
pub struct MergeIterator<O: KeyOrder = Lexicographic> {
    cursors: Vec<PeekableCursor>,
    heap: BinaryHeap<HeapSlot<O>>,
    primed: bool,
    done: bool,
}

impl<O: KeyOrder> MergeIterator<O> {
    /// Builds a merge over `cursors`. Nothing is read until the first `next`.
    pub fn new(cursors: Vec<PeekableCursor>) -> Self {
        trace!(cursors = cursors.len(), "merge iterator created");
        Self {
            heap: BinaryHeap::with_capacity(cursors.len()),
            cursors,
            primed: false,
            done: false,
        }
    }

    /// Pushes cursor `idx` back onto the heap if it has another entry.
    fn refill(&mut self, idx: usize) -> Result<(), SegmentError> {
        let cursor = &mut self.cursors[idx];
        let priority = cursor.priority();
        if let Some(entry) = cursor.peek()? {
            self.heap.push(HeapSlot {
                key: entry.key.clone(),
                priority,
                cursor: idx,
                _order: PhantomData,
            });
        }
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Entry>, SegmentError> {
        if !self.primed {
            self.primed = true;
            for idx in 0..self.cursors.len() {
                self.refill(idx)?;
            }
        }

        let Some(top) = self.heap.pop() else {
            return Ok(None);
        };
        let Some(entry) = self.cursors[top.cursor].advance() else {
            return Ok(None);
        };
        self.refill(top.cursor)?;

        // Discard older versions of the same key.
        while self
            .heap
            .peek()
            .is_some_and(|slot| O::compare(&slot.key, &entry.key).is_eq())
        {
            if let Some(stale) = self.heap.pop() {
                self.cursors[stale.cursor].advance();
                self.refill(stale.cursor)?;
            }
        }

        Ok(Some(entry))
    }
}

impl<O: KeyOrder> Iterator for MergeIterator<O> {
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

impl<O: KeyOrder> FusedIterator for MergeIterator<O> {}
