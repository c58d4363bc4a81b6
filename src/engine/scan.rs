//! Lazy range-scan handle returned by [`Engine::range`](super::Engine::range).

use std::iter::FusedIterator;

use crate::entry::Entry;
use crate::merge::MergeIterator;
use crate::order::{KeyOrder, Lexicographic};

use super::EngineError;

/// Ascending, key-deduplicated stream of entries, tombstones included.
///
/// The scan owns its cursors and does not borrow the engine. If the engine
/// is closed while the scan is in progress, the next step that touches a
/// segment yields an [`EngineError::Segment`] wrapping
/// [`SegmentError::ScopeClosed`](crate::SegmentError::ScopeClosed), after
/// which the scan ends.
pub struct Scan<O: KeyOrder = Lexicographic> {
    inner: MergeIterator<O>,
}

impl<O: KeyOrder> Scan<O> {
    pub(crate) fn new(inner: MergeIterator<O>) -> Self {
        Self { inner }
    }
}

impl<O: KeyOrder> Iterator for Scan<O> {
    type Item = Result<Entry, EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|item| item.map_err(EngineError::from))
    }
}

impl<O: KeyOrder> FusedIterator for Scan<O> {}
