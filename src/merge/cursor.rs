//! One-entry lookahead over a single generation's ordered entries.

use tracing::trace;

use crate::entry::Entry;
use crate::memtable::MemTableView;
use crate::order::KeyOrder;
use crate::segment::{SegmentCursor, SegmentError};

/// Boxed source stream of a cursor.
type Source = Box<dyn Iterator<Item = Result<Entry, SegmentError>> + Send>;

/// Where a cursor's entries come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorSource {
    /// The live memtable. Outranks every segment.
    MemTable,

    /// An on-disk segment. Newer generations outrank older ones.
    Segment {
        /// Generation number of the segment.
        generation: u64,
    },
}

impl CursorSource {
    /// Priority used to break ties between equal keys: higher wins.
    pub fn priority(self) -> u64 {
        match self {
            CursorSource::MemTable => u64::MAX,
            CursorSource::Segment { generation } => generation,
        }
    }
}

/// A cursor that can look at its next entry without consuming it.
///
/// A source error is reported once by [`peek`](Self::peek); after that the
/// cursor behaves as exhausted.
pub struct PeekableCursor {
    source: CursorSource,
    inner: Source,
    peeked: Option<Entry>,
    exhausted: bool,
}

impl PeekableCursor {
    /// Wraps an arbitrary ordered entry stream.
    pub fn new<I>(source: CursorSource, inner: I) -> Self
    where
        I: Iterator<Item = Result<Entry, SegmentError>> + Send + 'static,
    {
        Self {
            source,
            inner: Box::new(inner),
            peeked: None,
            exhausted: false,
        }
    }

    /// Cursor over a bounded memtable view.
    pub fn memtable<O: KeyOrder>(view: MemTableView<O>) -> Self {
        Self::new(CursorSource::MemTable, view.map(Ok))
    }

    /// Cursor over a bounded range of one segment.
    pub fn segment<O: KeyOrder>(generation: u64, cursor: SegmentCursor<O>) -> Self {
        Self::new(CursorSource::Segment { generation }, cursor)
    }

    /// Generation this cursor reads from.
    pub fn source(&self) -> CursorSource {
        self.source
    }

    /// Tie-break priority of [`source`](Self::source); higher wins.
    pub fn priority(&self) -> u64 {
        self.source.priority()
    }

    /// Returns the next entry without consuming it.
    pub fn peek(&mut self) -> Result<Option<&Entry>, SegmentError> {
        if self.peeked.is_none() && !self.exhausted {
            match self.inner.next() {
                Some(Ok(entry)) => self.peeked = Some(entry),
                Some(Err(e)) => {
                    trace!(source = ?self.source, error = %e, "cursor failed");
                    self.exhausted = true;
                    return Err(e);
                }
                None => self.exhausted = true,
            }
        }
        Ok(self.peeked.as_ref())
    }

    /// Consumes the entry returned by the last successful [`peek`](Self::peek).
    pub fn advance(&mut self) -> Option<Entry> {
        self.peeked.take()
    }
}
