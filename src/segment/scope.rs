//! Shared liveness flag for every open [`SegmentReader`](super::SegmentReader).
//!
//! The engine owns one scope and hands clones to each reader it opens.
//! Closing the scope invalidates all readers at once: every later lookup and
//! every later cursor step fails with [`SegmentError::ScopeClosed`], even if
//! a cursor still holds its memory maps alive.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use super::SegmentError;

/// Cloneable handle to a single open/closed flag.
#[derive(Debug, Clone)]
pub struct SegmentScope {
    alive: Arc<AtomicBool>,
}

impl Default for SegmentScope {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentScope {
    /// Creates a new, open scope.
    pub fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Returns `true` until [`close`](Self::close) has been called.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Closes the scope.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn close(&self) -> bool {
        self.alive.swap(false, Ordering::AcqRel)
    }

    /// Fails with [`SegmentError::ScopeClosed`] once the scope is closed.
    pub fn ensure_alive(&self) -> Result<(), SegmentError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(SegmentError::ScopeClosed)
        }
    }
}
