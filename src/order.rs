//! Key ordering.
//!
//! Every ordered structure in the crate (memtable, segment index search,
//! segment writer, merge heap) is parameterised over a [`KeyOrder`]. The
//! comparator is a pure function selected at the type level, so the
//! ordering is injected rather than hardwired to `Ord` on byte slices.

use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;

/// A total order over byte-sequence keys.
///
/// Implementations must be pure and consistent: the same pair of keys
/// always compares the same way, and the relation is a total order.
pub trait KeyOrder: Send + Sync + 'static {
    /// Compares two keys.
    fn compare(a: &[u8], b: &[u8]) -> Ordering;
}

/// Lexicographic order by unsigned byte value.
///
/// When one key is a proper prefix of the other, the shorter key sorts
/// first.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lexicographic;

impl KeyOrder for Lexicographic {
    #[inline]
    fn compare(a: &[u8], b: &[u8]) -> Ordering {
        // `[u8]` compares element-wise as unsigned bytes, then by length.
        a.cmp(b)
    }
}

// ------------------------------------------------------------------------------------------------
// OrderedKey: owned key whose `Ord` delegates to a `KeyOrder`
// ------------------------------------------------------------------------------------------------

/// An owned key that orders itself with `O`.
///
/// Used as the key type of ordered containers that require `Ord`.
pub(crate) struct OrderedKey<O> {
    bytes: Vec<u8>,
    _order: PhantomData<fn() -> O>,
}

impl<O> OrderedKey<O> {
    pub(crate) fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            _order: PhantomData,
        }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl<O> Clone for OrderedKey<O> {
    fn clone(&self) -> Self {
        Self::new(self.bytes.clone())
    }
}

impl<O> fmt::Debug for OrderedKey<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrderedKey({})", HexKey(&self.bytes))
    }
}

impl<O: KeyOrder> PartialEq for OrderedKey<O> {
    fn eq(&self, other: &Self) -> bool {
        O::compare(&self.bytes, &other.bytes) == Ordering::Equal
    }
}

impl<O: KeyOrder> Eq for OrderedKey<O> {}

impl<O: KeyOrder> PartialOrd for OrderedKey<O> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<O: KeyOrder> Ord for OrderedKey<O> {
    fn cmp(&self, other: &Self) -> Ordering {
        O::compare(&self.bytes, &other.bytes)
    }
}

// ------------------------------------------------------------------------------------------------
// Tracing helper
// ------------------------------------------------------------------------------------------------

/// Renders a key as hex for log output, truncating long keys.
pub(crate) struct HexKey<'a>(pub(crate) &'a [u8]);

impl fmt::Display for HexKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() <= 32 {
            for byte in self.0 {
                write!(f, "{:02x}", byte)?;
            }
        } else {
            for byte in &self.0[..16] {
                write!(f, "{:02x}", byte)?;
            }
            write!(f, "...[{} bytes]", self.0.len())?;
        }
        Ok(())
    }
}

impl fmt::Debug for HexKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
