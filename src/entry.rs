//! Entries and values.
//!
//! A [`Value`] is an explicit sum type so that an absent key, a tombstone
//! and a zero-length value are three distinct states.

/// The value half of an [`Entry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A live value. May be empty.
    Present(Vec<u8>),

    /// An explicit delete marker that outranks older values for the key.
    Tombstone,
}

impl Value {
    /// Returns `true` for [`Value::Tombstone`].
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Value::Tombstone)
    }

    /// Returns the value bytes, or `None` for a tombstone.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Present(bytes) => Some(bytes),
            Value::Tombstone => None,
        }
    }

    /// Byte length counted towards the storage footprint (0 for tombstones).
    pub fn footprint(&self) -> u64 {
        match self {
            Value::Present(bytes) => bytes.len() as u64,
            Value::Tombstone => 0,
        }
    }
}

/// A key together with its value or tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The key bytes.
    pub key: Vec<u8>,

    /// The value or tombstone.
    pub value: Value,
}

impl Entry {
    /// Creates an entry with a live value.
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Value::Present(value.into()),
        }
    }

    /// Creates a tombstone entry.
    pub fn tombstone(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Value::Tombstone,
        }
    }

    /// Returns `true` if this entry is a tombstone.
    pub fn is_tombstone(&self) -> bool {
        self.value.is_tombstone()
    }

    /// Key length plus value length; tombstones contribute only the key.
    pub fn footprint(&self) -> u64 {
        self.key.len() as u64 + self.value.footprint()
    }

    /// Collapses a tombstone to `None`, keeping live entries.
    pub fn into_live(self) -> Option<Entry> {
        if self.is_tombstone() { None } else { Some(self) }
    }
}
