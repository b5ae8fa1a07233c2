use std::cmp::Ordering;

use crate::storage::page::page_layout::KEY_SIZE;

/// Fixed-width index key. The byte string is opaque to the storage layer;
/// ordering comes exclusively from a [`KeyComparator`], never from the raw
/// bytes (little-endian integers do not sort lexicographically).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Key(pub [u8; KEY_SIZE]);

impl Key {
    pub fn from_u64(n: u64) -> Self {
        Key(n.to_le_bytes())
    }

    pub fn as_u64(&self) -> u64 {
        u64::from_le_bytes(self.0)
    }

    /// The all-zero key used for the sentinel slot of internal nodes.
    pub fn zeroed() -> Self {
        Key([0u8; KEY_SIZE])
    }
}

/// Location of a tuple in the table heap: page number plus slot index.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RecordId {
    pub page_id: u32,
    pub slot: u32,
}

impl RecordId {
    pub fn new(page_id: u32, slot: u32) -> Self {
        RecordId { page_id, slot }
    }
}

/// Key ordering strategy the tree is parameterised over.
pub trait KeyComparator: Clone + Send + Sync {
    fn compare(&self, a: &Key, b: &Key) -> Ordering;
}

/// Compares keys as little-endian unsigned 64-bit integers.
#[derive(Clone, Copy, Default)]
pub struct U64Comparator;

impl KeyComparator for U64Comparator {
    fn compare(&self, a: &Key, b: &Key) -> Ordering {
        a.as_u64().cmp(&b.as_u64())
    }
}
