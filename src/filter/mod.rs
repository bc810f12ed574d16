//! Per-block membership filters.
//!
//! Each data block gets one filter built from the key encoding of its
//! non-null values, so a point lookup can skip blocks that definitely do not
//! hold the probed value.

pub mod bloom;

pub use bloom::{BloomBlockHeader, BloomFilter};

/// Filter trait for value existence checking
pub trait Filter {
    /// Check if a key may exist (can have false positives, never false negatives)
    fn may_contain(&self, key: &[u8]) -> bool;

    /// Add a key to the filter
    fn add(&mut self, key: &[u8]);

    /// Get the serialized block body of the filter
    fn encode(&self) -> Vec<u8>;

    /// Create a filter from a serialized block body
    fn decode(data: &[u8]) -> crate::Result<Self>
    where
        Self: Sized;
}
