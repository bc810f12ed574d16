//! B-tree index shared by the position index and the value index.
//!
//! Keys are byte strings compared lexicographically: big-endian ordinals for
//! the position index and memcomparable value keys for the value index.
//! Each index block body is
//!
//! ```text
//! [key_len: varint][key][offset: u64][size: u32]   // num_entries times
//! [num_entries: u32][type: u8]                      // IndexBlockTrailer
//! ```
//!
//! Leaf entries point at data blocks and are keyed by the block's first
//! ordinal or first value. Internal entries point at child index blocks and
//! are keyed by the child's first key. The tree is bulk-built bottom-up since
//! keys only ever arrive in increasing order; it is never rebalanced.

use crate::cfile::encoding::{put_varint, ByteReader};
use crate::cfile::footer::{BTreeInfo, BlockPointer};
use crate::error::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;

/// Bound on descent depth; a well-formed tree over u64 ordinals is far shallower.
const MAX_TREE_DEPTH: usize = 64;

/// How an index block's entries are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IndexBlockType {
    /// Entries point at data blocks.
    Leaf = 0,
    /// Entries point at child index blocks.
    Internal = 1,
}

impl IndexBlockType {
    /// Convert from the on-disk tag
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(IndexBlockType::Leaf),
            1 => Some(IndexBlockType::Internal),
            _ => None,
        }
    }
}

/// Tag trailing an index block's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBlockTrailer {
    /// Number of entries in the body
    pub num_entries: u32,
    /// Leaf or internal
    pub block_type: IndexBlockType,
}

impl IndexBlockTrailer {
    /// Encoded size of the trailer
    pub const ENCODED_LEN: usize = 5;

    fn encode_to(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.num_entries);
        buf.put_u8(self.block_type as u8);
    }

    fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let num_entries = reader.get_u32()?;
        let tag = reader.get_u8()?;
        let block_type = IndexBlockType::from_u8(tag)
            .ok_or_else(|| Error::corruption(format!("invalid index block type {}", tag)))?;
        Ok(Self { num_entries, block_type })
    }
}

/// One search key and the block it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Search key
    pub key: Vec<u8>,
    /// Target block
    pub pointer: BlockPointer,
}

impl IndexEntry {
    /// Create a new IndexEntry
    pub fn new(key: Vec<u8>, pointer: BlockPointer) -> Self {
        Self { key, pointer }
    }

    fn encoded_len(&self) -> usize {
        self.key.len() + 10 + BlockPointer::ENCODED_LEN
    }
}

/// Serialize one index block body.
pub fn encode_index_block(block_type: IndexBlockType, entries: &[IndexEntry]) -> Result<Bytes> {
    let body: usize = entries.iter().map(IndexEntry::encoded_len).sum();
    let mut buf = BytesMut::with_capacity(body + IndexBlockTrailer::ENCODED_LEN);
    let mut ptr = Vec::with_capacity(BlockPointer::ENCODED_LEN);
    for entry in entries {
        put_varint(&mut buf, entry.key.len() as u64);
        buf.put_slice(&entry.key);
        ptr.clear();
        entry.pointer.encode_to(&mut ptr)?;
        buf.put_slice(&ptr);
    }
    IndexBlockTrailer { num_entries: entries.len() as u32, block_type }.encode_to(&mut buf);
    Ok(buf.freeze())
}

/// A decoded index block.
#[derive(Debug)]
pub struct IndexBlock {
    block_type: IndexBlockType,
    entries: Vec<IndexEntry>,
}

impl IndexBlock {
    /// Parse an index block body, validating the trailer against the body.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < IndexBlockTrailer::ENCODED_LEN {
            return Err(Error::corruption("index block too small for trailer"));
        }
        let (body, trailer) = data.split_at(data.len() - IndexBlockTrailer::ENCODED_LEN);
        let trailer = IndexBlockTrailer::decode(trailer)?;

        let min_entry = 1 + BlockPointer::ENCODED_LEN;
        if trailer.num_entries as usize > body.len() / min_entry {
            return Err(Error::corruption(format!(
                "index trailer claims {} entries in {} bytes",
                trailer.num_entries,
                body.len()
            )));
        }
        if trailer.block_type == IndexBlockType::Internal && trailer.num_entries == 0 {
            return Err(Error::corruption("internal index block without entries"));
        }

        let mut reader = ByteReader::new(body);
        let mut entries: Vec<IndexEntry> = Vec::with_capacity(trailer.num_entries as usize);
        for _ in 0..trailer.num_entries {
            let key_len = reader.get_varint()? as usize;
            let key = reader.get_bytes(key_len)?.to_vec();
            let pointer = BlockPointer::decode(reader.get_bytes(BlockPointer::ENCODED_LEN)?)?;
            if entries.last().is_some_and(|prev| prev.key > key) {
                return Err(Error::corruption("index block keys out of order"));
            }
            entries.push(IndexEntry::new(key, pointer));
        }
        if reader.remaining() != 0 {
            return Err(Error::corruption(format!(
                "index trailer inconsistent with block size: {} unparsed bytes",
                reader.remaining()
            )));
        }

        Ok(Self { block_type: trailer.block_type, entries })
    }

    /// Leaf or internal
    pub fn block_type(&self) -> IndexBlockType {
        self.block_type
    }

    /// Entries in key order
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the block has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the greatest entry whose key is <= `key`.
    pub fn find_at_or_before(&self, key: &[u8]) -> Option<usize> {
        self.entries.partition_point(|e| e.key.as_slice() <= key).checked_sub(1)
    }

    /// Index of the greatest entry whose key is < `key`.
    pub fn find_before(&self, key: &[u8]) -> Option<usize> {
        self.entries.partition_point(|e| e.key.as_slice() < key).checked_sub(1)
    }
}

/// Where a B-tree descent lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// Greatest key <= target. Used for ordinals.
    AtOrBefore,
    /// Greatest key < target, else the first entry. With duplicate keys this
    /// is the leftmost block that can hold the first value >= target.
    Before,
}

/// Supplies decoded index blocks, typically through a cache.
pub trait IndexBlockSource {
    /// Load the index block at `pointer`
    fn index_block(&self, pointer: &BlockPointer) -> Result<Arc<IndexBlock>>;
}

/// Receives serialized blocks and reports where they were stored.
pub trait BlockSink {
    /// Compress and append a raw block body, returning its pointer
    fn append_block(&mut self, raw: &[u8]) -> Result<BlockPointer>;
}

/// Read-side handle on one B-tree.
#[derive(Debug, Clone, Copy)]
pub struct IndexTreeReader {
    root: BlockPointer,
}

impl IndexTreeReader {
    /// Create a reader for the tree described by `info`
    pub fn new(info: &BTreeInfo) -> Self {
        Self { root: info.root_block }
    }

    /// Descend from the root to the leaf entry selected by `mode`.
    ///
    /// Returns `None` for an empty tree, or in `AtOrBefore` mode when `key`
    /// precedes every key.
    pub fn seek<S: IndexBlockSource>(
        &self,
        source: &S,
        key: &[u8],
        mode: SeekMode,
    ) -> Result<Option<IndexEntry>> {
        let mut pointer = self.root;
        for _ in 0..MAX_TREE_DEPTH {
            let block = source.index_block(&pointer)?;
            let found = match mode {
                SeekMode::AtOrBefore => block.find_at_or_before(key),
                SeekMode::Before if block.is_empty() => None,
                SeekMode::Before => Some(block.find_before(key).unwrap_or(0)),
            };
            let Some(index) = found else {
                return Ok(None);
            };
            let entry = &block.entries()[index];
            match block.block_type() {
                IndexBlockType::Leaf => return Ok(Some(entry.clone())),
                IndexBlockType::Internal => pointer = entry.pointer,
            }
        }
        Err(Error::corruption("index tree exceeds maximum depth"))
    }

    /// All leaf entries in key order, walked with an explicit stack.
    pub fn leaf_entries<S: IndexBlockSource>(&self, source: &S) -> Result<Vec<IndexEntry>> {
        let mut out = Vec::new();
        let mut stack = vec![(self.root, 0usize)];
        while let Some((pointer, depth)) = stack.pop() {
            if depth >= MAX_TREE_DEPTH {
                return Err(Error::corruption("index tree exceeds maximum depth"));
            }
            let block = source.index_block(&pointer)?;
            match block.block_type() {
                IndexBlockType::Leaf => out.extend(block.entries().iter().cloned()),
                IndexBlockType::Internal => {
                    for entry in block.entries().iter().rev() {
                        stack.push((entry.pointer, depth + 1));
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Bulk builder for one B-tree.
///
/// Leaf entries are recorded as data blocks are finalized; the tree blocks
/// are emitted bottom-up by [`IndexTreeBuilder::finish`] so that each index
/// occupies one contiguous region of the file.
#[derive(Debug)]
pub struct IndexTreeBuilder {
    branching: usize,
    max_block_bytes: usize,
    strictly_increasing: bool,
    leaf_entries: Vec<IndexEntry>,
}

impl IndexTreeBuilder {
    /// Create a builder with at most `branching` entries (and roughly
    /// `max_block_bytes` bytes) per index block.
    pub fn new(branching: usize, max_block_bytes: usize, strictly_increasing: bool) -> Self {
        Self {
            branching: branching.max(2),
            max_block_bytes,
            strictly_increasing,
            leaf_entries: Vec::new(),
        }
    }

    /// Record the leaf entry for a newly written data block.
    pub fn add(&mut self, key: Vec<u8>, pointer: BlockPointer) -> Result<()> {
        if let Some(last) = self.leaf_entries.last() {
            let ordered =
                if self.strictly_increasing { last.key < key } else { last.key <= key };
            if !ordered {
                return Err(Error::invalid_state("index keys must be appended in increasing order"));
            }
        }
        self.leaf_entries.push(IndexEntry::new(key, pointer));
        Ok(())
    }

    /// Number of leaf entries recorded
    pub fn num_leaf_entries(&self) -> usize {
        self.leaf_entries.len()
    }

    /// Group a level's entries into blocks by count and byte budget.
    fn split_level(&self, entries: &[IndexEntry]) -> Vec<std::ops::Range<usize>> {
        let mut ranges = Vec::new();
        let mut start = 0;
        let mut bytes = IndexBlockTrailer::ENCODED_LEN;
        for (i, entry) in entries.iter().enumerate() {
            let count = i - start;
            let len = entry.encoded_len();
            let full = count >= self.branching || (count >= 2 && bytes + len > self.max_block_bytes);
            if full {
                ranges.push(start..i);
                start = i;
                bytes = IndexBlockTrailer::ENCODED_LEN;
            }
            bytes += len;
        }
        if start < entries.len() {
            ranges.push(start..entries.len());
        }
        ranges
    }

    /// Write the tree's blocks through `sink`, leaves first, and return its root.
    pub fn finish<S: BlockSink>(&mut self, sink: &mut S) -> Result<BTreeInfo> {
        let mut level = std::mem::take(&mut self.leaf_entries);
        if level.is_empty() {
            let root = sink.append_block(&encode_index_block(IndexBlockType::Leaf, &[])?)?;
            return Ok(BTreeInfo { root_block: root });
        }

        let mut block_type = IndexBlockType::Leaf;
        loop {
            let mut parents = Vec::new();
            for range in self.split_level(&level) {
                let chunk = &level[range];
                let pointer = sink.append_block(&encode_index_block(block_type, chunk)?)?;
                log::debug!(
                    "Flushed {:?} index block with {} entries at offset {}",
                    block_type,
                    chunk.len(),
                    pointer.offset
                );
                parents.push(IndexEntry::new(chunk[0].key.clone(), pointer));
            }
            if parents.len() == 1 {
                return Ok(BTreeInfo { root_block: parents[0].pointer });
            }
            level = parents;
            block_type = IndexBlockType::Internal;
        }
    }
}
