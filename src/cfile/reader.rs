//! CFile reader implementation.
//!
//! Opening a file validates the header and footer and then only holds the
//! footer in memory. Index blocks, the dictionary, and bloom filters are
//! loaded lazily on first use and cached for the reader's lifetime, so one
//! reader can be shared across threads through an `Arc`.

use crate::cfile::block::DataBlock;
use crate::cfile::compression::BlockCompressor;
use crate::cfile::dictionary::Dictionary;
use crate::cfile::footer::{BlockPointer, CFileFooter, CFileHeader, FileMetadataPair, FooterInfo};
use crate::cfile::index::{IndexBlock, IndexBlockSource, IndexEntry, IndexTreeReader, SeekMode};
use crate::cfile::{decode_ordinal_key, ordinal_key, FOOTER_TRAILER_SIZE};
use crate::error::{Error, Result};
use crate::filter::{BloomFilter, Filter};
use crate::types::Value;
use bytes::Bytes;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// CFileReader provides read access to one CFile.
///
/// Usage:
/// ```no_run
/// use cfile::CFileReader;
///
/// let reader = CFileReader::open("column.cfile").unwrap();
/// let cursor = reader.seek_to_ordinal(42).unwrap();
/// println!("value at 42: {:?}", cursor.value());
/// ```
pub struct CFileReader {
    path: PathBuf,
    file: Mutex<File>,
    file_size: u64,
    /// End of the block region; every block pointer must end at or before it.
    data_end: u64,
    header: CFileHeader,
    footer: CFileFooter,
    info: FooterInfo,
    compressor: BlockCompressor,
    posidx: IndexTreeReader,
    validx: Option<IndexTreeReader>,
    index_cache: RwLock<HashMap<u64, Arc<IndexBlock>>>,
    dictionary: OnceCell<Arc<Dictionary>>,
    leaf_blocks: OnceCell<Vec<IndexEntry>>,
    blooms: OnceCell<Vec<BloomFilter>>,
}

impl std::fmt::Debug for CFileReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CFileReader")
            .field("path", &self.path)
            .field("file_size", &self.file_size)
            .field("info", &self.info)
            .finish()
    }
}

impl CFileReader {
    /// Open a CFile, validating its header and footer.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let file_size = file.metadata()?.len();

        let min_size = (CFileHeader::PREFIX_LEN + 4 + FOOTER_TRAILER_SIZE + 4) as u64;
        if file_size < min_size {
            return Err(Error::corruption(format!(
                "{:?} is {} bytes, too small to be a CFile",
                path, file_size
            )));
        }

        // Header
        let mut prefix = [0u8; CFileHeader::PREFIX_LEN];
        file.read_exact(&mut prefix)?;
        let header_rest = CFileHeader::decode_prefix(&prefix)?;
        let header_end = (CFileHeader::PREFIX_LEN + header_rest) as u64;
        if header_end + FOOTER_TRAILER_SIZE as u64 > file_size {
            return Err(Error::corruption("header length exceeds file size"));
        }
        let mut header_body = vec![0u8; header_rest];
        file.read_exact(&mut header_body)?;
        let header = CFileHeader::decode_body(&header_body)?;

        // Footer, located through the fixed trailer
        let mut trailer = [0u8; FOOTER_TRAILER_SIZE];
        file.seek(SeekFrom::End(-(FOOTER_TRAILER_SIZE as i64)))?;
        file.read_exact(&mut trailer)?;
        let footer_len = CFileFooter::decode_trailer(&trailer)? as u64;
        let data_end = (file_size - FOOTER_TRAILER_SIZE as u64)
            .checked_sub(footer_len)
            .filter(|start| *start >= header_end)
            .ok_or_else(|| Error::corruption("footer length exceeds file size"))?;

        let mut footer_body = vec![0u8; footer_len as usize];
        file.seek(SeekFrom::Start(data_end))?;
        file.read_exact(&mut footer_body)?;
        let footer = CFileFooter::decode(&footer_body)?;
        let info = footer.info()?;

        let pointers = std::iter::once(&footer.posidx_info.root_block)
            .chain(footer.validx_info.as_ref().map(|v| &v.root_block))
            .chain(footer.dict_block_ptr.as_ref())
            .chain(footer.bloom_block_ptrs.iter());
        for pointer in pointers {
            if pointer.offset < header_end {
                return Err(Error::corruption(format!(
                    "block pointer {:?} overlaps the header",
                    pointer
                )));
            }
            pointer.check_bounds(data_end)?;
        }

        let compressor = BlockCompressor::new(info.compression)?;
        log::info!(
            "Opened CFile {:?}: {:?}/{:?}/{:?}, {} values, {} bytes",
            path,
            info.data_type,
            info.encoding,
            info.compression,
            info.num_values,
            file_size
        );

        Ok(Self {
            posidx: IndexTreeReader::new(&footer.posidx_info),
            validx: footer.validx_info.as_ref().map(IndexTreeReader::new),
            path,
            file: Mutex::new(file),
            file_size,
            data_end,
            header,
            footer,
            info,
            compressor,
            index_cache: RwLock::new(HashMap::new()),
            dictionary: OnceCell::new(),
            leaf_blocks: OnceCell::new(),
            blooms: OnceCell::new(),
        })
    }

    /// Read a stored block and undo its compression.
    fn read_block(&self, pointer: &BlockPointer) -> Result<Bytes> {
        pointer.check_bounds(self.data_end)?;
        let size = usize::try_from(pointer.size)
            .map_err(|_| Error::corruption("block size overflows usize"))?;

        let mut stored = vec![0u8; size];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(pointer.offset))?;
            file.read_exact(&mut stored)?;
        }

        self.compressor.decompress(&stored).map_err(|e| {
            log::warn!("Corrupt block at offset {} in {:?}: {}", pointer.offset, self.path, e);
            e
        })
    }

    fn dictionary(&self) -> Result<Option<&Dictionary>> {
        let Some(pointer) = self.footer.dict_block_ptr else {
            return Ok(None);
        };
        let dictionary = self.dictionary.get_or_try_init(|| -> Result<Arc<Dictionary>> {
            let raw = self.read_block(&pointer)?;
            let dictionary = Dictionary::decode(self.info.data_type, &raw)?;
            log::debug!("Loaded dictionary of {} entries from {:?}", dictionary.len(), self.path);
            Ok(Arc::new(dictionary))
        })?;
        Ok(Some(dictionary.as_ref()))
    }

    fn read_data_block(&self, pointer: &BlockPointer) -> Result<DataBlock> {
        let raw = self.read_block(pointer)?;
        let block = DataBlock::decode(&raw, &self.info, self.dictionary()?)?;
        if block.is_empty() || block.end_ordinal() > self.info.num_values {
            return Err(Error::corruption(format!(
                "data block at offset {} covers ordinals {}..{} of {}",
                pointer.offset,
                block.first_ordinal(),
                block.end_ordinal(),
                self.info.num_values
            )));
        }
        Ok(block)
    }

    /// Load the data block holding `ordinal` through the position index.
    fn block_for_ordinal(&self, ordinal: u64) -> Result<DataBlock> {
        let entry = self
            .posidx
            .seek(self, &ordinal_key(ordinal), SeekMode::AtOrBefore)?
            .ok_or_else(|| Error::corruption(format!("no data block covers ordinal {}", ordinal)))?;
        let block = self.read_data_block(&entry.pointer)?;
        if decode_ordinal_key(&entry.key)? != block.first_ordinal() || !block.contains_ordinal(ordinal) {
            return Err(Error::corruption(format!(
                "position index entry {} does not match data block starting at {}",
                decode_ordinal_key(&entry.key)?,
                block.first_ordinal()
            )));
        }
        Ok(block)
    }

    fn leaf_blocks(&self) -> Result<&[IndexEntry]> {
        let leaves = self.leaf_blocks.get_or_try_init(|| -> Result<Vec<IndexEntry>> {
            let leaves = self.posidx.leaf_entries(self)?;
            let blooms = self.footer.bloom_block_ptrs.len();
            if blooms != 0 && blooms != leaves.len() {
                return Err(Error::corruption(format!(
                    "{} bloom blocks for {} data blocks",
                    blooms,
                    leaves.len()
                )));
            }
            Ok(leaves)
        })?;
        Ok(leaves)
    }

    fn blooms(&self) -> Result<&[BloomFilter]> {
        let blooms = self.blooms.get_or_try_init(|| {
            self.footer
                .bloom_block_ptrs
                .iter()
                .map(|pointer| BloomFilter::decode(&self.read_block(pointer)?))
                .collect::<Result<Vec<_>>>()
        })?;
        Ok(blooms)
    }

    fn check_value_type(&self, value: &Value) -> Result<()> {
        self.info.data_type.check(value)
    }

    /// Position a cursor at `ordinal`.
    pub fn seek_to_ordinal(&self, ordinal: u64) -> Result<Cursor<'_>> {
        if ordinal >= self.info.num_values {
            return Err(Error::invalid_argument(format!(
                "ordinal {} out of range ({} values)",
                ordinal, self.info.num_values
            )));
        }
        let block = self.block_for_ordinal(ordinal)?;
        Ok(Cursor::new(self, block, ordinal))
    }

    /// Position a cursor at the first value; the cursor is invalid for an empty file.
    pub fn seek_to_first(&self) -> Result<Cursor<'_>> {
        if self.info.num_values == 0 {
            return Ok(Cursor::exhausted(self));
        }
        self.seek_to_ordinal(0)
    }

    /// Position a cursor at the leftmost value `>= value`.
    ///
    /// Returns `None` when every stored value is smaller. Fails with
    /// `UnsupportedOperation` if the file has no value index.
    pub fn seek_to_value(&self, value: &Value) -> Result<Option<Cursor<'_>>> {
        let validx = self.validx.ok_or_else(|| {
            Error::unsupported_operation(format!("{:?} was written without a value index", self.path))
        })?;
        self.check_value_type(value)?;

        let Some(entry) = validx.seek(self, &value.encode_key(), SeekMode::Before)? else {
            return Ok(None);
        };
        let block = self.read_data_block(&entry.pointer)?;
        self.scan_to_value(block, value)
    }

    /// Walk forward from `block` to the first cell `>= value`.
    fn scan_to_value(&self, mut block: DataBlock, value: &Value) -> Result<Option<Cursor<'_>>> {
        loop {
            let found = block.cells().iter().position(|cell| {
                cell.as_ref().is_some_and(|v| v.compare(value) != Ordering::Less)
            });
            if let Some(index) = found {
                let ordinal = block.first_ordinal() + index as u64;
                return Ok(Some(Cursor::new(self, block, ordinal)));
            }
            let next = block.end_ordinal();
            if next >= self.info.num_values {
                return Ok(None);
            }
            block = self.block_for_ordinal(next)?;
        }
    }

    /// Value-index lookup. The first occurrence of `value` lies in the
    /// candidate block or, failing that, at the start of the block after it,
    /// so both blooms must reject the key before the lookup misses.
    fn indexed_lookup(&self, validx: IndexTreeReader, value: &Value) -> Result<Option<u64>> {
        let key = value.encode_key();
        let Some(entry) = validx.seek(self, &key, SeekMode::Before)? else {
            return Ok(None);
        };

        let mut start = entry.pointer;
        let blooms = self.blooms()?;
        if !blooms.is_empty() {
            let leaves = self.leaf_blocks()?;
            let index = leaves
                .binary_search_by_key(&entry.pointer.offset, |leaf| leaf.pointer.offset)
                .map_err(|_| {
                    Error::corruption(format!(
                        "value index points at offset {}, which is not a data block",
                        entry.pointer.offset
                    ))
                })?;
            let rules_out = |i: usize| blooms.get(i).is_some_and(|bloom| !bloom.may_contain(&key));
            if rules_out(index) {
                match leaves.get(index + 1) {
                    Some(next) if !rules_out(index + 1) => start = next.pointer,
                    _ => return Ok(None),
                }
            }
        }

        let block = self.read_data_block(&start)?;
        Ok(self
            .scan_to_value(block, value)?
            .filter(|cursor| cursor.value().is_some_and(|v| v.compare(value) == Ordering::Equal))
            .map(|cursor| cursor.ordinal()))
    }

    /// Find the first ordinal holding a value equal to `value`.
    ///
    /// Sorted files go through the value index; otherwise every data block is
    /// considered in order. Either way, blocks whose bloom filter rules the
    /// value out are skipped without being read.
    pub fn point_lookup(&self, value: &Value) -> Result<Option<u64>> {
        self.check_value_type(value)?;

        if let Some(validx) = self.validx {
            return self.indexed_lookup(validx, value);
        }

        let key = value.encode_key();
        let leaves = self.leaf_blocks()?;
        let blooms = self.blooms()?;
        let mut skipped = 0usize;
        for (i, entry) in leaves.iter().enumerate() {
            if blooms.get(i).is_some_and(|bloom| !bloom.may_contain(&key)) {
                skipped += 1;
                continue;
            }
            let block = self.read_data_block(&entry.pointer)?;
            let found = block
                .cells()
                .iter()
                .position(|cell| cell.as_ref().is_some_and(|v| v.compare(value) == Ordering::Equal));
            if let Some(index) = found {
                return Ok(Some(block.first_ordinal() + index as u64));
            }
        }
        log::debug!(
            "Point lookup missed in {:?}; {} of {} blocks skipped by bloom filters",
            self.path,
            skipped,
            leaves.len()
        );
        Ok(None)
    }

    /// Typed summary of the footer
    pub fn footer_info(&self) -> FooterInfo {
        self.info
    }

    /// The raw footer record
    pub fn footer(&self) -> &CFileFooter {
        &self.footer
    }

    /// The header record
    pub fn header(&self) -> &CFileHeader {
        &self.header
    }

    /// Footer metadata pairs
    pub fn metadata(&self) -> &[FileMetadataPair] {
        &self.footer.metadata
    }

    /// Total number of values
    pub fn num_values(&self) -> u64 {
        self.info.num_values
    }

    /// Size of the file in bytes
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Whether `seek_to_value` is supported
    pub fn has_value_index(&self) -> bool {
        self.validx.is_some()
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IndexBlockSource for CFileReader {
    fn index_block(&self, pointer: &BlockPointer) -> Result<Arc<IndexBlock>> {
        if let Some(block) = self.index_cache.read().get(&pointer.offset) {
            return Ok(Arc::clone(block));
        }
        let block = Arc::new(IndexBlock::decode(&self.read_block(pointer)?)?);
        let mut cache = self.index_cache.write();
        Ok(Arc::clone(cache.entry(pointer.offset).or_insert(block)))
    }
}

/// Forward cursor over a column, positioned at one ordinal.
#[derive(Debug)]
pub struct Cursor<'a> {
    reader: &'a CFileReader,
    block: Option<DataBlock>,
    ordinal: u64,
}

impl<'a> Cursor<'a> {
    fn new(reader: &'a CFileReader, block: DataBlock, ordinal: u64) -> Self {
        Self { reader, block: Some(block), ordinal }
    }

    fn exhausted(reader: &'a CFileReader) -> Self {
        Self { reader, block: None, ordinal: reader.num_values() }
    }

    /// Check if the cursor is positioned on a value
    pub fn valid(&self) -> bool {
        self.block.is_some()
    }

    /// Current ordinal; equals `num_values` once exhausted
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    /// Current value, or `None` for a null cell or an exhausted cursor
    pub fn value(&self) -> Option<&Value> {
        let block = self.block.as_ref()?;
        block.get((self.ordinal - block.first_ordinal()) as usize)
    }

    /// Move to the next ordinal, loading the next data block when needed.
    ///
    /// Returns `false` once the cursor runs past the last value.
    pub fn advance(&mut self) -> Result<bool> {
        let Some(block) = self.block.as_ref() else {
            return Ok(false);
        };
        self.ordinal += 1;
        if self.ordinal >= self.reader.num_values() {
            self.block = None;
            return Ok(false);
        }
        if !block.contains_ordinal(self.ordinal) {
            self.block = Some(self.reader.block_for_ordinal(self.ordinal)?);
        }
        Ok(true)
    }

    /// Read up to `max` cells starting at the current position, leaving the
    /// cursor just past the last one returned.
    pub fn next_batch(&mut self, max: usize) -> Result<Vec<Option<Value>>> {
        let remaining = self.reader.num_values().saturating_sub(self.ordinal);
        let mut batch = Vec::with_capacity(max.min(remaining as usize));
        while batch.len() < max && self.valid() {
            batch.push(self.value().cloned());
            self.advance()?;
        }
        Ok(batch)
    }
}
