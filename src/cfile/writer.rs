//! CFile writer.
//!
//! Streams a column's values into data blocks and, on [`CFileWriter::finish`],
//! emits the dictionary, bloom, and index blocks followed by the footer.

use crate::cfile::block::DataBlockBuilder;
use crate::cfile::compression::BlockCompressor;
use crate::cfile::dictionary::DictionaryBuilder;
use crate::cfile::footer::{BlockPointer, CFileFooter, CFileHeader, FileMetadataPair};
use crate::cfile::index::{BlockSink, IndexTreeBuilder};
use crate::cfile::ordinal_key;
use crate::config::WriterOptions;
use crate::error::{Error, Result};
use crate::filter::{BloomFilter, Filter};
use crate::types::{EncodingType, Value};
use bytes::Bytes;
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Lifecycle of a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Accepting values.
    Writing,
    /// `finish` has started; a writer stuck here failed while finishing or
    /// flushing blocks and its output must be discarded.
    Finishing,
    /// The file is complete and immutable.
    Finished,
}

/// Appends stored blocks to the output file, tracking the write offset.
struct FileSink {
    writer: BufWriter<File>,
    offset: u64,
    compressor: BlockCompressor,
}

impl FileSink {
    fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.offset += data.len() as u64;
        Ok(())
    }

    fn write_stored(&mut self, stored: &[u8]) -> Result<BlockPointer> {
        let pointer = BlockPointer::new(self.offset, stored.len() as u64);
        self.write_raw(stored)?;
        Ok(pointer)
    }
}

impl BlockSink for FileSink {
    fn append_block(&mut self, raw: &[u8]) -> Result<BlockPointer> {
        let stored = self.compressor.compress(raw)?;
        self.write_stored(&stored)
    }
}

/// A finalized data block waiting for compression.
struct PendingBlock {
    raw: Bytes,
    first_ordinal: u64,
    num_entries: usize,
    first_value_key: Option<Vec<u8>>,
    bloom: Option<BloomFilter>,
}

/// CFileWriter builds one CFile.
///
/// Usage:
/// ```no_run
/// use cfile::{CFileWriter, DataType, WriterOptions};
///
/// let options = WriterOptions::new().data_type(DataType::Int64);
/// let mut writer = CFileWriter::create("column.cfile", options).unwrap();
/// writer.append(&[1i64.into(), 2i64.into(), 3i64.into()]).unwrap();
/// writer.finish().unwrap();
/// ```
pub struct CFileWriter {
    path: PathBuf,
    options: WriterOptions,
    state: WriterState,
    sink: FileSink,
    block: DataBlockBuilder,
    block_keys: Vec<Vec<u8>>,
    block_first_value: Option<Vec<u8>>,
    last_value: Option<Value>,
    dictionary: Option<DictionaryBuilder>,
    pending: Vec<PendingBlock>,
    posidx: IndexTreeBuilder,
    validx: Option<IndexTreeBuilder>,
    bloom_blocks: Vec<Vec<u8>>,
    metadata: Vec<FileMetadataPair>,
    num_values: u64,
    num_data_blocks: usize,
}

impl CFileWriter {
    /// Create the file at `path` and write its header.
    pub fn create<P: AsRef<Path>>(path: P, options: WriterOptions) -> Result<Self> {
        options.validate()?;
        let path = path.as_ref().to_path_buf();
        let compressor = BlockCompressor::new(options.compression)?;
        let file = File::create(&path)?;

        let mut sink = FileSink { writer: BufWriter::new(file), offset: 0, compressor };
        let header = CFileHeader::new(options.header_metadata.clone());
        sink.write_raw(&header.encode()?)?;

        let dictionary = (options.encoding == EncodingType::Dictionary)
            .then(|| DictionaryBuilder::new(options.data_type));
        let validx = options
            .write_value_index
            .then(|| IndexTreeBuilder::new(options.index_branching, options.block_size, false));

        Ok(Self {
            block: Self::new_block(&options, 0),
            posidx: IndexTreeBuilder::new(options.index_branching, options.block_size, true),
            path,
            state: WriterState::Writing,
            sink,
            block_keys: Vec::new(),
            block_first_value: None,
            last_value: None,
            dictionary,
            pending: Vec::new(),
            validx,
            bloom_blocks: Vec::new(),
            metadata: Vec::new(),
            num_values: 0,
            num_data_blocks: 0,
            options,
        })
    }

    fn new_block(options: &WriterOptions, first_ordinal: u64) -> DataBlockBuilder {
        DataBlockBuilder::new(options.data_type, options.encoding, options.is_nullable, first_ordinal)
    }

    fn ensure_writing(&self) -> Result<()> {
        match self.state {
            WriterState::Writing => Ok(()),
            state => Err(Error::invalid_state(format!(
                "writer for {:?} is {:?}, not accepting writes",
                self.path, state
            ))),
        }
    }

    /// Append non-null values in ordinal order.
    pub fn append(&mut self, values: &[Value]) -> Result<()> {
        let cells: Vec<Option<Value>> = values.iter().cloned().map(Some).collect();
        self.append_nullable(&cells)
    }

    /// Append values where `None` marks a null.
    ///
    /// The batch is validated before anything is written; a rejected batch
    /// leaves the writer unchanged and still usable. A failure after
    /// validation (an I/O error while flushing blocks) moves the writer to
    /// [`WriterState::Finishing`] for good and the file must be discarded.
    pub fn append_nullable(&mut self, cells: &[Option<Value>]) -> Result<()> {
        self.ensure_writing()?;
        self.validate_batch(cells)?;

        let result: Result<()> = cells.iter().try_for_each(|cell| {
            self.push_cell(cell.as_ref())?;
            if self.block_is_full() {
                self.finalize_block()?;
            }
            Ok(())
        });
        if let Err(e) = &result {
            log::error!("Write to {:?} failed after {} values: {}", self.path, self.num_values, e);
            self.state = WriterState::Finishing;
        }
        result
    }

    fn validate_batch(&self, cells: &[Option<Value>]) -> Result<()> {
        let mut last = self.last_value.as_ref();
        for (i, cell) in cells.iter().enumerate() {
            let Some(value) = cell else {
                if !self.options.is_nullable {
                    return Err(Error::invalid_argument(format!(
                        "null at ordinal {} in a non-nullable column",
                        self.num_values + i as u64
                    )));
                }
                continue;
            };
            self.options.data_type.check(value)?;
            if self.validx.is_some() {
                if let Some(prev) = last {
                    if value.compare(prev) == Ordering::Less {
                        return Err(Error::invalid_state(format!(
                            "value at ordinal {} is smaller than its predecessor; \
                             a value index needs non-decreasing values",
                            self.num_values + i as u64
                        )));
                    }
                }
                last = Some(value);
            }
        }
        Ok(())
    }

    fn push_cell(&mut self, cell: Option<&Value>) -> Result<()> {
        match cell {
            None => self.block.push_null(),
            Some(value) => {
                if self.options.use_bloom_filter || self.validx.is_some() {
                    let key = value.encode_key();
                    if self.validx.is_some() && self.block_first_value.is_none() {
                        self.block_first_value = Some(key.clone());
                    }
                    if self.options.use_bloom_filter {
                        self.block_keys.push(key);
                    }
                }
                match self.dictionary.as_mut() {
                    Some(dictionary) => {
                        let code = dictionary.code_for(value)?;
                        self.block.push_code(code);
                    }
                    None => self.block.push_value(value.clone()),
                }
                if self.validx.is_some() {
                    self.last_value = Some(value.clone());
                }
            }
        }
        self.num_values += 1;
        Ok(())
    }

    fn block_is_full(&self) -> bool {
        self.options.values_per_block.is_some_and(|max| self.block.len() >= max)
            || self.block.estimated_size() >= self.options.block_size
    }

    /// Close the current data block and queue it for compression.
    fn finalize_block(&mut self) -> Result<()> {
        if self.block.is_empty() {
            return Ok(());
        }

        let next = Self::new_block(&self.options, self.num_values);
        let builder = std::mem::replace(&mut self.block, next);
        let first_ordinal = builder.first_ordinal();
        let num_entries = builder.len();
        let raw = builder.finish()?;

        let bloom = self.options.use_bloom_filter.then(|| {
            let mut filter = BloomFilter::new(self.block_keys.len(), self.options.bloom_fp_rate);
            for key in &self.block_keys {
                filter.add(key);
            }
            filter
        });
        self.block_keys.clear();

        self.pending.push(PendingBlock {
            raw,
            first_ordinal,
            num_entries,
            first_value_key: self.block_first_value.take(),
            bloom,
        });
        if self.pending.len() >= self.options.compression_threads {
            self.flush_pending()?;
        }
        Ok(())
    }

    /// Compress queued data blocks (in parallel when configured) and write
    /// them in ordinal order.
    fn flush_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending);
        let raws: Vec<Bytes> = pending.iter().map(|p| p.raw.clone()).collect();
        let compressor = self.sink.compressor;
        let stored = compressor.compress_all(&raws, self.options.compression_threads)?;

        for (block, stored) in pending.into_iter().zip(stored) {
            let pointer = self.sink.write_stored(&stored)?;
            self.posidx.add(ordinal_key(block.first_ordinal), pointer)?;
            if let Some(validx) = self.validx.as_mut() {
                let key = block
                    .first_value_key
                    .ok_or_else(|| Error::internal("value-indexed block without a first value"))?;
                validx.add(key, pointer)?;
            }
            if let Some(bloom) = block.bloom {
                self.bloom_blocks.push(compressor.compress(&bloom.encode())?);
            }
            self.num_data_blocks += 1;
            log::debug!(
                "Flushed data block {} ({} values from ordinal {}) at offset {}, {} bytes",
                self.num_data_blocks,
                block.num_entries,
                block.first_ordinal,
                pointer.offset,
                pointer.size
            );
        }
        Ok(())
    }

    /// Append a footer metadata pair.
    pub fn add_metadata_pair(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Result<()> {
        self.ensure_writing()?;
        self.metadata.push(FileMetadataPair::new(key, value));
        Ok(())
    }

    /// Finish the file: flush remaining data, then the dictionary, bloom
    /// blocks, position index, value index and footer.
    ///
    /// Returns the final file size. On error the writer stays in
    /// [`WriterState::Finishing`] and the file must be discarded.
    pub fn finish(&mut self) -> Result<u64> {
        self.ensure_writing()?;
        self.state = WriterState::Finishing;

        self.finalize_block()?;
        self.flush_pending()?;

        let dict_block_ptr = match self.dictionary.as_ref() {
            Some(dictionary) => {
                let raw = dictionary.finish()?;
                let pointer = self.sink.append_block(&raw)?;
                log::debug!("Flushed dictionary with {} entries", dictionary.len());
                Some(pointer)
            }
            None => None,
        };

        let mut bloom_block_ptrs = Vec::with_capacity(self.bloom_blocks.len());
        for stored in std::mem::take(&mut self.bloom_blocks) {
            bloom_block_ptrs.push(self.sink.write_stored(&stored)?);
        }

        let posidx_info = self.posidx.finish(&mut self.sink)?;
        let validx_info = match self.validx.as_mut() {
            Some(validx) => Some(validx.finish(&mut self.sink)?),
            None => None,
        };

        let footer = CFileFooter {
            data_type: self.options.data_type as u8,
            encoding: self.options.encoding as u8,
            num_values: self.num_values,
            posidx_info,
            validx_info,
            compression: self.options.compression as u8,
            metadata: std::mem::take(&mut self.metadata),
            is_type_nullable: self.options.is_nullable,
            dict_block_ptr,
            bloom_block_ptrs,
        };
        self.sink.write_raw(&footer.encode()?)?;
        self.sink.writer.flush()?;
        self.sink.writer.get_ref().sync_all()?;

        self.state = WriterState::Finished;
        log::info!(
            "Finished CFile {:?}: {} values in {} data blocks, {} bytes",
            self.path,
            self.num_values,
            self.num_data_blocks,
            self.sink.offset
        );
        Ok(self.sink.offset)
    }

    /// Abandon an unfinished file, removing it from disk.
    pub fn abandon(self) -> Result<()> {
        if self.state == WriterState::Finished {
            return Err(Error::invalid_state(format!("{:?} is already finished", self.path)));
        }
        let Self { path, sink, num_values, .. } = self;
        drop(sink);
        std::fs::remove_file(&path)?;
        log::debug!("Abandoned CFile {:?} after {} values", path, num_values);
        Ok(())
    }

    /// Number of values appended so far
    pub fn num_values(&self) -> u64 {
        self.num_values
    }

    /// Bytes written to the file so far
    pub fn written_size(&self) -> u64 {
        self.sink.offset
    }

    /// Current lifecycle state
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Path of the file being written
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;
    use tempfile::NamedTempFile;

    fn int_values(range: std::ops::Range<i64>) -> Vec<Value> {
        range.map(Value::Int).collect()
    }

    #[test]
    fn test_writer_empty() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut writer = CFileWriter::create(temp_file.path(), WriterOptions::default()).unwrap();
        assert_eq!(writer.num_values(), 0);
        assert!(writer.finish().unwrap() > 0);
        assert_eq!(writer.state(), WriterState::Finished);
    }

    #[test]
    fn test_writer_block_count() {
        let temp_file = NamedTempFile::new().unwrap();
        let options = WriterOptions::new().values_per_block(100);
        let mut writer = CFileWriter::create(temp_file.path(), options).unwrap();
        writer.append(&int_values(0..1000)).unwrap();
        writer.finish().unwrap();

        assert_eq!(writer.num_data_blocks, 10);
        assert_eq!(writer.num_values(), 1000);
    }

    #[test]
    fn test_write_after_finish() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut writer = CFileWriter::create(temp_file.path(), WriterOptions::default()).unwrap();
        writer.append(&int_values(0..10)).unwrap();
        writer.finish().unwrap();

        assert!(matches!(writer.append(&int_values(10..11)), Err(Error::InvalidState(_))));
        assert!(matches!(writer.finish(), Err(Error::InvalidState(_))));
        assert!(matches!(writer.add_metadata_pair("k", b"v".to_vec()), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_unsorted_values_rejected_with_value_index() {
        let temp_file = NamedTempFile::new().unwrap();
        let options = WriterOptions::new().write_value_index(true);
        let mut writer = CFileWriter::create(temp_file.path(), options).unwrap();

        writer.append(&int_values(0..5)).unwrap();
        let result = writer.append(&[Value::Int(10), Value::Int(3)]);
        assert!(matches!(result, Err(Error::InvalidState(_))));

        // the rejected batch left nothing behind
        assert_eq!(writer.num_values(), 5);
        writer.append(&[Value::Int(4), Value::Int(4), Value::Int(9)]).unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn test_type_and_null_checks() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut writer = CFileWriter::create(temp_file.path(), WriterOptions::default()).unwrap();

        assert!(matches!(writer.append(&[Value::from("x")]), Err(Error::InvalidArgument(_))));
        assert!(matches!(writer.append_nullable(&[None]), Err(Error::InvalidArgument(_))));
        assert_eq!(writer.num_values(), 0);
    }

    #[test]
    fn test_size_threshold_flushes_blocks() {
        let temp_file = NamedTempFile::new().unwrap();
        let options = WriterOptions::new().data_type(DataType::Int64).block_size(1024);
        let mut writer = CFileWriter::create(temp_file.path(), options).unwrap();
        writer.append(&int_values(0..1000)).unwrap();
        writer.finish().unwrap();
        assert!(writer.num_data_blocks >= 7);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_flush_failure_poisons_writer() {
        let options = WriterOptions::new().data_type(DataType::Int64).values_per_block(100);
        let mut writer = CFileWriter::create("/dev/full", options).unwrap();

        let result = writer.append(&int_values(0..10_000));
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(writer.state(), WriterState::Finishing);

        assert!(matches!(writer.append(&int_values(0..1)), Err(Error::InvalidState(_))));
        assert!(matches!(writer.add_metadata_pair("k", b"v".to_vec()), Err(Error::InvalidState(_))));
        assert!(matches!(writer.finish(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_abandon_removes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("partial.cfile");
        let mut writer = CFileWriter::create(&path, WriterOptions::default()).unwrap();
        writer.append(&int_values(0..100)).unwrap();
        assert!(path.exists());

        writer.abandon().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_abandon_finished_file_refused() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut writer = CFileWriter::create(temp_file.path(), WriterOptions::default()).unwrap();
        writer.finish().unwrap();
        assert!(matches!(writer.abandon(), Err(Error::InvalidState(_))));
        assert!(temp_file.path().exists());
    }

    #[test]
    fn test_invalid_options_rejected() {
        let temp_file = NamedTempFile::new().unwrap();
        let options = WriterOptions::new().data_type(DataType::Double).encoding(EncodingType::Rle);
        assert!(CFileWriter::create(temp_file.path(), options).is_err());
    }
}
