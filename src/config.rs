//! Configuration options for writing CFiles.

use crate::cfile::FileMetadataPair;
use crate::types::{DataType, EncodingType};

/// Options controlling how a single column file is laid out.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Logical type of every value in the column.
    /// Default: Int32
    pub data_type: DataType,

    /// Value encoding applied to every data block.
    /// Default: Plain
    pub encoding: EncodingType,

    /// Codec applied to every stored block.
    /// Default: CompressionType::None
    pub compression: CompressionType,

    /// Whether the column may hold nulls.
    /// Default: false
    pub is_nullable: bool,

    /// Encoded-size threshold for finalizing a data block (in bytes).
    /// Default: 256KB
    pub block_size: usize,

    /// Upper bound on values per data block, independent of size.
    /// Default: None
    pub values_per_block: Option<usize>,

    /// Maximum number of entries in a B-tree index block.
    /// Default: 256
    pub index_branching: usize,

    /// Build one bloom filter per data block.
    /// Default: true
    pub use_bloom_filter: bool,

    /// Target bloom filter false positive rate.
    /// Default: 0.01 (1%)
    pub bloom_fp_rate: f64,

    /// Build a value index. Values must be appended in non-decreasing order.
    /// Default: false
    pub write_value_index: bool,

    /// Number of worker threads compressing pending data blocks.
    /// Default: 1
    pub compression_threads: usize,

    /// Metadata pairs written into the file header.
    pub header_metadata: Vec<FileMetadataPair>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            data_type: DataType::Int32,
            encoding: EncodingType::Plain,
            compression: CompressionType::None,
            is_nullable: false,
            block_size: 256 * 1024, // 256KB
            values_per_block: None,
            index_branching: 256,
            use_bloom_filter: true,
            bloom_fp_rate: 0.01,
            write_value_index: false,
            compression_threads: 1,
            header_metadata: Vec::new(),
        }
    }
}

/// Compression codecs a CFile may declare in its footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionType {
    /// No compression.
    None = 0,

    /// Snappy compression (fast, moderate compression ratio).
    Snappy = 1,

    /// LZ4 compression (very fast, lower compression ratio).
    Lz4 = 2,

    /// Zstandard compression (slower, best compression ratio).
    Zstd = 3,
}

impl CompressionType {
    /// Convert from the on-disk tag
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionType::None),
            1 => Some(CompressionType::Snappy),
            2 => Some(CompressionType::Lz4),
            3 => Some(CompressionType::Zstd),
            _ => None,
        }
    }

    /// Whether the codec was compiled into this build.
    pub fn is_available(self) -> bool {
        match self {
            CompressionType::None => true,
            CompressionType::Snappy => cfg!(feature = "snappy"),
            CompressionType::Lz4 => cfg!(feature = "lz4-compression"),
            CompressionType::Zstd => cfg!(feature = "zstd-compression"),
        }
    }
}

impl Default for CompressionType {
    fn default() -> Self {
        CompressionType::None
    }
}

impl WriterOptions {
    /// Creates a new WriterOptions with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the column data type.
    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Sets the value encoding.
    pub fn encoding(mut self, encoding: EncodingType) -> Self {
        self.encoding = encoding;
        self
    }

    /// Sets the compression codec.
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Marks the column as nullable.
    pub fn nullable(mut self, value: bool) -> Self {
        self.is_nullable = value;
        self
    }

    /// Sets the data block size threshold.
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Caps the number of values per data block.
    pub fn values_per_block(mut self, count: usize) -> Self {
        self.values_per_block = Some(count);
        self
    }

    /// Sets the B-tree branching factor.
    pub fn index_branching(mut self, branching: usize) -> Self {
        self.index_branching = branching;
        self
    }

    /// Enables or disables per-block bloom filters.
    pub fn use_bloom_filter(mut self, value: bool) -> Self {
        self.use_bloom_filter = value;
        self
    }

    /// Sets the bloom filter false positive rate.
    pub fn bloom_fp_rate(mut self, rate: f64) -> Self {
        self.bloom_fp_rate = rate;
        self
    }

    /// Enables or disables the value index.
    pub fn write_value_index(mut self, value: bool) -> Self {
        self.write_value_index = value;
        self
    }

    /// Sets the number of compression worker threads.
    pub fn compression_threads(mut self, threads: usize) -> Self {
        self.compression_threads = threads;
        self
    }

    /// Adds a metadata pair to the header.
    pub fn header_metadata(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.header_metadata.push(FileMetadataPair::new(key, value));
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.block_size == 0 {
            return Err(crate::Error::invalid_argument("block_size must be > 0"));
        }
        if self.values_per_block == Some(0) {
            return Err(crate::Error::invalid_argument("values_per_block must be > 0"));
        }
        if self.index_branching < 2 {
            return Err(crate::Error::invalid_argument("index_branching must be >= 2"));
        }
        if self.bloom_fp_rate <= 0.0 || self.bloom_fp_rate >= 1.0 {
            return Err(crate::Error::invalid_argument(
                "bloom_fp_rate must be between 0 and 1",
            ));
        }
        if self.compression_threads == 0 {
            return Err(crate::Error::invalid_argument("compression_threads must be > 0"));
        }
        if !self.encoding.supports(self.data_type) {
            return Err(crate::Error::invalid_argument(format!(
                "{:?} encoding does not support {:?} columns",
                self.encoding, self.data_type
            )));
        }
        if self.write_value_index && self.is_nullable {
            return Err(crate::Error::invalid_argument(
                "value index requires a non-nullable column",
            ));
        }
        if !self.compression.is_available() {
            return Err(crate::Error::UnsupportedCompression(format!(
                "{:?} support not compiled in",
                self.compression
            )));
        }
        Ok(())
    }
}
