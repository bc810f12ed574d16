//! File-level records: block pointers, header and footer.
//!
//! The header opens the file and the footer closes it. Both are `serde`
//! records serialized with `bincode` and protected by a CRC32. The footer is
//! located from the end of the file through a fixed-size trailer:
//!
//! ```text
//! [header]  = [magic: 8][len: u32][bincode(CFileHeader)][crc32: u32]
//! ...
//! [footer]  = [bincode(CFileFooter)][crc32: u32][len: u32][magic: 8]
//! ```

use crate::cfile::{CFILE_MAGIC, CFILE_MAJOR_VERSION, CFILE_MINOR_VERSION, FOOTER_TRAILER_SIZE};
use crate::config::CompressionType;
use crate::error::{Error, Result};
use crate::types::{DataType, EncodingType};
use serde::{Deserialize, Serialize};

/// Location of a serialized block within one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPointer {
    /// Offset of the block in the file
    pub offset: u64,
    /// Size of the stored block in bytes
    pub size: u64,
}

impl BlockPointer {
    /// Encoded size of a pointer inside index blocks.
    pub const ENCODED_LEN: usize = 12;

    /// Create a new BlockPointer
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Get the end offset of this block
    pub fn end_offset(&self) -> u64 {
        self.offset + self.size
    }

    /// Check that the block lies entirely within a file of `file_size` bytes.
    pub fn check_bounds(&self, file_size: u64) -> Result<()> {
        if self.size == 0 || self.offset.checked_add(self.size).map_or(true, |end| end > file_size) {
            return Err(Error::corruption(format!(
                "block pointer {:?} out of bounds for file of {} bytes",
                self, file_size
            )));
        }
        Ok(())
    }

    /// Append the pointer as `[offset: u64][size: u32]`.
    pub fn encode_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        let size = u32::try_from(self.size).map_err(|_| {
            Error::invalid_argument(format!("block of {} bytes exceeds the 4 GiB block limit", self.size))
        })?;
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf.extend_from_slice(&size.to_le_bytes());
        Ok(())
    }

    /// Decode a BlockPointer from bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::ENCODED_LEN {
            return Err(Error::corruption("BlockPointer too short"));
        }
        let mut offset = [0u8; 8];
        offset.copy_from_slice(&data[0..8]);
        let mut size = [0u8; 4];
        size.copy_from_slice(&data[8..12]);
        Ok(Self::new(u64::from_le_bytes(offset), u32::from_le_bytes(size) as u64))
    }
}

/// Arbitrary key/value metadata. Keys need not be unique; order is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadataPair {
    /// Metadata key
    pub key: String,
    /// Metadata value
    pub value: Vec<u8>,
}

impl FileMetadataPair {
    /// Create a new metadata pair
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into(), value: value.into() }
    }
}

/// Handle to one B-tree index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BTreeInfo {
    /// Root block of the tree
    pub root_block: BlockPointer,
}

/// Leading file record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CFileHeader {
    /// Major format version; readers reject other majors.
    pub major_version: u32,
    /// Minor format version.
    pub minor_version: u32,
    /// Header metadata
    pub metadata: Vec<FileMetadataPair>,
}

impl CFileHeader {
    /// Fixed bytes preceding the serialized header: magic + length.
    pub const PREFIX_LEN: usize = 12;

    /// Create a header for the current format version
    pub fn new(metadata: Vec<FileMetadataPair>) -> Self {
        Self {
            major_version: CFILE_MAJOR_VERSION,
            minor_version: CFILE_MINOR_VERSION,
            metadata,
        }
    }

    /// Encode the full header record.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self)
            .map_err(|e| Error::internal(format!("header encode failed: {}", e)))?;
        let mut buf = Vec::with_capacity(Self::PREFIX_LEN + body.len() + 4);
        buf.extend_from_slice(CFILE_MAGIC);
        buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
        buf.extend_from_slice(&body);
        buf.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        Ok(buf)
    }

    /// Parse the magic + length prefix, returning the size of the rest of the header.
    pub fn decode_prefix(prefix: &[u8]) -> Result<usize> {
        if prefix.len() < Self::PREFIX_LEN {
            return Err(Error::corruption("header prefix too short"));
        }
        if &prefix[0..8] != CFILE_MAGIC {
            return Err(Error::corruption("invalid CFile header magic"));
        }
        let mut len = [0u8; 4];
        len.copy_from_slice(&prefix[8..12]);
        Ok(u32::from_le_bytes(len) as usize + 4)
    }

    /// Decode the header body (`bincode` bytes followed by the CRC32).
    pub fn decode_body(data: &[u8]) -> Result<Self> {
        let body = verify_crc(data, "header")?;
        let header: CFileHeader = bincode::deserialize(body)?;
        if header.major_version != CFILE_MAJOR_VERSION {
            return Err(Error::corruption(format!(
                "unsupported CFile major version {}",
                header.major_version
            )));
        }
        Ok(header)
    }
}

/// Trailing file record; the sole source of truth for readers.
///
/// Format tags are stored raw so that a file written by a newer version
/// surfaces as `UnsupportedEncoding`/`UnsupportedCompression` rather than a
/// decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CFileFooter {
    /// [`DataType`] tag
    pub data_type: u8,
    /// [`EncodingType`] tag
    pub encoding: u8,
    /// Total number of values across all data blocks
    pub num_values: u64,
    /// Position index root
    pub posidx_info: BTreeInfo,
    /// Value index root, present only for sorted columns
    pub validx_info: Option<BTreeInfo>,
    /// [`CompressionType`] tag
    #[serde(default)]
    pub compression: u8,
    /// Footer metadata
    pub metadata: Vec<FileMetadataPair>,
    /// Whether data blocks carry a null bitmap
    #[serde(default)]
    pub is_type_nullable: bool,
    /// Dictionary block, present iff the encoding is dictionary-based
    pub dict_block_ptr: Option<BlockPointer>,
    /// One bloom block per data block, in ordinal order
    #[serde(default)]
    pub bloom_block_ptrs: Vec<BlockPointer>,
}

/// Typed summary of a footer, used to select decode paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FooterInfo {
    /// Column data type
    pub data_type: DataType,
    /// Data block encoding
    pub encoding: EncodingType,
    /// Block compression codec
    pub compression: CompressionType,
    /// Number of values in the file
    pub num_values: u64,
    /// Whether the column is nullable
    pub is_type_nullable: bool,
}

impl CFileFooter {
    /// Encode the footer followed by the `[len][magic]` trailer.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self)
            .map_err(|e| Error::internal(format!("footer encode failed: {}", e)))?;
        let mut buf = Vec::with_capacity(body.len() + 4 + FOOTER_TRAILER_SIZE);
        buf.extend_from_slice(&body);
        buf.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
        buf.extend_from_slice(CFILE_MAGIC);
        Ok(buf)
    }

    /// Parse the fixed trailer, returning the size of `bincode(footer) + crc`.
    pub fn decode_trailer(trailer: &[u8]) -> Result<usize> {
        if trailer.len() != FOOTER_TRAILER_SIZE {
            return Err(Error::corruption("footer trailer size mismatch"));
        }
        if &trailer[4..12] != CFILE_MAGIC {
            return Err(Error::corruption("missing CFile trailing magic"));
        }
        let mut len = [0u8; 4];
        len.copy_from_slice(&trailer[0..4]);
        Ok(u32::from_le_bytes(len) as usize + 4)
    }

    /// Decode the footer body (`bincode` bytes followed by the CRC32).
    pub fn decode(data: &[u8]) -> Result<Self> {
        let body = verify_crc(data, "footer")?;
        Ok(bincode::deserialize(body)?)
    }

    /// Resolve the raw tags into a typed summary.
    pub fn info(&self) -> Result<FooterInfo> {
        let data_type = DataType::from_u8(self.data_type)
            .ok_or_else(|| Error::corruption(format!("unknown data type tag {}", self.data_type)))?;
        let encoding = EncodingType::from_u8(self.encoding).ok_or_else(|| {
            Error::UnsupportedEncoding(format!("unknown encoding tag {}", self.encoding))
        })?;
        let compression = CompressionType::from_u8(self.compression).ok_or_else(|| {
            Error::UnsupportedCompression(format!("unknown compression tag {}", self.compression))
        })?;
        if !compression.is_available() {
            return Err(Error::UnsupportedCompression(format!(
                "{:?} support not compiled in",
                compression
            )));
        }
        if !encoding.supports(data_type) {
            return Err(Error::UnsupportedEncoding(format!(
                "{:?} encoding cannot hold {:?} values",
                encoding, data_type
            )));
        }
        if (encoding == EncodingType::Dictionary) != self.dict_block_ptr.is_some() {
            return Err(Error::corruption("dictionary pointer inconsistent with encoding"));
        }
        Ok(FooterInfo {
            data_type,
            encoding,
            compression,
            num_values: self.num_values,
            is_type_nullable: self.is_type_nullable,
        })
    }
}

fn verify_crc<'a>(data: &'a [u8], what: &str) -> Result<&'a [u8]> {
    if data.len() < 4 {
        return Err(Error::corruption(format!("{} too short", what)));
    }
    let (body, crc) = data.split_at(data.len() - 4);
    let mut stored = [0u8; 4];
    stored.copy_from_slice(crc);
    let stored = u32::from_le_bytes(stored);
    let actual = crc32fast::hash(body);
    if stored != actual {
        return Err(Error::corruption(format!(
            "{} checksum mismatch: expected {:#x}, got {:#x}",
            what, stored, actual
        )));
    }
    Ok(body)
}
