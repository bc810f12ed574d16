//! CFile: an immutable, single-column storage file.
//!
//! File layout:
//! ```text
//! +------------------+
//! | Header           |  magic + versioned metadata
//! +------------------+
//! | Data Block 1     |
//! | Data Block 2     |  encoded values, one stored block each
//! | ...              |
//! +------------------+
//! | Dictionary Block |  dictionary encoding only
//! +------------------+
//! | Bloom Blocks     |  one per data block, optional
//! +------------------+
//! | Position Index   |  B-tree: first ordinal -> data block
//! +------------------+
//! | Value Index      |  B-tree: first value -> data block, sorted columns only
//! +------------------+
//! | Footer           |
//! +------------------+
//! ```
//!
//! Every block after the header is stored as:
//! ```text
//! [uncompressed_len: u32][payload][crc32: u32]
//! ```
//! where the payload is the block body, compressed with the file's codec.

pub mod block;
pub mod compression;
pub mod dictionary;
pub mod encoding;
pub mod footer;
pub mod index;
pub mod reader;
pub mod writer;

pub use footer::{BTreeInfo, BlockPointer, CFileFooter, CFileHeader, FileMetadataPair, FooterInfo};
pub use reader::{CFileReader, Cursor};
pub use writer::{CFileWriter, WriterState};

use crate::error::{Error, Result};

/// Magic bytes opening the header and closing the footer trailer
pub const CFILE_MAGIC: &[u8; 8] = b"cfileV01";

/// Major format version; readers reject any other
pub const CFILE_MAJOR_VERSION: u32 = 1;

/// Minor format version
pub const CFILE_MINOR_VERSION: u32 = 0;

/// Fixed trailer after the footer body: footer length (4) + magic (8)
pub const FOOTER_TRAILER_SIZE: usize = 12;

/// Position index key for `ordinal`; big-endian so byte order matches numeric order.
pub fn ordinal_key(ordinal: u64) -> Vec<u8> {
    ordinal.to_be_bytes().to_vec()
}

/// Inverse of [`ordinal_key`].
pub fn decode_ordinal_key(key: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| Error::corruption(format!("position index key of {} bytes", key.len())))?;
    Ok(u64::from_be_bytes(bytes))
}
