//! # CFile - Self-describing single-column storage files
//!
//! A CFile holds the values of one column in ordinal order. It is written
//! once by a [`CFileWriter`] and is immutable afterwards; any number of
//! threads may then read it through a shared [`CFileReader`].
//!
//! ## Architecture
//!
//! - **Data blocks**: values encoded with plain, run-length/bit-packed,
//!   bitshuffle or dictionary encoding, then compressed
//! - **Position index**: B-tree from ordinal to data block, always present
//! - **Value index**: B-tree from value to data block, for sorted columns
//! - **Bloom filters**: one per data block, for point lookups
//! - **Footer**: the self-describing record readers start from
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cfile::{CFileReader, CFileWriter, DataType, Value, WriterOptions};
//!
//! # fn main() -> Result<(), cfile::Error> {
//! let options = WriterOptions::new()
//!     .data_type(DataType::Int32)
//!     .write_value_index(true);
//! let mut writer = CFileWriter::create("./ids.cfile", options)?;
//! writer.append(&[Value::Int(3), Value::Int(7), Value::Int(9)])?;
//! writer.finish()?;
//!
//! let reader = CFileReader::open("./ids.cfile")?;
//! let cursor = reader.seek_to_ordinal(1)?;
//! assert_eq!(cursor.value(), Some(&Value::Int(7)));
//!
//! if let Some(cursor) = reader.seek_to_value(&Value::Int(8))? {
//!     println!("first value >= 8 is at ordinal {}", cursor.ordinal());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod cfile;
pub mod config;
pub mod error;
pub mod filter;
pub mod types;

// Re-exports
pub use cfile::{CFileReader, CFileWriter, Cursor, FooterInfo, WriterState};
pub use config::{CompressionType, WriterOptions};
pub use error::{Error, Result};
pub use types::{DataType, EncodingType, Value};
