//! Dictionary encoding support.
//!
//! The writer owns a [`DictionaryBuilder`] that assigns codes in first-seen
//! order; data blocks store only the codes. The dictionary block is flushed
//! once after all data blocks:
//!
//! ```text
//! [num_entries: u32][plain-encoded values, in code order]
//! ```

use crate::cfile::encoding::{plain, ByteReader};
use crate::error::{Error, Result};
use crate::types::{DataType, Value};
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;

/// Builds the value table for one file being written.
#[derive(Debug)]
pub struct DictionaryBuilder {
    data_type: DataType,
    codes: HashMap<Vec<u8>, u32>,
    values: Vec<Value>,
}

impl DictionaryBuilder {
    /// Create an empty dictionary for a column of `data_type`
    pub fn new(data_type: DataType) -> Self {
        Self { data_type, codes: HashMap::new(), values: Vec::new() }
    }

    /// Return the code for `value`, assigning the next unused code if unseen.
    pub fn code_for(&mut self, value: &Value) -> Result<u32> {
        let key = value.encode_key();
        if let Some(&code) = self.codes.get(&key) {
            return Ok(code);
        }
        let code = u32::try_from(self.values.len())
            .map_err(|_| Error::invalid_state("dictionary exceeds u32 codes"))?;
        self.codes.insert(key, code);
        self.values.push(value.clone());
        Ok(code)
    }

    /// Number of distinct values seen so far
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if no values have been added
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Serialize the dictionary block body.
    pub fn finish(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        buf.put_u32_le(self.values.len() as u32);
        plain::encode(self.data_type, &self.values, &mut buf)?;
        Ok(buf.freeze())
    }
}

/// Decoded, read-only dictionary table.
#[derive(Debug)]
pub struct Dictionary {
    values: Vec<Value>,
}

impl Dictionary {
    /// Parse a dictionary block body.
    pub fn decode(data_type: DataType, data: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let count = reader.get_u32()? as usize;
        let values = plain::decode(data_type, &mut reader, count)?;
        if reader.remaining() != 0 {
            return Err(Error::corruption(format!(
                "{} trailing bytes after dictionary entries",
                reader.remaining()
            )));
        }
        Ok(Self { values })
    }

    /// Look up the value for `code`.
    pub fn get(&self, code: u64) -> Result<&Value> {
        usize::try_from(code).ok().and_then(|c| self.values.get(c)).ok_or_else(|| {
            Error::corruption(format!(
                "dictionary code {} out of range ({} entries)",
                code,
                self.values.len()
            ))
        })
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the dictionary is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
