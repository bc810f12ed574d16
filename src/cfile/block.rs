//! Data block format.
//!
//! A data block holds a contiguous run of a column's values and is
//! self-contained:
//!
//! ```text
//! [num_entries: u32]
//! [first_ordinal: u64]
//! [non-null bitmap: ceil(num_entries / 8) bytes]   // nullable columns only
//! [payload]                                        // non-null values only
//! ```
//!
//! Bit `i` of the bitmap (LSB first) is set when entry `i` is non-null.

use crate::cfile::dictionary::Dictionary;
use crate::cfile::encoding::{self, rle, ByteReader};
use crate::cfile::footer::FooterInfo;
use crate::error::{Error, Result};
use crate::types::{DataType, EncodingType, Value};
use bytes::{BufMut, Bytes, BytesMut};

/// Size of the fixed data block header.
pub const DATA_BLOCK_HEADER_SIZE: usize = 12;

/// Accumulates one data block's entries until the writer finalizes it.
#[derive(Debug)]
pub struct DataBlockBuilder {
    data_type: DataType,
    encoding: EncodingType,
    nullable: bool,
    first_ordinal: u64,
    non_null: Vec<bool>,
    values: Vec<Value>,
    codes: Vec<i64>,
    estimated_size: usize,
}

impl DataBlockBuilder {
    /// Create a builder whose first entry has file-wide ordinal `first_ordinal`
    pub fn new(data_type: DataType, encoding: EncodingType, nullable: bool, first_ordinal: u64) -> Self {
        Self {
            data_type,
            encoding,
            nullable,
            first_ordinal,
            non_null: Vec::new(),
            values: Vec::new(),
            codes: Vec::new(),
            estimated_size: DATA_BLOCK_HEADER_SIZE,
        }
    }

    /// Append a null entry.
    pub fn push_null(&mut self) {
        debug_assert!(self.nullable);
        self.non_null.push(false);
    }

    /// Append a non-dictionary value.
    pub fn push_value(&mut self, value: Value) {
        debug_assert_ne!(self.encoding, EncodingType::Dictionary);
        self.estimated_size += match (&value, self.data_type.fixed_width()) {
            (_, Some(width)) => width,
            (Value::Bytes(b), None) => b.len() + 2,
            (_, None) => 8,
        };
        self.non_null.push(true);
        self.values.push(value);
    }

    /// Append a dictionary code.
    pub fn push_code(&mut self, code: u32) {
        debug_assert_eq!(self.encoding, EncodingType::Dictionary);
        self.estimated_size += 4;
        self.non_null.push(true);
        self.codes.push(code as i64);
    }

    /// Number of entries, nulls included
    pub fn len(&self) -> usize {
        self.non_null.len()
    }

    /// Check if the block has no entries
    pub fn is_empty(&self) -> bool {
        self.non_null.is_empty()
    }

    /// Ordinal of the first entry
    pub fn first_ordinal(&self) -> u64 {
        self.first_ordinal
    }

    /// Approximate encoded size, used for flush decisions. Length prefixes
    /// are counted as two bytes, so blocks of long values can run over.
    pub fn estimated_size(&self) -> usize {
        let bitmap = if self.nullable { self.non_null.len().div_ceil(8) } else { 0 };
        self.estimated_size + bitmap
    }

    /// Encode the block body.
    pub fn finish(self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.estimated_size());
        buf.put_u32_le(self.non_null.len() as u32);
        buf.put_u64_le(self.first_ordinal);

        if self.nullable {
            let mut bitmap = vec![0u8; self.non_null.len().div_ceil(8)];
            for (i, _) in self.non_null.iter().enumerate().filter(|(_, set)| **set) {
                bitmap[i / 8] |= 1 << (i % 8);
            }
            buf.put_slice(&bitmap);
        }

        if self.encoding == EncodingType::Dictionary {
            rle::encode_ints(&self.codes, &mut buf);
        } else {
            encoding::encode_values(self.data_type, self.encoding, &self.values, &mut buf)?;
        }
        Ok(buf.freeze())
    }
}

/// A decoded data block.
#[derive(Debug)]
pub struct DataBlock {
    first_ordinal: u64,
    cells: Vec<Option<Value>>,
}

impl DataBlock {
    /// Decode a block body written by [`DataBlockBuilder::finish`].
    ///
    /// `dictionary` must be supplied for dictionary-encoded files.
    pub fn decode(data: &[u8], info: &FooterInfo, dictionary: Option<&Dictionary>) -> Result<Self> {
        let mut reader = ByteReader::new(data);
        let num_entries = reader.get_u32()? as usize;
        let first_ordinal = reader.get_u64()?;

        let non_null: Vec<bool> = if info.is_type_nullable {
            let bitmap = reader.get_bytes(num_entries.div_ceil(8))?;
            (0..num_entries).map(|i| bitmap[i / 8] & (1 << (i % 8)) != 0).collect()
        } else {
            vec![true; num_entries]
        };
        let present = non_null.iter().filter(|b| **b).count();

        let values = if info.encoding == EncodingType::Dictionary {
            let dictionary = dictionary
                .ok_or_else(|| Error::internal("dictionary-encoded block decoded without dictionary"))?;
            rle::decode_ints(&mut reader, present)?
                .into_iter()
                .map(|code| dictionary.get(code as u64).cloned())
                .collect::<Result<Vec<_>>>()?
        } else {
            encoding::decode_values(info.data_type, info.encoding, &mut reader, present)?
        };

        if reader.remaining() != 0 {
            return Err(Error::corruption(format!(
                "{} trailing bytes after data block payload",
                reader.remaining()
            )));
        }

        let mut values = values.into_iter();
        let cells = non_null
            .into_iter()
            .map(|set| if set { values.next() } else { None })
            .collect();

        Ok(Self { first_ordinal, cells })
    }

    /// Ordinal of the first entry
    pub fn first_ordinal(&self) -> u64 {
        self.first_ordinal
    }

    /// Ordinal one past the last entry
    pub fn end_ordinal(&self) -> u64 {
        self.first_ordinal + self.cells.len() as u64
    }

    /// Number of entries, nulls included
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if the block has no entries
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Entry at block-relative `index`; `None` for nulls
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.cells.get(index).and_then(|c| c.as_ref())
    }

    /// All entries in order
    pub fn cells(&self) -> &[Option<Value>] {
        &self.cells
    }

    /// Whether `ordinal` falls within this block
    pub fn contains_ordinal(&self, ordinal: u64) -> bool {
        ordinal >= self.first_ordinal && ordinal < self.end_ordinal()
    }
}
