//! Value encoders for data block payloads.
//!
//! Encoders see only the non-null values of a block; the null bitmap and
//! block header are handled by [`crate::cfile::block`]. Dictionary encoding
//! stores its codes with the RLE integer encoder.

pub mod bitshuffle;
pub mod plain;
pub mod rle;

use crate::error::{Error, Result};
use crate::types::{DataType, EncodingType, Value};
use bytes::{Buf, BufMut, BytesMut};

/// Encode `values` (all non-null, already type-checked) with `encoding`.
///
/// Dictionary encoding is not handled here because it needs the writer's
/// dictionary; see [`crate::cfile::dictionary`].
pub fn encode_values(
    data_type: DataType,
    encoding: EncodingType,
    values: &[Value],
    buf: &mut BytesMut,
) -> Result<()> {
    match encoding {
        EncodingType::Plain => plain::encode(data_type, values, buf),
        EncodingType::Rle => rle::encode_values(data_type, values, buf),
        EncodingType::BitShuffle => bitshuffle::encode(data_type, values, buf),
        EncodingType::Dictionary => {
            Err(Error::internal("dictionary values must be encoded as codes"))
        }
    }
}

/// Decode `count` values previously written by [`encode_values`].
pub fn decode_values(
    data_type: DataType,
    encoding: EncodingType,
    reader: &mut ByteReader<'_>,
    count: usize,
) -> Result<Vec<Value>> {
    match encoding {
        EncodingType::Plain => plain::decode(data_type, reader, count),
        EncodingType::Rle => rle::decode_values(data_type, reader, count),
        EncodingType::BitShuffle => bitshuffle::decode(data_type, reader, count),
        EncodingType::Dictionary => {
            Err(Error::internal("dictionary codes must be resolved by the reader"))
        }
    }
}

/// Append `value` as an unsigned LEB128 varint.
pub fn put_varint(buf: &mut BytesMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Map signed integers onto unsigned so small magnitudes stay small.
pub fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`zigzag`].
pub fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Bounds-checked cursor over an encoded buffer.
///
/// Every read that would run past the end reports `Corruption` instead of
/// panicking.
pub struct ByteReader<'a> {
    data: &'a [u8],
}

impl<'a> ByteReader<'a> {
    /// Create a reader over `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    fn ensure(&self, n: usize) -> Result<()> {
        if self.data.len() < n {
            return Err(Error::corruption(format!(
                "unexpected end of block: need {} bytes, have {}",
                n,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Read one byte
    pub fn get_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.data.get_u8())
    }

    /// Read a little-endian u16
    pub fn get_u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.data.get_u16_le())
    }

    /// Read a little-endian u32
    pub fn get_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.data.get_u32_le())
    }

    /// Read a little-endian u64
    pub fn get_u64(&mut self) -> Result<u64> {
        self.ensure(8)?;
        Ok(self.data.get_u64_le())
    }

    /// Read an unsigned LEB128 varint
    pub fn get_varint(&mut self) -> Result<u64> {
        let mut result = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = self.get_u8()?;
            result |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(Error::corruption("varint too long"))
    }

    /// Read `n` raw bytes
    pub fn get_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }
}
