//! Bit-shuffle encoding for fixed-width numeric values.
//!
//! The plain little-endian bytes of `n` values of width `w` are transposed so
//! that byte `j` of every value is contiguous: `out[j * n + i] = in[i * w + j]`.
//! High-order bytes of small integers become long zero runs, which the block
//! codec compresses well. The permutation is exactly reversible.

use super::{plain, ByteReader};
use crate::error::{Error, Result};
use crate::types::{DataType, Value};
use bytes::{BufMut, BytesMut};

fn width_of(data_type: DataType) -> Result<usize> {
    data_type
        .fixed_width()
        .ok_or_else(|| Error::invalid_argument(format!("{:?} is not fixed width", data_type)))
}

/// Encode fixed-width values.
pub fn encode(data_type: DataType, values: &[Value], buf: &mut BytesMut) -> Result<()> {
    let width = width_of(data_type)?;
    let mut flat = BytesMut::with_capacity(width * values.len());
    plain::encode(data_type, values, &mut flat)?;

    let n = values.len();
    let mut shuffled = vec![0u8; flat.len()];
    for i in 0..n {
        for j in 0..width {
            shuffled[j * n + i] = flat[i * width + j];
        }
    }
    buf.put_slice(&shuffled);
    Ok(())
}

/// Decode `count` values.
pub fn decode(data_type: DataType, reader: &mut ByteReader<'_>, count: usize) -> Result<Vec<Value>> {
    let width = width_of(data_type)?;
    let total = width
        .checked_mul(count)
        .ok_or_else(|| Error::corruption("value count overflows block"))?;
    let shuffled = reader.get_bytes(total)?;

    let mut flat = vec![0u8; total];
    for i in 0..count {
        for j in 0..width {
            flat[i * width + j] = shuffled[j * count + i];
        }
    }
    plain::decode(data_type, &mut ByteReader::new(&flat), count)
}
