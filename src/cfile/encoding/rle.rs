//! Run-length / bit-packed hybrid encoding for integers and booleans.
//!
//! ```text
//! [base: zigzag varint][bit_width: u8]
//! [run header: varint][run body] ...
//! ```
//!
//! Values are stored as unsigned deltas from `base` (the block minimum) using
//! `bit_width` bits. An even run header `len << 1` is a repeated run followed
//! by the delta in `ceil(bit_width / 8)` little-endian bytes. An odd header
//! `count << 1 | 1` is a literal run of `count` deltas bit-packed LSB first.

use super::{put_varint, unzigzag, zigzag, ByteReader};
use crate::error::{Error, Result};
use crate::types::{DataType, Value};
use bytes::{BufMut, BytesMut};

/// Shortest repeat worth emitting as a repeated run.
const MIN_REPEAT: usize = 8;

/// Encode integer or boolean values.
pub fn encode_values(data_type: DataType, values: &[Value], buf: &mut BytesMut) -> Result<()> {
    let ints = values
        .iter()
        .map(|v| match (data_type, v) {
            (DataType::Bool, Value::Bool(b)) => Ok(*b as i64),
            (t, Value::Int(i)) if t.is_integer() => Ok(*i),
            _ => Err(Error::invalid_argument(format!(
                "RLE cannot encode {:?} in a {:?} column",
                v, data_type
            ))),
        })
        .collect::<Result<Vec<_>>>()?;
    encode_ints(&ints, buf);
    Ok(())
}

/// Decode `count` integer or boolean values.
pub fn decode_values(
    data_type: DataType,
    reader: &mut ByteReader<'_>,
    count: usize,
) -> Result<Vec<Value>> {
    let ints = decode_ints(reader, count)?;
    if data_type == DataType::Bool {
        return ints
            .into_iter()
            .map(|i| match i {
                0 => Ok(Value::Bool(false)),
                1 => Ok(Value::Bool(true)),
                other => Err(Error::corruption(format!("invalid RLE bool {}", other))),
            })
            .collect();
    }
    Ok(ints.into_iter().map(Value::Int).collect())
}

/// Encode a sequence of integers.
pub fn encode_ints(values: &[i64], buf: &mut BytesMut) {
    let base = values.iter().copied().min().unwrap_or(0);
    let deltas: Vec<u64> = values.iter().map(|v| (*v as u64).wrapping_sub(base as u64)).collect();
    let max_delta = deltas.iter().copied().max().unwrap_or(0);
    let bit_width = (64 - max_delta.leading_zeros()) as u8;

    put_varint(buf, zigzag(base));
    buf.put_u8(bit_width);

    let mut i = 0;
    let mut literal_start = 0;
    while i < deltas.len() {
        let mut run = 1;
        while i + run < deltas.len() && deltas[i + run] == deltas[i] {
            run += 1;
        }
        if run >= MIN_REPEAT {
            put_literals(&deltas[literal_start..i], bit_width, buf);
            put_varint(buf, (run as u64) << 1);
            let byte_width = (bit_width as usize).div_ceil(8);
            buf.put_slice(&deltas[i].to_le_bytes()[..byte_width]);
            literal_start = i + run;
        }
        i += run;
    }
    put_literals(&deltas[literal_start..], bit_width, buf);
}

fn put_literals(deltas: &[u64], bit_width: u8, buf: &mut BytesMut) {
    if deltas.is_empty() {
        return;
    }
    put_varint(buf, ((deltas.len() as u64) << 1) | 1);

    let mut acc: u128 = 0;
    let mut nbits = 0u32;
    for &d in deltas {
        acc |= (d as u128) << nbits;
        nbits += bit_width as u32;
        while nbits >= 8 {
            buf.put_u8(acc as u8);
            acc >>= 8;
            nbits -= 8;
        }
    }
    if nbits > 0 {
        buf.put_u8(acc as u8);
    }
}

/// Decode `count` integers.
pub fn decode_ints(reader: &mut ByteReader<'_>, count: usize) -> Result<Vec<i64>> {
    let base = unzigzag(reader.get_varint()?);
    let bit_width = reader.get_u8()? as u32;
    if bit_width > 64 {
        return Err(Error::corruption(format!("invalid RLE bit width {}", bit_width)));
    }
    let mask: u128 = if bit_width == 64 { u64::MAX as u128 } else { (1u128 << bit_width) - 1 };
    let byte_width = (bit_width as usize).div_ceil(8);

    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        let header = reader.get_varint()?;
        let len = usize::try_from(header >> 1)
            .map_err(|_| Error::corruption("RLE run length overflows usize"))?;
        if len == 0 || len > count - out.len() {
            return Err(Error::corruption(format!(
                "RLE run of {} exceeds remaining {} values",
                len,
                count - out.len()
            )));
        }

        if header & 1 == 0 {
            let mut raw = [0u8; 8];
            raw[..byte_width].copy_from_slice(reader.get_bytes(byte_width)?);
            let delta = u64::from_le_bytes(raw);
            let value = (base as u64).wrapping_add(delta) as i64;
            out.extend(std::iter::repeat(value).take(len));
        } else {
            let packed_len = (len * bit_width as usize).div_ceil(8);
            let packed = reader.get_bytes(packed_len)?;
            let mut bytes = packed.iter();
            let mut acc: u128 = 0;
            let mut nbits = 0u32;
            for _ in 0..len {
                while nbits < bit_width {
                    let byte = bytes.next().copied().unwrap_or(0);
                    acc |= (byte as u128) << nbits;
                    nbits += 8;
                }
                let delta = (acc & mask) as u64;
                acc >>= bit_width;
                nbits -= bit_width;
                out.push((base as u64).wrapping_add(delta) as i64);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(values: &[i64]) -> usize {
        let mut buf = BytesMut::new();
        encode_ints(values, &mut buf);
        let mut reader = ByteReader::new(&buf);
        assert_eq!(decode_ints(&mut reader, values.len()).unwrap(), values);
        assert_eq!(reader.remaining(), 0);
        buf.len()
    }

    #[test]
    fn test_empty() {
        round_trip(&[]);
    }

    #[test]
    fn test_long_runs_are_compact() {
        let values = vec![7i64; 10_000];
        let size = round_trip(&values);
        assert!(size < 16, "repeated run took {} bytes", size);
    }

    #[test]
    fn test_small_range_is_bit_packed() {
        let values: Vec<i64> = (0..1000).map(|i| 1_000_000 + (i % 4)).collect();
        let size = round_trip(&values);
        // 2 bits per value plus headers
        assert!(size < 300, "bit-packed literals took {} bytes", size);
    }

    #[test]
    fn test_mixed_runs_and_literals() {
        let mut values = vec![1, 2, 3];
        values.extend(std::iter::repeat(5).take(20));
        values.extend([9, -4, 9]);
        values.extend(std::iter::repeat(-4).take(8));
        round_trip(&values);
    }

    #[test]
    fn test_extreme_range() {
        round_trip(&[i64::MIN, i64::MAX, 0, -1, i64::MIN]);
    }

    #[test]
    fn test_bool_values() {
        let values: Vec<Value> = (0..50).map(|i| Value::Bool(i % 3 == 0)).collect();
        let mut buf = BytesMut::new();
        encode_values(DataType::Bool, &values, &mut buf).unwrap();
        let mut reader = ByteReader::new(&buf);
        assert_eq!(decode_values(DataType::Bool, &mut reader, 50).unwrap(), values);
    }

    #[test]
    fn test_overlong_run_is_corruption() {
        let mut buf = BytesMut::new();
        encode_ints(&[3; 16], &mut buf);
        let mut reader = ByteReader::new(&buf);
        assert!(matches!(decode_ints(&mut reader, 4), Err(Error::Corruption(_))));
    }
}
