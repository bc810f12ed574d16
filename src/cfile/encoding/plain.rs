//! Plain encoding.
//!
//! Fixed-width values are written back to back in little-endian order at the
//! column's declared width. Variable-length values are `[len: varint][bytes]`.

use super::{put_varint, ByteReader};
use crate::error::{Error, Result};
use crate::types::{DataType, Value};
use bytes::{BufMut, BytesMut};

/// Encode one value at the column's width.
pub fn encode_one(data_type: DataType, value: &Value, buf: &mut BytesMut) -> Result<()> {
    match (data_type, value) {
        (DataType::Bool, Value::Bool(b)) => buf.put_u8(*b as u8),
        (DataType::Int8, Value::Int(v)) => buf.put_i8(*v as i8),
        (DataType::Int16, Value::Int(v)) => buf.put_i16_le(*v as i16),
        (DataType::Int32, Value::Int(v)) => buf.put_i32_le(*v as i32),
        (DataType::Int64 | DataType::UnixtimeMicros, Value::Int(v)) => buf.put_i64_le(*v),
        (DataType::Float, Value::Float(f)) => buf.put_f32_le(*f),
        (DataType::Double, Value::Double(f)) => buf.put_f64_le(*f),
        (DataType::String | DataType::Binary, Value::Bytes(b)) => {
            put_varint(buf, b.len() as u64);
            buf.put_slice(b);
        }
        _ => {
            return Err(Error::invalid_argument(format!(
                "value {:?} does not match column type {:?}",
                value, data_type
            )))
        }
    }
    Ok(())
}

/// Decode one value written by [`encode_one`].
pub fn decode_one(data_type: DataType, reader: &mut ByteReader<'_>) -> Result<Value> {
    let value = match data_type {
        DataType::Bool => match reader.get_u8()? {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            other => return Err(Error::corruption(format!("invalid bool byte {}", other))),
        },
        DataType::Int8 => Value::Int(reader.get_u8()? as i8 as i64),
        DataType::Int16 => Value::Int(reader.get_u16()? as i16 as i64),
        DataType::Int32 => Value::Int(reader.get_u32()? as i32 as i64),
        DataType::Int64 | DataType::UnixtimeMicros => Value::Int(reader.get_u64()? as i64),
        DataType::Float => Value::Float(f32::from_bits(reader.get_u32()?)),
        DataType::Double => Value::Double(f64::from_bits(reader.get_u64()?)),
        DataType::String | DataType::Binary => {
            let len = reader.get_varint()?;
            let len = usize::try_from(len)
                .map_err(|_| Error::corruption("value length overflows usize"))?;
            let bytes = reader.get_bytes(len)?;
            if data_type == DataType::String && std::str::from_utf8(bytes).is_err() {
                return Err(Error::corruption("string value is not valid UTF-8"));
            }
            Value::Bytes(bytes.to_vec())
        }
    };
    Ok(value)
}

/// Encode a run of values.
pub fn encode(data_type: DataType, values: &[Value], buf: &mut BytesMut) -> Result<()> {
    if let Some(width) = data_type.fixed_width() {
        buf.reserve(width * values.len());
    }
    for value in values {
        encode_one(data_type, value, buf)?;
    }
    Ok(())
}

/// Decode `count` values.
pub fn decode(data_type: DataType, reader: &mut ByteReader<'_>, count: usize) -> Result<Vec<Value>> {
    if let Some(width) = data_type.fixed_width() {
        let needed = width
            .checked_mul(count)
            .ok_or_else(|| Error::corruption("value count overflows block"))?;
        if reader.remaining() < needed {
            return Err(Error::corruption(format!(
                "plain block holds {} bytes, {} values need {}",
                reader.remaining(),
                count,
                needed
            )));
        }
    }
    let mut values = Vec::with_capacity(count.min(reader.remaining()));
    for _ in 0..count {
        values.push(decode_one(data_type, reader)?);
    }
    Ok(values)
}
