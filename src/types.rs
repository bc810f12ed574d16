//! Column data types, encodings and the dynamically-typed [`Value`].
//!
//! Every closed set of format tags has an explicit mapping to its on-disk
//! integer representation. Tags are never reused; new variants get new tags.

use crate::error::{Error, Result};
use std::cmp::Ordering;

/// Logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    /// Single byte boolean.
    Bool = 1,
    /// 8-bit signed integer.
    Int8 = 2,
    /// 16-bit signed integer.
    Int16 = 3,
    /// 32-bit signed integer.
    Int32 = 4,
    /// 64-bit signed integer.
    Int64 = 5,
    /// IEEE 754 single precision.
    Float = 6,
    /// IEEE 754 double precision.
    Double = 7,
    /// UTF-8 string.
    String = 8,
    /// Arbitrary bytes.
    Binary = 9,
    /// Microseconds since the Unix epoch, stored as i64.
    UnixtimeMicros = 10,
}

impl DataType {
    /// Convert from the on-disk tag
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(DataType::Bool),
            2 => Some(DataType::Int8),
            3 => Some(DataType::Int16),
            4 => Some(DataType::Int32),
            5 => Some(DataType::Int64),
            6 => Some(DataType::Float),
            7 => Some(DataType::Double),
            8 => Some(DataType::String),
            9 => Some(DataType::Binary),
            10 => Some(DataType::UnixtimeMicros),
            _ => None,
        }
    }

    /// Width in bytes of one value, `None` for variable-length types.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            DataType::Bool | DataType::Int8 => Some(1),
            DataType::Int16 => Some(2),
            DataType::Int32 | DataType::Float => Some(4),
            DataType::Int64 | DataType::Double | DataType::UnixtimeMicros => Some(8),
            DataType::String | DataType::Binary => None,
        }
    }

    /// True for types stored as [`Value::Int`].
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UnixtimeMicros
        )
    }

    fn int_range(self) -> (i64, i64) {
        match self {
            DataType::Int8 => (i8::MIN as i64, i8::MAX as i64),
            DataType::Int16 => (i16::MIN as i64, i16::MAX as i64),
            DataType::Int32 => (i32::MIN as i64, i32::MAX as i64),
            _ => (i64::MIN, i64::MAX),
        }
    }

    /// Check that `value` can be stored in a column of this type.
    pub fn check(self, value: &Value) -> Result<()> {
        let ok = match (self, value) {
            (DataType::Bool, Value::Bool(_)) => true,
            (DataType::Float, Value::Float(_)) => true,
            (DataType::Double, Value::Double(_)) => true,
            (DataType::Binary, Value::Bytes(_)) => true,
            (DataType::String, Value::Bytes(b)) => {
                if std::str::from_utf8(b).is_err() {
                    return Err(Error::invalid_argument("string value is not valid UTF-8"));
                }
                true
            }
            (t, Value::Int(v)) if t.is_integer() => {
                let (min, max) = t.int_range();
                if *v < min || *v > max {
                    return Err(Error::invalid_argument(format!(
                        "value {} out of range for {:?}",
                        v, t
                    )));
                }
                true
            }
            _ => false,
        };
        if !ok {
            return Err(Error::invalid_argument(format!(
                "value {:?} does not match column type {:?}",
                value, self
            )));
        }
        Ok(())
    }
}

/// Value encoding of a file's data blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EncodingType {
    /// Values laid out contiguously.
    Plain = 1,
    /// Run-length / bit-packed hybrid for integers and booleans.
    Rle = 2,
    /// Byte-transposed fixed-width values.
    BitShuffle = 3,
    /// Integer codes resolved through the dictionary block.
    Dictionary = 4,
}

impl EncodingType {
    /// Convert from the on-disk tag
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EncodingType::Plain),
            2 => Some(EncodingType::Rle),
            3 => Some(EncodingType::BitShuffle),
            4 => Some(EncodingType::Dictionary),
            _ => None,
        }
    }

    /// Whether this encoding can represent columns of `data_type`.
    pub fn supports(self, data_type: DataType) -> bool {
        match self {
            EncodingType::Plain | EncodingType::Dictionary => true,
            EncodingType::Rle => data_type == DataType::Bool || data_type.is_integer(),
            EncodingType::BitShuffle => {
                data_type != DataType::Bool && data_type.fixed_width().is_some()
            }
        }
    }
}

/// A single cell of a column.
///
/// All integer widths (and timestamps) share [`Value::Int`]; the column's
/// [`DataType`] decides the stored width. String and Binary share
/// [`Value::Bytes`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean value.
    Bool(bool),
    /// Integer value of any declared width.
    Int(i64),
    /// Single precision float.
    Float(f32),
    /// Double precision float.
    Double(f64),
    /// String or binary payload.
    Bytes(Vec<u8>),
}

impl Value {
    fn rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Int(_) => 1,
            Value::Float(_) => 2,
            Value::Double(_) => 3,
            Value::Bytes(_) => 4,
        }
    }

    /// Total order over values of one type. Floats use IEEE total order.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// Memcomparable encoding: byte-wise order of keys equals [`Value::compare`].
    pub fn encode_key(&self) -> Vec<u8> {
        match self {
            Value::Bool(b) => vec![*b as u8],
            Value::Int(v) => ((*v as u64) ^ (1 << 63)).to_be_bytes().to_vec(),
            Value::Float(f) => {
                let bits = f.to_bits();
                let bits = if bits >> 31 == 1 { !bits } else { bits ^ (1 << 31) };
                bits.to_be_bytes().to_vec()
            }
            Value::Double(f) => {
                let bits = f.to_bits();
                let bits = if bits >> 63 == 1 { !bits } else { bits ^ (1 << 63) };
                bits.to_be_bytes().to_vec()
            }
            Value::Bytes(b) => b.clone(),
        }
    }

    /// The integer payload, if this is an integer value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The byte payload, if this is a string or binary value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The payload as `&str`, if this is valid UTF-8 bytes.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Bytes(v.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Bytes(v.into_bytes())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}
