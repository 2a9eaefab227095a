//! Column values and declared value types
//!
//! Every mapped member is declared with a [`ValueType`]. Values travel between
//! records and the backend as [`Value`], and values read back from a backend are
//! coerced to the declared type with [`Value::convert`], which follows the
//! canonical parser of each target type.

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declared type of a mapped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Bool,
    Char,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Text,
    Timestamp,
    /// Raw bytes. Not part of the conversion table: values are assigned as-is.
    Blob,
}

impl ValueType {
    /// Get the string representation of the value type
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Bool => "bool",
            ValueType::Char => "char",
            ValueType::I8 => "i8",
            ValueType::I16 => "i16",
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::U8 => "u8",
            ValueType::U16 => "u16",
            ValueType::U32 => "u32",
            ValueType::U64 => "u64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
            ValueType::Text => "text",
            ValueType::Timestamp => "timestamp",
            ValueType::Blob => "blob",
        }
    }

    /// Get all value types
    pub fn all() -> &'static [ValueType] {
        &[
            ValueType::Bool,
            ValueType::Char,
            ValueType::I8,
            ValueType::I16,
            ValueType::I32,
            ValueType::I64,
            ValueType::U8,
            ValueType::U16,
            ValueType::U32,
            ValueType::U64,
            ValueType::F32,
            ValueType::F64,
            ValueType::Text,
            ValueType::Timestamp,
            ValueType::Blob,
        ]
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ValueType::I8
                | ValueType::I16
                | ValueType::I32
                | ValueType::I64
                | ValueType::U8
                | ValueType::U16
                | ValueType::U32
                | ValueType::U64
        )
    }
}

impl FromStr for ValueType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bool" | "boolean" => Ok(ValueType::Bool),
            "char" | "character" => Ok(ValueType::Char),
            "i8" | "sbyte" => Ok(ValueType::I8),
            "i16" | "short" => Ok(ValueType::I16),
            "i32" | "int" => Ok(ValueType::I32),
            "i64" | "long" => Ok(ValueType::I64),
            "u8" | "byte" => Ok(ValueType::U8),
            "u16" | "ushort" => Ok(ValueType::U16),
            "u32" | "uint" => Ok(ValueType::U32),
            "u64" | "ulong" => Ok(ValueType::U64),
            "f32" | "float" => Ok(ValueType::F32),
            "f64" | "double" => Ok(ValueType::F64),
            "text" | "string" => Ok(ValueType::Text),
            "timestamp" | "datetime" => Ok(ValueType::Timestamp),
            "blob" | "bytes" => Ok(ValueType::Blob),
            _ => Err(Error::Schema(format!("Unknown value type: {}", s))),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Char(char),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The value type carried by this value, `None` for null.
    pub fn value_type(&self) -> Option<ValueType> {
        Some(match self {
            Value::Null => return None,
            Value::Bool(_) => ValueType::Bool,
            Value::Char(_) => ValueType::Char,
            Value::I8(_) => ValueType::I8,
            Value::I16(_) => ValueType::I16,
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::U8(_) => ValueType::U8,
            Value::U16(_) => ValueType::U16,
            Value::U32(_) => ValueType::U32,
            Value::U64(_) => ValueType::U64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
            Value::Text(_) => ValueType::Text,
            Value::Timestamp(_) => ValueType::Timestamp,
            Value::Blob(_) => ValueType::Blob,
        })
    }

    /// Coerce this value to `target` using the canonical parser of the target type.
    ///
    /// Null stays null. `Blob` targets receive the value unconverted.
    pub fn convert(&self, target: ValueType) -> Result<Value> {
        if self.is_null() {
            return Ok(Value::Null);
        }
        if self.value_type() == Some(target) || target == ValueType::Blob {
            return Ok(self.clone());
        }

        let converted = match target {
            ValueType::Bool => self.to_bool().map(Value::Bool),
            ValueType::Char => self.to_char().map(Value::Char),
            ValueType::I8 => self.to_integer::<i8>().map(Value::I8),
            ValueType::I16 => self.to_integer::<i16>().map(Value::I16),
            ValueType::I32 => self.to_integer::<i32>().map(Value::I32),
            ValueType::I64 => self.to_integer::<i64>().map(Value::I64),
            ValueType::U8 => self.to_integer::<u8>().map(Value::U8),
            ValueType::U16 => self.to_integer::<u16>().map(Value::U16),
            ValueType::U32 => self.to_integer::<u32>().map(Value::U32),
            ValueType::U64 => self.to_integer::<u64>().map(Value::U64),
            ValueType::F32 => self.to_float().map(|f| Value::F32(f as f32)),
            ValueType::F64 => self.to_float().map(Value::F64),
            ValueType::Text => self.to_text().map(Value::Text),
            ValueType::Timestamp => self.to_timestamp().map(Value::Timestamp),
            ValueType::Blob => unreachable!("blob targets are assigned unconverted"),
        };

        converted.ok_or_else(|| Error::Conversion {
            value: self.to_string(),
            target,
        })
    }

    /// Extract a typed Rust value, converting to its declared type first.
    pub fn extract<T: FromValue>(self) -> Result<T> {
        T::from_value(self)
    }

    fn as_i128(&self) -> Option<i128> {
        match *self {
            Value::Bool(b) => Some(i128::from(b)),
            Value::Char(c) => Some(i128::from(u32::from(c))),
            Value::I8(v) => Some(i128::from(v)),
            Value::I16(v) => Some(i128::from(v)),
            Value::I32(v) => Some(i128::from(v)),
            Value::I64(v) => Some(i128::from(v)),
            Value::U8(v) => Some(i128::from(v)),
            Value::U16(v) => Some(i128::from(v)),
            Value::U32(v) => Some(i128::from(v)),
            Value::U64(v) => Some(i128::from(v)),
            _ => None,
        }
    }

    fn to_integer<T>(&self) -> Option<T>
    where
        T: TryFrom<i128> + FromStr,
    {
        match self {
            Value::Text(s) => s.trim().parse::<T>().ok(),
            Value::F32(f) => round_to_integer(f64::from(*f)),
            Value::F64(f) => round_to_integer(*f),
            other => other.as_i128().and_then(|v| T::try_from(v).ok()),
        }
    }

    fn to_bool(&self) -> Option<bool> {
        match self {
            Value::Text(s) => {
                let s = s.trim();
                if s.eq_ignore_ascii_case("true") {
                    Some(true)
                } else if s.eq_ignore_ascii_case("false") {
                    Some(false)
                } else {
                    None
                }
            }
            Value::F32(f) => Some(*f != 0.0),
            Value::F64(f) => Some(*f != 0.0),
            Value::Char(_) | Value::Timestamp(_) | Value::Blob(_) => None,
            other => other.as_i128().map(|v| v != 0),
        }
    }

    fn to_char(&self) -> Option<char> {
        match self {
            Value::Text(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(c),
                    _ => None,
                }
            }
            Value::Bool(_) | Value::F32(_) | Value::F64(_) => None,
            other => other
                .as_i128()
                .and_then(|v| u32::try_from(v).ok())
                .and_then(char::from_u32),
        }
    }

    fn to_float(&self) -> Option<f64> {
        match self {
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            Value::F32(f) => Some(f64::from(*f)),
            Value::F64(f) => Some(*f),
            Value::Char(_) | Value::Timestamp(_) | Value::Blob(_) => None,
            other => other.as_i128().map(|v| v as f64),
        }
    }

    fn to_text(&self) -> Option<String> {
        match self {
            Value::Blob(bytes) => String::from_utf8(bytes.clone()).ok(),
            other => Some(other.to_string()),
        }
    }

    fn to_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Text(s) => parse_timestamp(s.trim()),
            _ => None,
        }
    }
}

fn round_to_integer<T: TryFrom<i128>>(f: f64) -> Option<T> {
    if !f.is_finite() {
        return None;
    }
    let rounded = f.round_ties_even();
    if rounded < i128::MIN as f64 || rounded > i128::MAX as f64 {
        return None;
    }
    T::try_from(rounded as i128).ok()
}

/// Parse a timestamp as written by SQL backends.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]` (taken as UTC) and bare dates.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Char(v) => write!(f, "{}", v),
            Value::I8(v) => write!(f, "{}", v),
            Value::I16(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::U8(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            Value::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// Rust types that can be read out of a [`Value`].
pub trait FromValue: Sized {
    /// Declared type this Rust type maps to.
    const VALUE_TYPE: ValueType;

    fn from_value(value: Value) -> Result<Self>;
}

macro_rules! value_mapping {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }

            impl FromValue for $ty {
                const VALUE_TYPE: ValueType = ValueType::$variant;

                fn from_value(value: Value) -> Result<Self> {
                    match value.convert(ValueType::$variant)? {
                        Value::$variant(v) => Ok(v),
                        other => Err(Error::Conversion {
                            value: other.to_string(),
                            target: ValueType::$variant,
                        }),
                    }
                }
            }
        )*
    };
}

value_mapping! {
    bool => Bool,
    char => Char,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => Text,
    DateTime<Utc> => Timestamp,
    Vec<u8> => Blob,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const VALUE_TYPE: ValueType = T::VALUE_TYPE;

    fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}
