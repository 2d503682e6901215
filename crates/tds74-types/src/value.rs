//! Host-side representations of SQL Server values.

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// BIT.
    Bool(bool),
    /// TINYINT.
    TinyInt(u8),
    /// SMALLINT.
    SmallInt(i16),
    /// INT.
    Int(i32),
    /// BIGINT.
    BigInt(i64),
    /// REAL.
    Float(f32),
    /// FLOAT.
    Double(f64),
    /// DECIMAL, NUMERIC, MONEY and SMALLMONEY.
    Decimal(Decimal),
    /// Character data of any width.
    String(String),
    /// Binary data.
    Bytes(Bytes),
    /// DATE.
    Date(NaiveDate),
    /// TIME.
    Time(NaiveTime),
    /// DATETIME, SMALLDATETIME and DATETIME2.
    DateTime(NaiveDateTime),
    /// DATETIMEOFFSET, normalized to UTC.
    DateTimeUtc(DateTime<Utc>),
    /// UNIQUEIDENTIFIER.
    Uuid(Uuid),
}

impl Value {
    /// Whether the value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The value as an `i64`, widening from the narrower integer types.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::TinyInt(v) => Some(i64::from(*v)),
            Self::SmallInt(v) => Some(i64::from(*v)),
            Self::Int(v) => Some(i64::from(*v)),
            Self::BigInt(v) => Some(*v),
            Self::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// The value as an `f64`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as a string slice.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// The value as a decimal.
    #[must_use]
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

/// A request parameter, dispatched by tag when encoding RPC requests.
///
/// The wire knows native encodings for `Null`, `Int32`, `Text` and
/// `Decimal`; every other variant is coerced to its canonical text form and
/// shipped as a character parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// SQL NULL.
    Null,
    /// BIT, coerced to text ("1"/"0").
    Bool(bool),
    /// 32-bit integer, sent natively.
    Int32(i32),
    /// 64-bit integer, coerced to text.
    Int64(i64),
    /// Double-precision float, coerced to text.
    Float64(f64),
    /// Exact numeric, sent natively.
    Decimal(Decimal),
    /// Character data, sent natively as UCS-2.
    Text(String),
    /// Binary data, coerced to lowercase hex text.
    Bytes(Vec<u8>),
    /// Date, coerced to `YYYY-MM-DD` text.
    Date(NaiveDate),
    /// Time, coerced to text.
    Time(NaiveTime),
    /// Date and time, coerced to text.
    DateTime(NaiveDateTime),
    /// UUID, coerced to hyphenated text.
    Uuid(Uuid),
}

impl From<i32> for Param {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Decimal> for Param {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<Uuid> for Param {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl<T> From<Option<T>> for Param
where
    T: Into<Param>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}
