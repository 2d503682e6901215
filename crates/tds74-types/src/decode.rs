//! Column value decoding.
//!
//! One decoder per wire type id, each consuming exactly the bytes it owns
//! from a shared cursor over the response buffer. The dispatch table is
//! keyed by the type id of the column's descriptor; size, precision, scale
//! and collation come from the same descriptor.

use bytes::{Buf, Bytes, BytesMut};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use encoding_rs::Encoding;
use rust_decimal::Decimal;
use tds74_protocol::token::ColumnDesc;
use tds74_protocol::types::type_id;
use uuid::Uuid;

use crate::error::TypeError;
use crate::value::Value;

/// Marker in a variable-size descriptor that selects PLP encoding.
pub const PLP_MAX_SIZE: u32 = 0xFFFF;

/// PLP total-length value meaning NULL.
const PLP_NULL: u64 = 0xFFFF_FFFF_FFFF_FFFF;

/// Decode one column value.
///
/// `encoding` is the session's server encoding, used for the non-Unicode
/// BIGCHAR/BIGVARCHR columns. Unicode columns and TEXT decode as UCS-2.
pub fn decode_value(
    buf: &mut Bytes,
    col: &ColumnDesc,
    encoding: &'static Encoding,
) -> Result<Value, TypeError> {
    match col.type_id {
        type_id::INT1 => {
            TypeError::check_len(1, buf.remaining())?;
            Ok(Value::TinyInt(buf.get_u8()))
        }
        type_id::BIT => {
            TypeError::check_len(1, buf.remaining())?;
            Ok(Value::Bool(buf.get_u8() != 0))
        }
        type_id::INT2 => {
            TypeError::check_len(2, buf.remaining())?;
            Ok(Value::SmallInt(buf.get_i16_le()))
        }
        type_id::INT4 => {
            TypeError::check_len(4, buf.remaining())?;
            Ok(Value::Int(buf.get_i32_le()))
        }
        type_id::INT8 => {
            TypeError::check_len(8, buf.remaining())?;
            Ok(Value::BigInt(buf.get_i64_le()))
        }
        type_id::FLT4 => {
            TypeError::check_len(4, buf.remaining())?;
            Ok(Value::Float(buf.get_f32_le()))
        }
        type_id::FLT8 => {
            TypeError::check_len(8, buf.remaining())?;
            Ok(Value::Double(buf.get_f64_le()))
        }
        type_id::MONEY => {
            TypeError::check_len(8, buf.remaining())?;
            Ok(Value::Decimal(decode_money8(buf)))
        }
        type_id::MONEY4 => {
            TypeError::check_len(4, buf.remaining())?;
            Ok(Value::Decimal(Decimal::new(
                i64::from(buf.get_i32_le()),
                4,
            )))
        }
        type_id::INTN => decode_intn(buf),
        type_id::BITN => decode_bitn(buf),
        type_id::FLTN => decode_fltn(buf),
        type_id::MONEYN => decode_moneyn(buf),
        type_id::DECIMALN | type_id::NUMERICN => decode_decimaln(buf, col),
        type_id::GUID => decode_guid(buf),
        type_id::BIGVARBIN => {
            if col.size == PLP_MAX_SIZE {
                decode_plp(buf)?.map_or(Ok(Value::Null), |data| Ok(Value::Bytes(data)))
            } else {
                decode_binary(buf)
            }
        }
        type_id::BIGBINARY => decode_binary(buf),
        type_id::BIGVARCHR if col.size == PLP_MAX_SIZE => match decode_plp(buf)? {
            None => Ok(Value::Null),
            Some(data) => decode_with_encoding(&data, encoding),
        },
        type_id::BIGVARCHR | type_id::BIGCHAR => decode_server_chars(buf, encoding),
        type_id::NVARCHAR if col.size == PLP_MAX_SIZE => match decode_plp(buf)? {
            None => Ok(Value::Null),
            Some(data) => Ok(Value::String(decode_ucs2(&data)?)),
        },
        type_id::NVARCHAR | type_id::NCHAR => decode_nchars(buf),
        type_id::DATEN => decode_daten(buf),
        type_id::TIMEN => decode_timen(buf, col),
        type_id::DATETIME2N => decode_datetime2(buf, col),
        type_id::DATETIMEOFFSETN => decode_datetimeoffset(buf, col),
        type_id::DATETIME => {
            TypeError::check_len(8, buf.remaining())?;
            let days = i64::from(buf.get_i32_le());
            let ticks = i64::from(buf.get_u32_le());
            Ok(Value::DateTime(datetime_300hz(days, ticks)?))
        }
        type_id::DATETIM4 => {
            TypeError::check_len(4, buf.remaining())?;
            let days = i64::from(buf.get_u16_le());
            let ticks = i64::from(buf.get_u16_le());
            Ok(Value::DateTime(datetime_300hz(days, ticks)?))
        }
        type_id::DATETIMN => decode_datetimn(buf),
        type_id::SSVARIANT => decode_variant(buf),
        type_id::IMAGE | type_id::TEXT => decode_blob(buf, col.type_id),
        other => Err(TypeError::UnsupportedType(other)),
    }
}

fn decode_money8(buf: &mut Bytes) -> Decimal {
    // Eight bytes, high half first, forming a scale-4 integer.
    let high = i64::from(buf.get_i32_le());
    let low = i64::from(buf.get_u32_le());
    Decimal::from_i128_with_scale(i128::from((high << 32) | low), 4)
}

fn decode_intn(buf: &mut Bytes) -> Result<Value, TypeError> {
    TypeError::check_len(1, buf.remaining())?;
    let len = buf.get_u8() as usize;
    if len == 0 {
        return Ok(Value::Null);
    }
    TypeError::check_len(len, buf.remaining())?;
    match len {
        1 => Ok(Value::TinyInt(buf.get_u8())),
        2 => Ok(Value::SmallInt(buf.get_i16_le())),
        4 => Ok(Value::Int(buf.get_i32_le())),
        8 => Ok(Value::BigInt(buf.get_i64_le())),
        len => Err(TypeError::InvalidLength {
            type_id: type_id::INTN,
            len,
        }),
    }
}

fn decode_bitn(buf: &mut Bytes) -> Result<Value, TypeError> {
    TypeError::check_len(1, buf.remaining())?;
    let len = buf.get_u8() as usize;
    match len {
        0 => Ok(Value::Null),
        1 => {
            TypeError::check_len(1, buf.remaining())?;
            Ok(Value::Bool(buf.get_u8() != 0))
        }
        len => Err(TypeError::InvalidLength {
            type_id: type_id::BITN,
            len,
        }),
    }
}

fn decode_fltn(buf: &mut Bytes) -> Result<Value, TypeError> {
    TypeError::check_len(1, buf.remaining())?;
    let len = buf.get_u8() as usize;
    if len == 0 {
        return Ok(Value::Null);
    }
    TypeError::check_len(len, buf.remaining())?;
    match len {
        4 => Ok(Value::Float(buf.get_f32_le())),
        8 => Ok(Value::Double(buf.get_f64_le())),
        len => Err(TypeError::InvalidLength {
            type_id: type_id::FLTN,
            len,
        }),
    }
}

fn decode_moneyn(buf: &mut Bytes) -> Result<Value, TypeError> {
    TypeError::check_len(1, buf.remaining())?;
    let len = buf.get_u8() as usize;
    if len == 0 {
        return Ok(Value::Null);
    }
    TypeError::check_len(len, buf.remaining())?;
    match len {
        8 => Ok(Value::Decimal(decode_money8(buf))),
        4 => Ok(Value::Decimal(Decimal::new(i64::from(buf.get_i32_le()), 4))),
        len => Err(TypeError::InvalidLength {
            type_id: type_id::MONEYN,
            len,
        }),
    }
}

fn decode_decimaln(buf: &mut Bytes, col: &ColumnDesc) -> Result<Value, TypeError> {
    TypeError::check_len(1, buf.remaining())?;
    let len = buf.get_u8() as usize;
    if len == 0 {
        return Ok(Value::Null);
    }
    TypeError::check_len(len, buf.remaining())?;
    if len < 2 || len > 17 {
        return Err(TypeError::InvalidLength {
            type_id: col.type_id,
            len,
        });
    }

    // Sign byte: zero means negative. Magnitude follows little-endian.
    let positive = buf.get_u8() != 0;
    let mut magnitude_bytes = [0u8; 16];
    for slot in magnitude_bytes.iter_mut().take(len - 1) {
        *slot = buf.get_u8();
    }
    let magnitude = u128::from_le_bytes(magnitude_bytes);
    if magnitude > i128::MAX as u128 {
        return Err(TypeError::NumericOverflow);
    }

    let mut unscaled = magnitude as i128;
    if !positive {
        unscaled = -unscaled;
    }
    let scale = u32::from(col.scale.unwrap_or(0));
    Decimal::try_from_i128_with_scale(unscaled, scale)
        .map(Value::Decimal)
        .map_err(|_| TypeError::NumericOverflow)
}

fn decode_guid(buf: &mut Bytes) -> Result<Value, TypeError> {
    TypeError::check_len(1, buf.remaining())?;
    let len = buf.get_u8() as usize;
    if len == 0 {
        return Ok(Value::Null);
    }
    if len != 16 {
        return Err(TypeError::InvalidLength {
            type_id: type_id::GUID,
            len,
        });
    }
    TypeError::check_len(16, buf.remaining())?;

    // The first three fields are little-endian on the wire, the rest is
    // big-endian, so reorder into RFC 4122 layout.
    let mut raw = [0u8; 16];
    buf.copy_to_slice(&mut raw);
    let ordered = [
        raw[3], raw[2], raw[1], raw[0], raw[5], raw[4], raw[7], raw[6], raw[8], raw[9], raw[10],
        raw[11], raw[12], raw[13], raw[14], raw[15],
    ];
    Ok(Value::Uuid(Uuid::from_bytes(ordered)))
}

fn decode_binary(buf: &mut Bytes) -> Result<Value, TypeError> {
    TypeError::check_len(2, buf.remaining())?;
    let len = buf.get_u16_le() as usize;
    if len == 0xFFFF {
        return Ok(Value::Null);
    }
    TypeError::check_len(len, buf.remaining())?;
    Ok(Value::Bytes(buf.copy_to_bytes(len)))
}

fn decode_server_chars(buf: &mut Bytes, encoding: &'static Encoding) -> Result<Value, TypeError> {
    TypeError::check_len(2, buf.remaining())?;
    let len = buf.get_i16_le();
    if len < 0 {
        return Ok(Value::Null);
    }
    let len = len as usize;
    TypeError::check_len(len, buf.remaining())?;
    let data = buf.copy_to_bytes(len);
    decode_with_encoding(&data, encoding)
}

fn decode_with_encoding(data: &[u8], encoding: &'static Encoding) -> Result<Value, TypeError> {
    let (text, _, had_errors) = encoding.decode(data);
    if had_errors {
        return Err(TypeError::InvalidEncoding(format!(
            "byte sequence not valid {}",
            encoding.name()
        )));
    }
    Ok(Value::String(text.into_owned()))
}

fn decode_nchars(buf: &mut Bytes) -> Result<Value, TypeError> {
    TypeError::check_len(2, buf.remaining())?;
    let len = buf.get_i16_le();
    if len < 0 {
        return Ok(Value::Null);
    }
    let len = len as usize;
    TypeError::check_len(len, buf.remaining())?;
    let data = buf.copy_to_bytes(len);
    Ok(Value::String(decode_ucs2(&data)?))
}

/// Decode a UCS-2 LE byte run.
pub fn decode_ucs2(data: &[u8]) -> Result<String, TypeError> {
    if data.len() % 2 != 0 {
        return Err(TypeError::InvalidEncoding(
            "UCS-2 data with odd byte length".into(),
        ));
    }
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| TypeError::InvalidEncoding(e.to_string()))
}

/// Decode a partially length-prefixed value. `None` means SQL NULL.
fn decode_plp(buf: &mut Bytes) -> Result<Option<Bytes>, TypeError> {
    TypeError::check_len(8, buf.remaining())?;
    let total = buf.get_u64_le();
    if total == PLP_NULL {
        return Ok(None);
    }

    let mut out = BytesMut::new();
    loop {
        TypeError::check_len(4, buf.remaining())?;
        let chunk = buf.get_u32_le() as usize;
        if chunk == 0 {
            break;
        }
        TypeError::check_len(chunk, buf.remaining())?;
        out.extend_from_slice(&buf.copy_to_bytes(chunk));
    }
    Ok(Some(out.freeze()))
}

fn decode_daten(buf: &mut Bytes) -> Result<Value, TypeError> {
    TypeError::check_len(1, buf.remaining())?;
    let len = buf.get_u8() as usize;
    if len == 0 {
        return Ok(Value::Null);
    }
    if len != 3 {
        return Err(TypeError::InvalidLength {
            type_id: type_id::DATEN,
            len,
        });
    }
    TypeError::check_len(3, buf.remaining())?;
    let days = read_uint_le(buf, 3);
    Ok(Value::Date(date_from_days(days)?))
}

fn decode_timen(buf: &mut Bytes, col: &ColumnDesc) -> Result<Value, TypeError> {
    TypeError::check_len(1, buf.remaining())?;
    let len = buf.get_u8() as usize;
    if len == 0 {
        return Ok(Value::Null);
    }
    if len > 5 {
        return Err(TypeError::InvalidLength {
            type_id: type_id::TIMEN,
            len,
        });
    }
    TypeError::check_len(len, buf.remaining())?;
    let raw = read_uint_le(buf, len);
    Ok(Value::Time(time_from_units(
        raw,
        col.precision.unwrap_or(7),
    )?))
}

fn decode_datetime2(buf: &mut Bytes, col: &ColumnDesc) -> Result<Value, TypeError> {
    TypeError::check_len(1, buf.remaining())?;
    let len = buf.get_u8() as usize;
    if len == 0 {
        return Ok(Value::Null);
    }
    if !(4..=8).contains(&len) {
        return Err(TypeError::InvalidLength {
            type_id: type_id::DATETIME2N,
            len,
        });
    }
    TypeError::check_len(len, buf.remaining())?;
    let time = time_from_units(read_uint_le(buf, len - 3), col.precision.unwrap_or(7))?;
    let date = date_from_days(read_uint_le(buf, 3))?;
    Ok(Value::DateTime(date.and_time(time)))
}

fn decode_datetimeoffset(buf: &mut Bytes, col: &ColumnDesc) -> Result<Value, TypeError> {
    TypeError::check_len(1, buf.remaining())?;
    let len = buf.get_u8() as usize;
    if len == 0 {
        return Ok(Value::Null);
    }
    if !(6..=10).contains(&len) {
        return Err(TypeError::InvalidLength {
            type_id: type_id::DATETIMEOFFSETN,
            len,
        });
    }
    TypeError::check_len(len, buf.remaining())?;
    let time = time_from_units(read_uint_le(buf, len - 5), col.precision.unwrap_or(7))?;
    let date = date_from_days(read_uint_le(buf, 3))?;
    // The stored instant is already UTC; the trailing offset only says how
    // the server would display it.
    let _offset_minutes = buf.get_i16_le();
    Ok(Value::DateTimeUtc(DateTime::from_naive_utc_and_offset(
        date.and_time(time),
        Utc,
    )))
}

fn decode_datetimn(buf: &mut Bytes) -> Result<Value, TypeError> {
    TypeError::check_len(1, buf.remaining())?;
    let len = buf.get_u8() as usize;
    if len == 0 {
        return Ok(Value::Null);
    }
    TypeError::check_len(len, buf.remaining())?;
    match len {
        8 => {
            let days = i64::from(buf.get_i32_le());
            let ticks = i64::from(buf.get_u32_le());
            Ok(Value::DateTime(datetime_300hz(days, ticks)?))
        }
        4 => {
            let days = i64::from(buf.get_u16_le());
            let ticks = i64::from(buf.get_u16_le());
            Ok(Value::DateTime(datetime_300hz(days, ticks)?))
        }
        len => Err(TypeError::InvalidLength {
            type_id: type_id::DATETIMN,
            len,
        }),
    }
}

fn decode_variant(buf: &mut Bytes) -> Result<Value, TypeError> {
    TypeError::check_len(4, buf.remaining())?;
    let len = buf.get_u32_le() as usize;
    if len == 0 {
        return Ok(Value::Null);
    }
    TypeError::check_len(len, buf.remaining())?;
    let mut body = buf.copy_to_bytes(len);

    TypeError::check_len(2, body.remaining())?;
    let inner = body.get_u8();
    let _prop = body.get_u8();

    match inner {
        type_id::INT1 => {
            TypeError::check_len(1, body.remaining())?;
            Ok(Value::TinyInt(body.get_u8()))
        }
        type_id::INT2 => {
            TypeError::check_len(2, body.remaining())?;
            Ok(Value::SmallInt(body.get_i16_le()))
        }
        type_id::INT4 => {
            TypeError::check_len(4, body.remaining())?;
            Ok(Value::Int(body.get_i32_le()))
        }
        type_id::NVARCHAR => {
            TypeError::check_len(5, body.remaining())?;
            body.advance(5); // collation
            TypeError::check_len(2, body.remaining())?;
            let chars = body.get_u16_le() as usize;
            TypeError::check_len(chars * 2, body.remaining())?;
            let data = body.copy_to_bytes(chars * 2);
            Ok(Value::String(decode_ucs2(&data)?))
        }
        type_id::DATETIME => {
            TypeError::check_len(8, body.remaining())?;
            let days = i64::from(body.get_i32_le());
            let ticks = i64::from(body.get_u32_le());
            Ok(Value::DateTime(datetime_300hz(days, ticks)?))
        }
        other => Err(TypeError::UnsupportedVariantType(other)),
    }
}

fn decode_blob(buf: &mut Bytes, ty: u8) -> Result<Value, TypeError> {
    TypeError::check_len(1, buf.remaining())?;
    let ptr_len = buf.get_u8() as usize;
    if ptr_len == 0 {
        return Ok(Value::Null);
    }
    // Text pointer, then an 8-byte timestamp, then the data length.
    TypeError::check_len(ptr_len + 8 + 4, buf.remaining())?;
    buf.advance(ptr_len);
    buf.advance(8);
    let len = buf.get_u32_le() as usize;
    TypeError::check_len(len, buf.remaining())?;
    let data = buf.copy_to_bytes(len);

    if ty == type_id::TEXT {
        Ok(Value::String(decode_ucs2(&data)?))
    } else {
        Ok(Value::Bytes(data))
    }
}

/// Read a little-endian unsigned integer of 1..=8 bytes.
fn read_uint_le(buf: &mut Bytes, len: usize) -> u64 {
    let mut raw = [0u8; 8];
    for slot in raw.iter_mut().take(len.min(8)) {
        *slot = buf.get_u8();
    }
    u64::from_le_bytes(raw)
}

/// Days since 0001-01-01 to a calendar date.
fn date_from_days(days: u64) -> Result<NaiveDate, TypeError> {
    let base = NaiveDate::from_ymd_opt(1, 1, 1)
        .ok_or_else(|| TypeError::InvalidDateTime("calendar base".into()))?;
    base.checked_add_signed(Duration::days(days as i64))
        .ok_or_else(|| TypeError::InvalidDateTime(format!("day count {days} out of range")))
}

/// A count of `10^(7-precision)` hundred-nanosecond units since midnight.
fn time_from_units(raw: u64, precision: u8) -> Result<NaiveTime, TypeError> {
    let precision = precision.min(7);
    let units = raw
        .checked_mul(10u64.pow(u32::from(7 - precision)))
        .ok_or_else(|| TypeError::InvalidDateTime("time unit overflow".into()))?;
    let nanos = units
        .checked_mul(100)
        .ok_or_else(|| TypeError::InvalidDateTime("time unit overflow".into()))?;

    let secs = (nanos / 1_000_000_000) as u32;
    let nano_part = (nanos % 1_000_000_000) as u32;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nano_part)
        .ok_or_else(|| TypeError::InvalidDateTime(format!("{secs}s past midnight")))
}

/// DATETIME arithmetic: days and 1/300-second ticks from 1900-01-01, with
/// millisecond truncation at `ticks % 300 * 10 / 3`.
fn datetime_300hz(days: i64, ticks: i64) -> Result<NaiveDateTime, TypeError> {
    let base = NaiveDate::from_ymd_opt(1900, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| TypeError::InvalidDateTime("calendar base".into()))?;

    let millis = ticks % 300 * 10 / 3;
    let seconds = ticks / 300;

    base.checked_add_signed(Duration::days(days))
        .and_then(|dt| dt.checked_add_signed(Duration::seconds(seconds)))
        .and_then(|dt| dt.checked_add_signed(Duration::milliseconds(millis)))
        .ok_or_else(|| TypeError::InvalidDateTime(format!("{days} days, {ticks} ticks")))
}
