//! RPC parameter encoding.
//!
//! Each parameter travels as `{name-length:1, status:1, type-id:1,
//! type-metadata, value}`. Parameters are positional, so the name length is
//! always zero, and no output parameters are supported, so the status byte
//! is always zero. Only NULL, 32-bit integers, text and decimals have
//! native encodings; every other [`Param`] variant is coerced to text.

use bytes::{BufMut, Bytes, BytesMut};
use rust_decimal::Decimal;
use tds74_protocol::types::type_id;

use crate::error::TypeError;
use crate::value::Param;

/// Encode one parameter into its full wire image.
///
/// `lcid` fills the collation of text parameters; `decimal_precision` is the
/// precision byte advertised for decimal parameters.
pub fn encode_param(
    param: &Param,
    lcid: u32,
    decimal_precision: u8,
) -> Result<Bytes, TypeError> {
    let mut buf = BytesMut::with_capacity(16);
    buf.put_u8(0); // name length
    buf.put_u8(0); // status flags

    match param {
        Param::Null => {
            buf.put_u8(type_id::INTN);
            buf.put_u8(2); // declared size
            buf.put_u8(0); // zero-length value: NULL
        }
        Param::Int32(v) => {
            buf.put_u8(type_id::INTN);
            buf.put_u8(4);
            buf.put_u8(4);
            buf.put_i32_le(*v);
        }
        Param::Text(s) => put_text(&mut buf, s, lcid),
        Param::Decimal(d) => put_decimal(&mut buf, d, decimal_precision)?,

        // Everything else is coerced to its canonical text form.
        Param::Bool(v) => put_text(&mut buf, if *v { "1" } else { "0" }, lcid),
        Param::Int64(v) => put_text(&mut buf, &v.to_string(), lcid),
        Param::Float64(v) => put_text(&mut buf, &v.to_string(), lcid),
        Param::Bytes(v) => put_text(&mut buf, &hex_lower(v), lcid),
        Param::Date(v) => put_text(&mut buf, &v.to_string(), lcid),
        Param::Time(v) => put_text(&mut buf, &v.to_string(), lcid),
        Param::DateTime(v) => put_text(&mut buf, &v.format("%Y-%m-%d %H:%M:%S%.f").to_string(), lcid),
        Param::Uuid(v) => put_text(&mut buf, &v.to_string(), lcid),
    }

    Ok(buf.freeze())
}

fn put_text(buf: &mut BytesMut, s: &str, lcid: u32) {
    let byte_len = s.encode_utf16().count() * 2;

    buf.put_u8(type_id::NCHAR);
    buf.put_u16_le(byte_len as u16); // declared size
    buf.put_u16_le(lcid as u16); // collation: locale id
    buf.put_slice(&[0, 0, 0]); // collation: flags and sort id
    buf.put_u16_le(byte_len as u16); // value length
    for unit in s.encode_utf16() {
        buf.put_u16_le(unit);
    }
}

fn put_decimal(buf: &mut BytesMut, d: &Decimal, precision: u8) -> Result<(), TypeError> {
    let scale = d.scale() as u8;
    let mantissa = d.mantissa();
    let magnitude = mantissa.unsigned_abs();
    if magnitude > u128::from(u64::MAX) {
        return Err(TypeError::NumericOverflow);
    }

    buf.put_u8(type_id::DECIMALN);
    buf.put_u8(9); // declared size: sign byte + 8-byte magnitude
    buf.put_u8(precision);
    buf.put_u8(scale);
    buf.put_u8(9); // value length
    buf.put_u8(u8::from(mantissa >= 0)); // 1 positive, 0 negative
    buf.put_u64_le(magnitude as u64);
    Ok(())
}

fn hex_lower(data: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const LCID: u32 = 1033;

    #[test]
    fn null_param() {
        let image = encode_param(&Param::Null, LCID, 28).unwrap();
        assert_eq!(&image[..], &[0, 0, type_id::INTN, 2, 0]);
    }

    #[test]
    fn int32_param() {
        let image = encode_param(&Param::Int32(0x01020304), LCID, 28).unwrap();
        assert_eq!(
            &image[..],
            &[0, 0, type_id::INTN, 4, 4, 0x04, 0x03, 0x02, 0x01]
        );
    }

    #[test]
    fn text_param_carries_locale() {
        let image = encode_param(&Param::Text("ab".into()), LCID, 28).unwrap();
        assert_eq!(image[2], type_id::NCHAR);
        assert_eq!(&image[3..5], &[4, 0]); // declared byte length
        assert_eq!(&image[5..7], &(LCID as u16).to_le_bytes()); // collation lcid
        assert_eq!(&image[7..10], &[0, 0, 0]);
        assert_eq!(&image[10..12], &[4, 0]); // value byte length
        assert_eq!(&image[12..], &[b'a', 0, b'b', 0]);
    }

    #[test]
    fn decimal_param_layout() {
        let d = Decimal::from_str("-12.34").unwrap();
        let image = encode_param(&Param::Decimal(d), LCID, 28).unwrap();
        assert_eq!(image[2], type_id::DECIMALN);
        assert_eq!(image[3], 9);
        assert_eq!(image[4], 28); // precision
        assert_eq!(image[5], 2); // scale
        assert_eq!(image[6], 9); // value length
        assert_eq!(image[7], 0); // negative
        assert_eq!(&image[8..16], &1234u64.to_le_bytes());
    }

    #[test]
    fn bool_coerces_to_text() {
        let image = encode_param(&Param::Bool(true), LCID, 28).unwrap();
        assert_eq!(image[2], type_id::NCHAR);
        assert_eq!(&image[12..], &[b'1', 0]);
    }

    #[test]
    fn bytes_coerce_to_hex_text() {
        let image = encode_param(&Param::Bytes(vec![0xDE, 0xAD]), LCID, 28).unwrap();
        assert_eq!(&image[12..], &[b'd', 0, b'e', 0, b'a', 0, b'd', 0]);
    }
}
