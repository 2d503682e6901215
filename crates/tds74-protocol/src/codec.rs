//! UCS-2 string primitives shared by the encoders and the token parser.

use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

/// Read a length-prefixed UCS-2 LE string with a 1-byte character count.
pub fn read_b_varchar(src: &mut impl Buf) -> Result<String, ProtocolError> {
    ProtocolError::check_len(1, src.remaining())?;
    let chars = src.get_u8() as usize;
    read_ucs2(src, chars)
}

/// Read a length-prefixed UCS-2 LE string with a 2-byte character count.
pub fn read_us_varchar(src: &mut impl Buf) -> Result<String, ProtocolError> {
    ProtocolError::check_len(2, src.remaining())?;
    let chars = src.get_u16_le() as usize;
    read_ucs2(src, chars)
}

/// Read `chars` UCS-2 LE code units and decode them.
pub fn read_ucs2(src: &mut impl Buf, chars: usize) -> Result<String, ProtocolError> {
    ProtocolError::check_len(chars * 2, src.remaining())?;
    let mut units = Vec::with_capacity(chars);
    for _ in 0..chars {
        units.push(src.get_u16_le());
    }
    String::from_utf16(&units).map_err(|_| ProtocolError::StringEncoding)
}

/// Write a UCS-2 LE string without a length prefix.
pub fn write_ucs2(dst: &mut impl BufMut, s: &str) {
    for unit in s.encode_utf16() {
        dst.put_u16_le(unit);
    }
}

/// Write a length-prefixed UCS-2 LE string with a 1-byte character count.
pub fn write_b_varchar(dst: &mut impl BufMut, s: &str) {
    let units: Vec<u16> = s.encode_utf16().collect();
    let len = units.len().min(255);
    dst.put_u8(len as u8);
    for &unit in &units[..len] {
        dst.put_u16_le(unit);
    }
}

/// Number of bytes `s` occupies once encoded as UCS-2 LE.
#[must_use]
pub fn ucs2_byte_len(s: &str) -> usize {
    s.encode_utf16().count() * 2
}

/// Number of UCS-2 code units in `s`.
#[must_use]
pub fn ucs2_char_len(s: &str) -> usize {
    s.encode_utf16().count()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn b_varchar_roundtrip() {
        let mut buf = BytesMut::new();
        write_b_varchar(&mut buf, "name_ユーザー");
        let mut cursor = buf.freeze();
        assert_eq!(read_b_varchar(&mut cursor).unwrap(), "name_ユーザー");
    }

    #[test]
    fn ucs2_is_little_endian() {
        let mut buf = BytesMut::new();
        write_ucs2(&mut buf, "A");
        assert_eq!(&buf[..], &[0x41, 0x00]);
    }

    #[test]
    fn ucs2_byte_len_counts_code_units() {
        assert_eq!(ucs2_byte_len("SELECT"), 12);
        assert_eq!(ucs2_byte_len("日本"), 4);
    }

    #[test]
    fn truncated_string_is_an_error() {
        let mut cursor = bytes::Bytes::from_static(&[4, 0x41, 0x00]);
        assert!(read_b_varchar(&mut cursor).is_err());
    }
}
