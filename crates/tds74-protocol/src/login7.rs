//! LOGIN7 message encoding.
//!
//! LOGIN7 is a fixed 94-byte header followed by a variable data section. The
//! header carries an offset/length table addressing each string in the data
//! section; lengths count UCS-2 code units, offsets count bytes from the
//! start of the payload. The password travels obfuscated, not encrypted, so
//! production connections rely on the TLS tunnel.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{ucs2_char_len, write_ucs2};
use crate::packet::DEFAULT_PACKET_SIZE;
use crate::prelogin::CLIENT_VERSION;

/// LOGIN7 fixed header size.
pub const LOGIN7_HEADER_SIZE: usize = 94;

/// TDS protocol version requested at login, little-endian on the wire.
pub const TDS_VERSION_7_4: u32 = 0x7400_0004;

// OptionFlags1: USE_DB_ON | INIT_DB_FATAL | SET_LANG_ON
const OPTION_FLAGS1: u8 = 0x20 | 0x40 | 0x80;
// OptionFlags2: ODBC_ON
const OPTION_FLAGS2: u8 = 0x02;
const TYPE_FLAGS: u8 = 0x00;
// OptionFlags3: tolerate collations the client does not know
const OPTION_FLAGS3: u8 = 0x80;

/// LOGIN7 message builder.
#[derive(Debug, Clone)]
pub struct Login7 {
    /// Client machine name.
    pub client_host: String,
    /// Login user name.
    pub user: String,
    /// Login password, obfuscated during encoding.
    pub password: String,
    /// Application name reported to the server.
    pub app_name: String,
    /// Server host name as dialed.
    pub server_host: String,
    /// Client library name.
    pub library_name: String,
    /// Initial language, empty for the server default.
    pub language: String,
    /// Initial database.
    pub database: String,
    /// Attach-database file path, normally empty.
    pub db_file: String,
    /// Requested packet size.
    pub packet_size: u32,
    /// Client process id.
    pub client_pid: u32,
    /// Client time zone offset from UTC in minutes.
    pub timezone_offset_min: i32,
    /// Client locale id.
    pub lcid: u32,
    /// Client MAC address slot, zeros when unknown.
    pub client_mac: [u8; 6],
}

impl Default for Login7 {
    fn default() -> Self {
        Self {
            client_host: String::new(),
            user: String::new(),
            password: String::new(),
            app_name: "tds74".into(),
            server_host: String::new(),
            library_name: "tds74".into(),
            language: String::new(),
            database: String::new(),
            db_file: String::new(),
            packet_size: DEFAULT_PACKET_SIZE as u32,
            client_pid: std::process::id(),
            timezone_offset_min: 0,
            lcid: 0x0409,
            client_mac: [0u8; 6],
        }
    }
}

impl Login7 {
    /// Encode the LOGIN7 payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let client_host_len = ucs2_char_len(&self.client_host) as u16;
        let user_len = ucs2_char_len(&self.user) as u16;
        let password_len = ucs2_char_len(&self.password) as u16;
        let app_name_len = ucs2_char_len(&self.app_name) as u16;
        let server_host_len = ucs2_char_len(&self.server_host) as u16;
        let library_len = ucs2_char_len(&self.library_name) as u16;
        let language_len = ucs2_char_len(&self.language) as u16;
        let database_len = ucs2_char_len(&self.database) as u16;
        let db_file_len = ucs2_char_len(&self.db_file) as u16;

        let total = LOGIN7_HEADER_SIZE
            + 2 * (client_host_len
                + user_len
                + password_len
                + app_name_len
                + server_host_len
                + library_len
                + language_len
                + database_len
                + db_file_len) as usize;

        let mut buf = BytesMut::with_capacity(total);
        buf.put_u32_le(total as u32);
        buf.put_u32_le(TDS_VERSION_7_4);
        buf.put_u32_le(self.packet_size);
        buf.put_slice(&CLIENT_VERSION);
        buf.put_u32_le(self.client_pid);
        buf.put_u32_le(0); // connection id
        buf.put_u8(OPTION_FLAGS1);
        buf.put_u8(OPTION_FLAGS2);
        buf.put_u8(TYPE_FLAGS);
        buf.put_u8(OPTION_FLAGS3);
        buf.put_i32_le(self.timezone_offset_min);
        buf.put_u32_le(self.lcid);

        fn entry(buf: &mut BytesMut, pos: &mut u16, len: u16) {
            buf.put_u16_le(*pos);
            buf.put_u16_le(len);
            *pos += len * 2;
        }

        let mut pos = LOGIN7_HEADER_SIZE as u16;
        entry(&mut buf, &mut pos, client_host_len);
        entry(&mut buf, &mut pos, user_len);
        entry(&mut buf, &mut pos, password_len);
        entry(&mut buf, &mut pos, app_name_len);
        entry(&mut buf, &mut pos, server_host_len);

        // Unused/extension slot.
        buf.put_u16_le(0);
        buf.put_u16_le(0);

        entry(&mut buf, &mut pos, library_len);
        entry(&mut buf, &mut pos, language_len);
        entry(&mut buf, &mut pos, database_len);

        buf.put_slice(&self.client_mac);

        // SSPI: present in the table, always empty here.
        buf.put_u16_le(pos);
        buf.put_u16_le(0);

        entry(&mut buf, &mut pos, db_file_len);

        // New password: present in the table, always empty here.
        buf.put_u16_le(pos);
        buf.put_u16_le(0);

        buf.put_u32_le(0); // SSPI long length

        debug_assert_eq!(buf.len(), LOGIN7_HEADER_SIZE);

        write_ucs2(&mut buf, &self.client_host);
        write_ucs2(&mut buf, &self.user);
        write_obfuscated_password(&mut buf, &self.password);
        write_ucs2(&mut buf, &self.app_name);
        write_ucs2(&mut buf, &self.server_host);
        write_ucs2(&mut buf, &self.library_name);
        write_ucs2(&mut buf, &self.language);
        write_ucs2(&mut buf, &self.database);
        write_ucs2(&mut buf, &self.db_file);

        buf.freeze()
    }
}

/// Write a password with the LOGIN7 obfuscation applied.
///
/// For every byte of the UCS-2 encoding: swap the high and low nibbles, then
/// XOR with `0xA5`.
pub fn write_obfuscated_password(dst: &mut impl BufMut, password: &str) {
    for unit in password.encode_utf16() {
        for byte in unit.to_le_bytes() {
            dst.put_u8(byte.rotate_right(4) ^ 0xA5);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn fixed_header_layout() {
        let login = Login7 {
            user: "sa".into(),
            password: "secret".into(),
            database: "test".into(),
            server_host: "db.example".into(),
            client_host: "client".into(),
            ..Default::default()
        };
        let buf = login.encode();

        // Total length is the first field.
        let total = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        assert_eq!(total as usize, buf.len());

        // TDS 7.4 version marker.
        assert_eq!(&buf[4..8], &[0x04, 0x00, 0x00, 0x74]);

        // Option flag bytes.
        assert_eq!(&buf[24..28], &[0xE0, 0x02, 0x00, 0x80]);
    }

    #[test]
    fn table_offsets_address_their_strings() {
        let login = Login7 {
            user: "u".into(),
            password: "p".into(),
            client_host: "h".into(),
            ..Default::default()
        };
        let buf = login.encode();

        // Second table entry (offset 40) addresses the user name.
        let user_off = u16::from_le_bytes([buf[40], buf[41]]) as usize;
        let user_len = u16::from_le_bytes([buf[42], buf[43]]) as usize;
        assert_eq!(user_len, 1);
        assert_eq!(&buf[user_off..user_off + 2], &[b'u', 0x00]);
    }

    #[test]
    fn password_obfuscation_known_value() {
        // 'a' = 0x0061: low byte 0x61 -> 0x16 -> 0xB3, high byte 0x00 -> 0xA5.
        let mut buf = BytesMut::new();
        write_obfuscated_password(&mut buf, "a");
        assert_eq!(&buf[..], &[0xB3, 0xA5]);
    }

    proptest! {
        #[test]
        fn password_obfuscation_formula(password in "\\PC{0,32}") {
            let mut buf = BytesMut::new();
            write_obfuscated_password(&mut buf, &password);

            let plain: Vec<u8> = password
                .encode_utf16()
                .flat_map(|u| u.to_le_bytes())
                .collect();
            prop_assert_eq!(buf.len(), plain.len());
            for (enc, c) in buf.iter().zip(plain) {
                let expected = (((c << 4) & 0xFF) | (c >> 4)) ^ 0xA5;
                prop_assert_eq!(*enc, expected);
            }
        }
    }
}
