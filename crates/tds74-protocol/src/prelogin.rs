//! PRELOGIN message encoding and response parsing.
//!
//! PRELOGIN is the first message on the wire. It is a table of
//! `{option:1, offset:2, length:2}` entries (offsets big-endian, relative to
//! the start of the payload) terminated by `0xFF`, followed by the option
//! payloads. The server answers in the same shape.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Client driver version advertised in the VERSION option.
pub const CLIENT_VERSION: [u8; 4] = [0, 0, 1, 0];

const OPTION_VERSION: u8 = 0x00;
const OPTION_ENCRYPTION: u8 = 0x01;
const OPTION_INSTANCE: u8 = 0x02;
const OPTION_THREAD_ID: u8 = 0x03;
const OPTION_MARS: u8 = 0x04;
const OPTION_TERMINATOR: u8 = 0xFF;

/// Encryption negotiation byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum EncryptionLevel {
    /// Encryption off (login-only on real servers).
    Off = 0x00,
    /// Encryption on.
    On = 0x01,
    /// Encryption not supported by this peer.
    NotSupported = 0x02,
    /// Encryption required.
    #[default]
    Required = 0x03,
}

impl EncryptionLevel {
    /// Create from a raw byte value. Unknown values map to `Off`.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x01 => Self::On,
            0x02 => Self::NotSupported,
            0x03 => Self::Required,
            _ => Self::Off,
        }
    }
}

/// PRELOGIN request builder.
#[derive(Debug, Clone)]
pub struct PreLogin {
    /// Requested encryption level.
    pub encryption: EncryptionLevel,
    /// Instance name, sent as NUL-terminated ASCII.
    pub instance_name: String,
    /// Client thread (or process) id, informational only.
    pub thread_id: u32,
}

impl PreLogin {
    /// Create a request for the given encryption level and instance name.
    #[must_use]
    pub fn new(encryption: EncryptionLevel, instance_name: impl Into<String>) -> Self {
        Self {
            encryption,
            instance_name: instance_name.into(),
            thread_id: std::process::id(),
        }
    }

    /// Encode the PRELOGIN payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut instance = self.instance_name.as_bytes().to_vec();
        instance.push(0);

        // Five fixed options plus the terminator: 5 * 5 + 1 bytes of table.
        let mut pos: u16 = 26;
        let mut buf = BytesMut::with_capacity(64);

        buf.put_u8(OPTION_VERSION);
        buf.put_u16(pos);
        buf.put_u16(6);
        pos += 6;

        buf.put_u8(OPTION_ENCRYPTION);
        buf.put_u16(pos);
        buf.put_u16(1);
        pos += 1;

        buf.put_u8(OPTION_INSTANCE);
        buf.put_u16(pos);
        buf.put_u16(instance.len() as u16);
        pos += instance.len() as u16;

        buf.put_u8(OPTION_THREAD_ID);
        buf.put_u16(pos);
        buf.put_u16(4);
        pos += 4;

        buf.put_u8(OPTION_MARS);
        buf.put_u16(pos);
        buf.put_u16(1);

        buf.put_u8(OPTION_TERMINATOR);
        debug_assert_eq!(buf.len(), 26);

        buf.put_slice(&CLIENT_VERSION);
        buf.put_u16(0); // sub-build
        buf.put_u8(self.encryption as u8);
        buf.put_slice(&instance);
        buf.put_u32(self.thread_id);
        buf.put_u8(0); // MARS disabled

        buf.freeze()
    }
}

/// Parsed PRELOGIN response.
#[derive(Debug, Clone, Default)]
pub struct PreLoginReply {
    /// Server's encryption decision.
    pub encryption: EncryptionLevel,
    /// Server's VERSION option payload, when present.
    pub version: Option<[u8; 6]>,
}

impl PreLoginReply {
    /// Decode a PRELOGIN response payload.
    ///
    /// Walks the option table and pulls the options the driver cares about.
    /// Unknown options are skipped; their payloads are addressed by offset so
    /// skipping is free.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut reply = Self::default();
        let mut table = payload;

        loop {
            if table.remaining() < 1 {
                return Err(ProtocolError::UnexpectedEof);
            }
            let option = table.get_u8();
            if option == OPTION_TERMINATOR {
                break;
            }
            ProtocolError::check_len(4, table.remaining())?;
            let offset = table.get_u16() as usize;
            let length = table.get_u16() as usize;

            if offset + length > payload.len() {
                return Err(ProtocolError::Truncated {
                    needed: offset + length,
                    available: payload.len(),
                });
            }
            let data = &payload[offset..offset + length];

            match option {
                OPTION_ENCRYPTION if length >= 1 => {
                    reply.encryption = EncryptionLevel::from_u8(data[0]);
                }
                OPTION_VERSION if length >= 6 => {
                    let mut version = [0u8; 6];
                    version.copy_from_slice(&data[..6]);
                    reply.version = Some(version);
                }
                _ => {}
            }
        }

        Ok(reply)
    }

    /// Whether the server chose to tunnel TLS inside PRELOGIN packets.
    #[must_use]
    pub fn wants_tls(&self) -> bool {
        self.encryption == EncryptionLevel::On
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout() {
        let prelogin = PreLogin {
            encryption: EncryptionLevel::On,
            instance_name: "MSSQLServer".into(),
            thread_id: 42,
        };
        let buf = prelogin.encode();

        // Table is exactly 26 bytes, version payload starts right after.
        assert_eq!(buf[0], OPTION_VERSION);
        assert_eq!(&buf[1..3], &[0, 26]);
        assert_eq!(buf[25], OPTION_TERMINATOR);

        // Encryption byte sits at offset 32: 26 table + 6 version bytes.
        assert_eq!(buf[32], EncryptionLevel::On as u8);

        // Instance name is NUL-terminated ASCII.
        let start = 33;
        assert_eq!(&buf[start..start + 12], b"MSSQLServer\0");
    }

    #[test]
    fn decode_own_encoding() {
        let prelogin = PreLogin {
            encryption: EncryptionLevel::Required,
            instance_name: "inst".into(),
            thread_id: 7,
        };
        let reply = PreLoginReply::decode(&prelogin.encode()).unwrap();
        assert_eq!(reply.encryption, EncryptionLevel::Required);
        assert_eq!(reply.version, Some([0, 0, 1, 0, 0, 0]));
        assert!(!reply.wants_tls());
    }

    #[test]
    fn only_encrypt_on_requests_the_tunnel() {
        for (byte, tunnel) in [(0u8, false), (1, true), (2, false), (3, false)] {
            let reply = PreLoginReply {
                encryption: EncryptionLevel::from_u8(byte),
                version: None,
            };
            assert_eq!(reply.wants_tls(), tunnel);
        }
    }

    #[test]
    fn decode_rejects_out_of_range_offsets() {
        // One option pointing past the end of the payload.
        let bad = [OPTION_ENCRYPTION, 0x00, 0x40, 0x00, 0x01, OPTION_TERMINATOR];
        assert!(PreLoginReply::decode(&bad).is_err());
    }
}
