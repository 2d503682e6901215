//! TDS packet header definitions.

use bitflags::bitflags;
use bytes::{Buf, BufMut};

use crate::error::ProtocolError;

/// TDS packet header size in bytes.
pub const PACKET_HEADER_SIZE: usize = 8;

/// Default negotiated packet size.
pub const DEFAULT_PACKET_SIZE: usize = 4096;

/// Largest packet size the header's 16-bit length field can express.
pub const MAX_PACKET_SIZE: usize = 65535;

/// TDS packet (message) type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// SQL batch request.
    SqlBatch = 0x01,
    /// Remote procedure call request.
    Rpc = 0x03,
    /// Tabular response from the server.
    TabularResult = 0x04,
    /// Transaction manager request.
    TransactionManager = 0x0E,
    /// TDS 7.x LOGIN7 packet.
    Login7 = 0x10,
    /// Pre-login packet.
    PreLogin = 0x12,
}

impl PacketType {
    /// Create a packet type from a raw byte value.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0x01 => Ok(Self::SqlBatch),
            0x03 => Ok(Self::Rpc),
            0x04 => Ok(Self::TabularResult),
            0x0E => Ok(Self::TransactionManager),
            0x10 => Ok(Self::Login7),
            0x12 => Ok(Self::PreLogin),
            _ => Err(ProtocolError::InvalidPacketType(value)),
        }
    }
}

bitflags! {
    /// TDS packet status flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PacketStatus: u8 {
        /// Normal packet, more packets of the message follow.
        const NORMAL = 0x00;
        /// Last packet of the message.
        const END_OF_MESSAGE = 0x01;
        /// Ignore this event.
        const IGNORE_EVENT = 0x02;
        /// Reset connection state before processing.
        const RESET_CONNECTION = 0x08;
    }
}

/// The 8-byte header that begins every TDS packet.
///
/// The length and SPID fields are big-endian; everything that follows the
/// header is governed by the payload's own endianness rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Packet type.
    pub packet_type: PacketType,
    /// Status flags.
    pub status: PacketStatus,
    /// Total packet length including the header.
    pub length: u16,
    /// Server process id echoed by the server, zero from the client.
    pub spid: u16,
    /// Packet sequence number, wrapping at 255.
    pub packet_id: u8,
    /// Window, always zero.
    pub window: u8,
}

impl PacketHeader {
    /// Create a header with zeroed SPID/packet-id/window.
    #[must_use]
    pub const fn new(packet_type: PacketType, status: PacketStatus, length: u16) -> Self {
        Self {
            packet_type,
            status,
            length,
            spid: 0,
            packet_id: 0,
            window: 0,
        }
    }

    /// Parse a packet header from bytes.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        ProtocolError::check_len(PACKET_HEADER_SIZE, src.remaining())?;

        let packet_type = PacketType::from_u8(src.get_u8())?;
        let status_byte = src.get_u8();
        let status = PacketStatus::from_bits(status_byte)
            .ok_or(ProtocolError::InvalidPacketStatus(status_byte))?;
        let length = src.get_u16();
        let spid = src.get_u16();
        let packet_id = src.get_u8();
        let window = src.get_u8();

        Ok(Self {
            packet_type,
            status,
            length,
            spid,
            packet_id,
            window,
        })
    }

    /// Encode the packet header to bytes.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u8(self.packet_type as u8);
        dst.put_u8(self.status.bits());
        dst.put_u16(self.length);
        dst.put_u16(self.spid);
        dst.put_u8(self.packet_id);
        dst.put_u8(self.window);
    }

    /// Payload length: total length minus the header.
    #[must_use]
    pub const fn payload_length(&self) -> usize {
        self.length.saturating_sub(PACKET_HEADER_SIZE as u16) as usize
    }

    /// Whether this is the last packet of its message.
    #[must_use]
    pub const fn is_end_of_message(&self) -> bool {
        self.status.contains(PacketStatus::END_OF_MESSAGE)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn header_roundtrip() {
        let header = PacketHeader {
            packet_type: PacketType::SqlBatch,
            status: PacketStatus::END_OF_MESSAGE,
            length: 512,
            spid: 54,
            packet_id: 7,
            window: 0,
        };

        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), PACKET_HEADER_SIZE);

        let mut cursor = buf.freeze();
        let decoded = PacketHeader::decode(&mut cursor).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn header_length_is_big_endian() {
        let header = PacketHeader::new(PacketType::PreLogin, PacketStatus::END_OF_MESSAGE, 0x1234);
        let mut buf = BytesMut::new();
        header.encode(&mut buf);
        assert_eq!(buf[2], 0x12);
        assert_eq!(buf[3], 0x34);
    }

    #[test]
    fn packet_type_from_u8() {
        assert_eq!(PacketType::from_u8(0x01).unwrap(), PacketType::SqlBatch);
        assert_eq!(PacketType::from_u8(0x12).unwrap(), PacketType::PreLogin);
        assert!(PacketType::from_u8(0x55).is_err());
    }
}
