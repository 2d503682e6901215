//! TDS packet codec for tokio-util framing.

use bytes::{BufMut, BytesMut};
use tds74_protocol::packet::{MAX_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;

/// A TDS packet: header plus payload.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Packet header.
    pub header: PacketHeader,
    /// Payload bytes, excluding the header.
    pub payload: BytesMut,
}

impl Packet {
    /// Create a packet from a header and payload.
    #[must_use]
    pub fn new(header: PacketHeader, payload: BytesMut) -> Self {
        Self { header, payload }
    }

    /// Whether this is the last packet of its message.
    #[must_use]
    pub fn is_end_of_message(&self) -> bool {
        self.header.is_end_of_message()
    }
}

/// Packet-level codec.
///
/// Decoding reassembles packets across TCP segment boundaries. Encoding
/// stamps each outgoing packet with the connection's packet id, which starts
/// at zero and wraps modulo 256 across the life of the connection.
#[derive(Debug)]
pub struct TdsCodec {
    max_packet_size: usize,
    packet_id: u8,
}

impl TdsCodec {
    /// Create a codec with the protocol's maximum packet size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_packet_size: MAX_PACKET_SIZE,
            packet_id: 0,
        }
    }

    fn next_packet_id(&mut self) -> u8 {
        let id = self.packet_id;
        self.packet_id = self.packet_id.wrapping_add(1);
        id
    }

    /// The packet id the next outgoing packet will carry.
    #[must_use]
    pub fn peek_packet_id(&self) -> u8 {
        self.packet_id
    }

    /// Overwrite the packet-id counter.
    ///
    /// Used when packets are sent outside this codec (the TLS handshake
    /// tunnel frames its own) and the session counter has to catch up.
    pub fn set_packet_id(&mut self, id: u8) {
        self.packet_id = id;
    }
}

impl Default for TdsCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for TdsCodec {
    type Item = Packet;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < PACKET_HEADER_SIZE {
            return Ok(None);
        }

        // Length field is big-endian at bytes 2..4.
        let length = u16::from_be_bytes([src[2], src[3]]) as usize;
        if length < PACKET_HEADER_SIZE {
            return Err(CodecError::Protocol(
                tds74_protocol::ProtocolError::InvalidPacketLength(length as u16),
            ));
        }
        if length > self.max_packet_size {
            return Err(CodecError::PacketTooLarge {
                size: length,
                max: self.max_packet_size,
            });
        }

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let packet_bytes = src.split_to(length);
        let mut cursor = packet_bytes.as_ref();
        let header = PacketHeader::decode(&mut cursor)?;
        let payload = BytesMut::from(&packet_bytes[PACKET_HEADER_SIZE..]);

        tracing::trace!(
            packet_type = ?header.packet_type,
            length,
            spid = header.spid,
            eom = header.is_end_of_message(),
            "decoded packet"
        );

        Ok(Some(Packet::new(header, payload)))
    }
}

impl Encoder<Packet> for TdsCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let total = PACKET_HEADER_SIZE + item.payload.len();
        if total > self.max_packet_size {
            return Err(CodecError::PacketTooLarge {
                size: total,
                max: self.max_packet_size,
            });
        }

        dst.reserve(total);

        let mut header = item.header;
        header.length = total as u16;
        header.packet_id = self.next_packet_id();
        header.encode(dst);
        dst.put_slice(&item.payload);

        tracing::trace!(
            packet_type = ?header.packet_type,
            length = total,
            packet_id = header.packet_id,
            eom = header.is_end_of_message(),
            "encoded packet"
        );

        Ok(())
    }
}
