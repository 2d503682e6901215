//! Message reassembly.
//!
//! A TDS message spans one or more packets; the final packet carries the
//! end-of-message status bit. The assembler concatenates packet payloads and
//! reports the type and SPID of the first packet, which apply to the whole
//! message.

use bytes::{Bytes, BytesMut};
use tds74_protocol::packet::PacketType;

use crate::packet_codec::Packet;

/// A complete message reassembled from one or more packets.
#[derive(Debug, Clone)]
pub struct Message {
    /// Packet type shared by every packet of the message.
    pub packet_type: PacketType,
    /// Server process id from the first packet's header.
    pub spid: u16,
    /// Concatenated payload of all packets.
    pub payload: Bytes,
}

impl Message {
    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Accumulates packets until the end-of-message bit arrives.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    buffer: BytesMut,
    first: Option<(PacketType, u16)>,
}

impl MessageAssembler {
    /// Create an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a packet; returns the completed message on the final packet.
    pub fn push(&mut self, packet: Packet) -> Option<Message> {
        if self.first.is_none() {
            self.first = Some((packet.header.packet_type, packet.header.spid));
        }
        self.buffer.extend_from_slice(&packet.payload);

        if packet.is_end_of_message() {
            let (packet_type, spid) = self.first.take()?;
            Some(Message {
                packet_type,
                spid,
                payload: self.buffer.split().freeze(),
            })
        } else {
            None
        }
    }

    /// Whether a partial message is buffered.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        self.first.is_some()
    }

    /// Drop any partial message.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.first = None;
    }
}
