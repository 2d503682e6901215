//! Packet-framed transport.
//!
//! [`Connection`] owns a transport framed with [`TdsCodec`] and provides the
//! two operations the session engine needs: send a request payload as a run
//! of packets, and read back one complete response message.

use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tds74_protocol::packet::{PACKET_HEADER_SIZE, PacketHeader, PacketStatus, PacketType};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, FramedParts};

use crate::error::CodecError;
use crate::message::{Message, MessageAssembler};
use crate::packet_codec::{Packet, TdsCodec};

/// A TDS connection over an async transport.
pub struct Connection<T> {
    framed: Framed<T, TdsCodec>,
    assembler: MessageAssembler,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a connection with a fresh packet-id counter.
    pub fn new(transport: T) -> Self {
        Self::with_codec(transport, TdsCodec::new())
    }

    /// Create a connection reusing an existing codec.
    ///
    /// The packet-id counter lives in the codec, so threading the codec
    /// through a transport upgrade keeps the counter spanning the session.
    pub fn with_codec(transport: T, codec: TdsCodec) -> Self {
        Self {
            framed: Framed::new(transport, codec),
            assembler: MessageAssembler::new(),
        }
    }

    /// Send one request message, split into packets of at most
    /// `packet_size` bytes each.
    ///
    /// Every packet but the last goes out with a clear status; the last
    /// carries the end-of-message bit. An empty payload still produces one
    /// (empty) final packet.
    pub async fn send_message(
        &mut self,
        packet_type: PacketType,
        payload: Bytes,
        packet_size: usize,
    ) -> Result<(), CodecError> {
        let max_payload = packet_size.saturating_sub(PACKET_HEADER_SIZE).max(1);

        let mut rest = payload;
        loop {
            let take = rest.len().min(max_payload);
            let chunk = rest.split_to(take);
            let last = rest.is_empty();

            let status = if last {
                PacketStatus::END_OF_MESSAGE
            } else {
                PacketStatus::NORMAL
            };
            let header = PacketHeader::new(packet_type, status, 0);
            let packet = Packet::new(header, BytesMut::from(&chunk[..]));

            if last {
                self.framed.send(packet).await?;
                return Ok(());
            }
            self.framed.feed(packet).await?;
        }
    }

    /// Read packets until one complete message has been assembled.
    ///
    /// Returns `None` on a clean end of stream between messages; a stream
    /// that ends mid-message is an error.
    pub async fn read_message(&mut self) -> Result<Option<Message>, CodecError> {
        loop {
            match self.framed.next().await {
                Some(Ok(packet)) => {
                    if let Some(message) = self.assembler.push(packet) {
                        tracing::trace!(
                            packet_type = ?message.packet_type,
                            len = message.len(),
                            "assembled message"
                        );
                        return Ok(Some(message));
                    }
                }
                Some(Err(e)) => return Err(e),
                None => {
                    if self.assembler.has_partial() {
                        return Err(CodecError::ConnectionClosed);
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Tear the connection apart, keeping the transport and the codec state.
    pub fn into_parts(self) -> (T, TdsCodec) {
        let FramedParts { io, codec, .. } = self.framed.into_parts();
        (io, codec)
    }

    /// A shared reference to the transport.
    pub fn get_ref(&self) -> &T {
        self.framed.get_ref()
    }
}

impl<T> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("has_partial_message", &self.assembler.has_partial())
            .finish_non_exhaustive()
    }
}
