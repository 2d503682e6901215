//! Framing-layer error type.

use thiserror::Error;

/// Errors raised by the packet framer and message assembler.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Underlying transport failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A packet header could not be parsed.
    #[error("protocol error: {0}")]
    Protocol(#[from] tds74_protocol::ProtocolError),

    /// A packet declared a length larger than the negotiated packet size.
    #[error("packet of {size} bytes exceeds the {max} byte limit")]
    PacketTooLarge {
        /// Declared packet size.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The peer closed the connection mid-message.
    #[error("connection closed")]
    ConnectionClosed,
}
