//! Protocol-level error type.

use thiserror::Error;

/// Errors raised while encoding or decoding TDS protocol structures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The buffer ended before a complete structure could be read.
    #[error("unexpected end of buffer")]
    UnexpectedEof,

    /// The buffer is shorter than a structure's declared length.
    #[error("truncated data: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes required to finish decoding.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// A packet header carried an unrecognized type byte.
    #[error("invalid packet type 0x{0:02X}")]
    InvalidPacketType(u8),

    /// A packet header carried unrecognized status bits.
    #[error("invalid packet status 0x{0:02X}")]
    InvalidPacketStatus(u8),

    /// A packet header declared a length shorter than the header itself.
    #[error("invalid packet length {0}")]
    InvalidPacketLength(u16),

    /// The token stream contained a tag this parser does not know.
    #[error("unknown token tag 0x{0:02X}")]
    UnknownToken(u8),

    /// Column metadata named a type id with no registered decoder.
    #[error("unknown column type id 0x{0:02X}")]
    UnknownTypeId(u8),

    /// String data was not valid UCS-2 little-endian.
    #[error("invalid UCS-2 string data")]
    StringEncoding,
}

impl ProtocolError {
    /// Build a [`ProtocolError::Truncated`] unless `available >= needed`.
    pub fn check_len(needed: usize, available: usize) -> Result<(), ProtocolError> {
        if available < needed {
            Err(ProtocolError::Truncated { needed, available })
        } else {
            Ok(())
        }
    }
}
