//! Value-layer error type.

use thiserror::Error;

/// Errors raised while decoding column values or encoding parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// The row buffer ended before the value did.
    #[error("buffer too small: needed {needed} bytes, {available} available")]
    BufferTooSmall {
        /// Bytes the decoder still needed.
        needed: usize,
        /// Bytes left in the buffer.
        available: usize,
    },

    /// A length prefix was not one the type allows.
    #[error("invalid length {len} for type 0x{type_id:02X}")]
    InvalidLength {
        /// Wire type id.
        type_id: u8,
        /// Length the server sent.
        len: usize,
    },

    /// No decoder is registered for the type id.
    #[error("unsupported column type id 0x{0:02X}")]
    UnsupportedType(u8),

    /// No decoder is registered for a variant's inner type id.
    #[error("unsupported variant inner type id 0x{0:02X}")]
    UnsupportedVariantType(u8),

    /// A decimal value does not fit the host decimal representation.
    #[error("numeric value out of range")]
    NumericOverflow,

    /// A date or time field was out of range.
    #[error("invalid date/time value: {0}")]
    InvalidDateTime(String),

    /// Character data did not match its declared encoding.
    #[error("invalid string encoding: {0}")]
    InvalidEncoding(String),
}

impl TypeError {
    /// Build a [`TypeError::BufferTooSmall`] unless `available >= needed`.
    pub fn check_len(needed: usize, available: usize) -> Result<(), TypeError> {
        if available < needed {
            Err(TypeError::BufferTooSmall { needed, available })
        } else {
            Ok(())
        }
    }
}
