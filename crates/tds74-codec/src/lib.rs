//! # tds74-codec
//!
//! Async framing layer for TDS packets: a tokio-util codec that splits and
//! reassembles packets over a byte stream, a message assembler that joins
//! packets into complete messages, and a [`Connection`] transport combining
//! both.
//!
//! ```text
//! byte stream → TdsCodec (packets) → MessageAssembler (messages) → session
//! ```

pub mod connection;
pub mod error;
pub mod message;
pub mod packet_codec;

pub use connection::Connection;
pub use error::CodecError;
pub use message::{Message, MessageAssembler};
pub use packet_codec::{Packet, TdsCodec};
