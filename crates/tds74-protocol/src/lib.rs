//! # tds74-protocol
//!
//! Wire-level implementation of the TDS 7.4 protocol spoken by Microsoft SQL
//! Server: packet headers, the PRELOGIN/LOGIN7 handshake messages, request
//! encoders for SQL batches, RPC and transaction-manager requests, and the
//! response token stream.
//!
//! This crate is IO-agnostic: it moves bytes in and out of [`bytes`] buffers
//! and leaves sockets, framing and TLS to the layers above.

pub mod batch;
pub mod codec;
pub mod error;
pub mod login7;
pub mod packet;
pub mod prelogin;
pub mod rpc;
pub mod token;
pub mod transaction;
pub mod types;

pub use batch::encode_sql_batch;
pub use error::ProtocolError;
pub use login7::{Login7, TDS_VERSION_7_4};
pub use packet::{
    DEFAULT_PACKET_SIZE, MAX_PACKET_SIZE, PACKET_HEADER_SIZE, PacketHeader, PacketStatus,
    PacketType,
};
pub use prelogin::{EncryptionLevel, PreLogin, PreLoginReply};
pub use rpc::RpcRequest;
pub use token::{
    ColumnDesc, Done, DoneStatus, EnvChange, LoginAck, Order, ServerMessage, TokenTag,
    decode_colmetadata,
};
pub use transaction::{
    IsolationLevel, TmRequest, TransactionId, encode_tm_request, write_all_headers,
};
