//! Response token stream parsing.
//!
//! A single cursor walks the assembled response payload, dispatching on each
//! token tag. Column metadata installs the descriptor list that row decoding
//! uses until the next COLMETADATA arrives; when a batch returns several
//! result sets, the last one wins. Server errors are recorded, not raised:
//! the whole stream is always drained first so the session stays consistent.

use bytes::{Buf, Bytes};
use encoding_rs::Encoding;
use tds74_protocol::token::{
    ColumnDesc, Done, EnvChange, LoginAck, Order, ServerMessage, TokenTag, decode_colmetadata,
};
use tds74_protocol::transaction::TransactionId;
use tds74_types::{Value, decode_value};

use crate::error::{Error, Result};

/// Everything a drained response contained.
#[derive(Debug, Default)]
pub struct Response {
    /// Active column descriptors, from the last COLMETADATA.
    pub columns: Vec<ColumnDesc>,
    /// Decoded rows of the last result set.
    pub rows: Vec<Vec<Value>>,
    /// Sum of the DONE row counts that were flagged valid.
    pub row_count: u64,
    /// RETURNSTATUS value, when present.
    pub return_status: Option<i32>,
    /// Transaction descriptor from a BEGINTRANS environment change.
    pub begin_transaction: Option<TransactionId>,
    /// Renegotiated packet size, when the server announced one.
    pub packet_size: Option<u32>,
    /// LOGINACK token, present in login responses.
    pub login_ack: Option<LoginAck>,
    /// First server ERROR token, if any.
    pub error: Option<ServerMessage>,
}

/// Drain one response payload into a [`Response`].
///
/// `encoding` decodes non-Unicode character columns. Protocol-level failures
/// (unknown tags, truncated tokens, undecodable values) abort parsing.
pub fn parse_response(payload: Bytes, encoding: &'static Encoding) -> Result<Response> {
    let mut buf = payload;
    let mut response = Response::default();

    while buf.has_remaining() {
        let tag = TokenTag::from_u8(buf.get_u8())?;
        match tag {
            TokenTag::ColMetaData => {
                response.columns = decode_colmetadata(&mut buf)?;
                response.rows.clear();
            }
            TokenTag::Row => {
                let row = decode_row(&mut buf, &response.columns, encoding)?;
                response.rows.push(row);
            }
            TokenTag::NbcRow => {
                let row = decode_nbc_row(&mut buf, &response.columns, encoding)?;
                response.rows.push(row);
            }
            TokenTag::Done | TokenTag::DoneProc | TokenTag::DoneInProc => {
                let done = Done::decode(&mut buf)?;
                if done.status.count {
                    response.row_count += done.row_count;
                }
                tracing::trace!(
                    ?tag,
                    more = done.status.more,
                    rows = done.row_count,
                    "completion token"
                );
            }
            TokenTag::Error => {
                let message = ServerMessage::decode(&mut buf)?;
                tracing::debug!(
                    number = message.number,
                    class = message.class,
                    message = %message.message,
                    "server error"
                );
                if response.error.is_none() {
                    response.error = Some(message);
                }
            }
            TokenTag::Info => {
                let info = ServerMessage::decode(&mut buf)?;
                tracing::debug!(number = info.number, message = %info.message, "server info");
            }
            TokenTag::EnvChange => match EnvChange::decode(&mut buf)? {
                EnvChange::BeginTransaction(id) => {
                    response.begin_transaction = Some(id);
                }
                EnvChange::PacketSize(size) => {
                    tracing::debug!(size, "packet size renegotiated");
                    response.packet_size = Some(size);
                }
                EnvChange::Database(db) => {
                    tracing::debug!(database = %db, "database changed");
                }
                other => {
                    tracing::trace!(?other, "environment change");
                }
            },
            TokenTag::ReturnStatus => {
                if buf.remaining() < 4 {
                    return Err(Error::Protocol("truncated RETURNSTATUS token".into()));
                }
                response.return_status = Some(buf.get_i32_le());
            }
            TokenTag::LoginAck => {
                response.login_ack = Some(LoginAck::decode(&mut buf)?);
            }
            TokenTag::Order => {
                let _order = Order::decode(&mut buf)?;
            }
        }
    }

    Ok(response)
}

fn decode_row(
    buf: &mut Bytes,
    columns: &[ColumnDesc],
    encoding: &'static Encoding,
) -> Result<Vec<Value>> {
    let mut values = Vec::with_capacity(columns.len());
    for col in columns {
        values.push(decode_value(buf, col, encoding)?);
    }
    Ok(values)
}

fn decode_nbc_row(
    buf: &mut Bytes,
    columns: &[ColumnDesc],
    encoding: &'static Encoding,
) -> Result<Vec<Value>> {
    let bitmap_len = columns.len().div_ceil(8);
    if buf.remaining() < bitmap_len {
        return Err(Error::Protocol("truncated NBCROW null bitmap".into()));
    }
    let bitmap = buf.copy_to_bytes(bitmap_len);

    let mut values = Vec::with_capacity(columns.len());
    for (i, col) in columns.iter().enumerate() {
        // Bit i of the bitmap, least significant first within each byte.
        if bitmap[i / 8] & (1 << (i % 8)) != 0 {
            values.push(Value::Null);
        } else {
            values.push(decode_value(buf, col, encoding)?);
        }
    }
    Ok(values)
}
