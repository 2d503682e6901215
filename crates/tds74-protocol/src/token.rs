//! Response token stream definitions.
//!
//! A tabular response is a sequence of tokens, each introduced by a 1-byte
//! tag. This module models the tags and decodes the tokens whose layout does
//! not depend on column metadata. ROW and NBCROW bodies are consumed by the
//! column value decoder, driven by whoever walks the stream, because their
//! length is only known type by type.

use bytes::{Buf, Bytes};

use crate::codec::{read_b_varchar, read_us_varchar};
use crate::error::ProtocolError;
use crate::transaction::TransactionId;
use crate::types::{fixed_size, has_collation, type_id};

/// Token tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenTag {
    /// Stored procedure return status.
    ReturnStatus = 0x79,
    /// Column metadata for the following rows.
    ColMetaData = 0x81,
    /// ORDER BY column list.
    Order = 0xA9,
    /// Server error message.
    Error = 0xAA,
    /// Server informational message.
    Info = 0xAB,
    /// Login acknowledgment.
    LoginAck = 0xAD,
    /// Row of column values.
    Row = 0xD1,
    /// Row with a null bitmap prefix.
    NbcRow = 0xD2,
    /// Environment change notification.
    EnvChange = 0xE3,
    /// Statement completion.
    Done = 0xFD,
    /// Stored procedure completion.
    DoneProc = 0xFE,
    /// Completion of a statement inside a procedure.
    DoneInProc = 0xFF,
}

impl TokenTag {
    /// Create a token tag from a raw byte.
    pub fn from_u8(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0x79 => Ok(Self::ReturnStatus),
            0x81 => Ok(Self::ColMetaData),
            0xA9 => Ok(Self::Order),
            0xAA => Ok(Self::Error),
            0xAB => Ok(Self::Info),
            0xAD => Ok(Self::LoginAck),
            0xD1 => Ok(Self::Row),
            0xD2 => Ok(Self::NbcRow),
            0xE3 => Ok(Self::EnvChange),
            0xFD => Ok(Self::Done),
            0xFE => Ok(Self::DoneProc),
            0xFF => Ok(Self::DoneInProc),
            _ => Err(ProtocolError::UnknownToken(value)),
        }
    }
}

/// DONE status bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoneStatus {
    /// More results follow in this response.
    pub more: bool,
    /// The statement produced an error.
    pub error: bool,
    /// A transaction is in progress.
    pub in_xact: bool,
    /// The row count field is valid.
    pub count: bool,
    /// Attention acknowledgment.
    pub attn: bool,
    /// A server error terminated the statement.
    pub srverror: bool,
}

impl DoneStatus {
    const MORE: u16 = 0x0001;
    const ERROR: u16 = 0x0002;
    const IN_XACT: u16 = 0x0004;
    const COUNT: u16 = 0x0010;
    const ATTN: u16 = 0x0020;
    const SRVERROR: u16 = 0x0100;

    /// Parse status bits from the wire value.
    #[must_use]
    pub fn from_bits(bits: u16) -> Self {
        Self {
            more: bits & Self::MORE != 0,
            error: bits & Self::ERROR != 0,
            in_xact: bits & Self::IN_XACT != 0,
            count: bits & Self::COUNT != 0,
            attn: bits & Self::ATTN != 0,
            srverror: bits & Self::SRVERROR != 0,
        }
    }
}

/// DONE, DONEPROC and DONEINPROC share this body.
#[derive(Debug, Clone, Copy)]
pub struct Done {
    /// Status bits.
    pub status: DoneStatus,
    /// Token of the current command.
    pub cur_cmd: u16,
    /// Affected row count, valid when `status.count` is set.
    pub row_count: u64,
}

impl Done {
    /// Decode a DONE-shaped token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        ProtocolError::check_len(12, src.remaining())?;
        Ok(Self {
            status: DoneStatus::from_bits(src.get_u16_le()),
            cur_cmd: src.get_u16_le(),
            row_count: src.get_u64_le(),
        })
    }
}

/// ERROR and INFO share this body; only the severity differs.
#[derive(Debug, Clone)]
pub struct ServerMessage {
    /// Server error or message number.
    pub number: i32,
    /// Error state.
    pub state: u8,
    /// Severity class.
    pub class: u8,
    /// Decoded message text.
    pub message: String,
    /// Reporting server name.
    pub server: String,
    /// Stored procedure name, empty outside procedures.
    pub procedure: String,
    /// Line number within the batch or procedure.
    pub line: i32,
}

impl ServerMessage {
    /// Decode an ERROR or INFO token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        ProtocolError::check_len(2, src.remaining())?;
        let _length = src.get_u16_le();

        ProtocolError::check_len(6, src.remaining())?;
        let number = src.get_i32_le();
        let state = src.get_u8();
        let class = src.get_u8();

        let message = read_us_varchar(src)?;
        let server = read_b_varchar(src)?;
        let procedure = read_b_varchar(src)?;

        ProtocolError::check_len(4, src.remaining())?;
        let line = src.get_i32_le();

        Ok(Self {
            number,
            state,
            class,
            message,
            server,
            procedure,
            line,
        })
    }
}

/// LOGINACK token body.
#[derive(Debug, Clone)]
pub struct LoginAck {
    /// Interface byte.
    pub interface: u8,
    /// Negotiated TDS version.
    pub tds_version: u32,
    /// Server program name.
    pub prog_name: String,
    /// Server program version.
    pub prog_version: u32,
}

impl LoginAck {
    /// Decode a LOGINACK token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        ProtocolError::check_len(2, src.remaining())?;
        let _length = src.get_u16_le();

        ProtocolError::check_len(5, src.remaining())?;
        let interface = src.get_u8();
        let tds_version = src.get_u32_le();
        let prog_name = read_b_varchar(src)?;

        ProtocolError::check_len(4, src.remaining())?;
        let prog_version = src.get_u32_le();

        Ok(Self {
            interface,
            tds_version,
            prog_name,
            prog_version,
        })
    }
}

/// Environment change kinds the driver reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvChange {
    /// Current database changed.
    Database(String),
    /// Language changed.
    Language(String),
    /// Packet size renegotiated.
    PacketSize(u32),
    /// A transaction began; carries the new descriptor.
    BeginTransaction(TransactionId),
    /// The current transaction committed.
    CommitTransaction,
    /// The current transaction rolled back.
    RollbackTransaction,
    /// Any other environment change, consumed and ignored.
    Other(u8),
}

impl EnvChange {
    const DATABASE: u8 = 1;
    const LANGUAGE: u8 = 2;
    const PACKET_SIZE: u8 = 4;
    const BEGIN_TRANSACTION: u8 = 8;
    const COMMIT_TRANSACTION: u8 = 9;
    const ROLLBACK_TRANSACTION: u8 = 10;

    /// Decode an ENVCHANGE token body.
    ///
    /// Consumes exactly `2 + length` bytes from the cursor regardless of the
    /// change kind; unhandled kinds are skipped wholesale.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        ProtocolError::check_len(2, src.remaining())?;
        let length = src.get_u16_le() as usize;
        ProtocolError::check_len(length, src.remaining())?;
        if length == 0 {
            return Err(ProtocolError::UnexpectedEof);
        }

        let mut body: Bytes = src.copy_to_bytes(length);
        let kind = body.get_u8();

        match kind {
            Self::DATABASE => Ok(Self::Database(read_b_varchar(&mut body)?)),
            Self::LANGUAGE => Ok(Self::Language(read_b_varchar(&mut body)?)),
            Self::PACKET_SIZE => {
                let new = read_b_varchar(&mut body)?;
                let size = new
                    .parse::<u32>()
                    .map_err(|_| ProtocolError::StringEncoding)?;
                Ok(Self::PacketSize(size))
            }
            Self::BEGIN_TRANSACTION => {
                ProtocolError::check_len(1, body.remaining())?;
                let id_len = body.get_u8() as usize;
                if id_len != 8 {
                    return Err(ProtocolError::Truncated {
                        needed: 8,
                        available: id_len,
                    });
                }
                ProtocolError::check_len(8, body.remaining())?;
                let mut id = [0u8; 8];
                body.copy_to_slice(&mut id);
                Ok(Self::BeginTransaction(TransactionId::from_bytes(id)))
            }
            Self::COMMIT_TRANSACTION => Ok(Self::CommitTransaction),
            Self::ROLLBACK_TRANSACTION => Ok(Self::RollbackTransaction),
            other => Ok(Self::Other(other)),
        }
    }
}

/// ORDER token body: the ordinals of the ORDER BY columns.
#[derive(Debug, Clone)]
pub struct Order {
    /// Column ordinals.
    pub columns: Vec<u16>,
}

impl Order {
    /// Decode an ORDER token body.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        ProtocolError::check_len(2, src.remaining())?;
        let length = src.get_u16_le() as usize;
        ProtocolError::check_len(length, src.remaining())?;

        let mut columns = Vec::with_capacity(length / 2);
        for _ in 0..length / 2 {
            columns.push(src.get_u16_le());
        }
        Ok(Self { columns })
    }
}

/// One column's descriptor from COLMETADATA.
#[derive(Debug, Clone)]
pub struct ColumnDesc {
    /// Column name.
    pub name: String,
    /// Wire type id.
    pub type_id: u8,
    /// Declared maximum size in bytes; the fixed size for fixed types.
    pub size: u32,
    /// Precision for decimal and fractional-second date/time types.
    pub precision: Option<u8>,
    /// Scale for decimal types.
    pub scale: Option<u8>,
    /// Whether the column is nullable (flags bit 0).
    pub nullable: bool,
    /// Raw 5-byte collation for character types.
    pub collation: Option<[u8; 5]>,
    /// Server-assigned user type.
    pub user_type: u32,
    /// Raw descriptor flags.
    pub flags: u16,
}

/// Decode a COLMETADATA token body into the active descriptor list.
pub fn decode_colmetadata(src: &mut impl Buf) -> Result<Vec<ColumnDesc>, ProtocolError> {
    ProtocolError::check_len(2, src.remaining())?;
    let count = src.get_u16_le();
    // 0xFFFF announces "no metadata".
    if count == 0xFFFF {
        return Ok(Vec::new());
    }

    let mut columns = Vec::with_capacity(count as usize);
    for _ in 0..count {
        columns.push(decode_column_desc(src)?);
    }
    Ok(columns)
}

fn decode_column_desc(src: &mut impl Buf) -> Result<ColumnDesc, ProtocolError> {
    ProtocolError::check_len(7, src.remaining())?;
    let user_type = src.get_u32_le();
    let flags = src.get_u16_le();
    let nullable = flags & 0x0001 != 0;
    let ty = src.get_u8();

    let mut size: u32 = 0;
    let mut precision = None;
    let mut scale = None;
    let mut collation = None;

    if let Some(fixed) = fixed_size(ty) {
        size = fixed;
    } else {
        match ty {
            type_id::BITN
            | type_id::INTN
            | type_id::FLTN
            | type_id::MONEYN
            | type_id::DATETIMN
            | type_id::GUID => {
                ProtocolError::check_len(1, src.remaining())?;
                size = src.get_u8() as u32;
            }
            type_id::DECIMALN | type_id::NUMERICN => {
                ProtocolError::check_len(3, src.remaining())?;
                size = src.get_u8() as u32;
                precision = Some(src.get_u8());
                scale = Some(src.get_u8());
            }
            type_id::TIMEN | type_id::DATETIME2N | type_id::DATETIMEOFFSETN => {
                ProtocolError::check_len(1, src.remaining())?;
                precision = Some(src.get_u8());
            }
            type_id::BIGVARBIN | type_id::BIGBINARY => {
                ProtocolError::check_len(2, src.remaining())?;
                size = src.get_u16_le() as u32;
            }
            ty if has_collation(ty) => {
                ProtocolError::check_len(7, src.remaining())?;
                size = src.get_u16_le() as u32;
                let mut coll = [0u8; 5];
                src.copy_to_slice(&mut coll);
                collation = Some(coll);
            }
            type_id::IMAGE | type_id::TEXT => {
                ProtocolError::check_len(4, src.remaining())?;
                size = src.get_u32_le();
                // Table name of the underlying blob column.
                let _table = read_us_varchar(src)?;
            }
            type_id::SSVARIANT => {
                ProtocolError::check_len(4, src.remaining())?;
                size = src.get_u32_le();
            }
            other => return Err(ProtocolError::UnknownTypeId(other)),
        }
    }

    let name = read_b_varchar(src)?;

    Ok(ColumnDesc {
        name,
        type_id: ty,
        size,
        precision,
        scale,
        nullable,
        collation,
        user_type,
        flags,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};

    #[test]
    fn done_body() {
        let mut buf = Bytes::from_static(&[
            0x10, 0x00, // status: count valid
            0xC1, 0x00, // cur_cmd
            0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // row_count 5
        ]);
        let done = Done::decode(&mut buf).unwrap();
        assert!(done.status.count);
        assert!(!done.status.more);
        assert_eq!(done.cur_cmd, 0xC1);
        assert_eq!(done.row_count, 5);
    }

    #[test]
    fn server_message_body() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(0); // length, unused by the decoder
        buf.put_i32_le(102);
        buf.put_u8(1); // state
        buf.put_u8(15); // class
        buf.put_u16_le(3); // message chars
        for unit in "bad".encode_utf16() {
            buf.put_u16_le(unit);
        }
        buf.put_u8(2); // server name chars
        for unit in "db".encode_utf16() {
            buf.put_u16_le(unit);
        }
        buf.put_u8(0); // procedure
        buf.put_i32_le(1);

        let msg = ServerMessage::decode(&mut buf.freeze()).unwrap();
        assert_eq!(msg.number, 102);
        assert_eq!(msg.class, 15);
        assert_eq!(msg.message, "bad");
        assert_eq!(msg.server, "db");
        assert_eq!(msg.line, 1);
    }

    #[test]
    fn envchange_begin_transaction() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(11); // body length
        buf.put_u8(8); // BEGINTRANS
        buf.put_u8(8); // new value length
        buf.put_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        buf.put_u8(0); // old value length

        let env = EnvChange::decode(&mut buf.freeze()).unwrap();
        assert_eq!(
            env,
            EnvChange::BeginTransaction(TransactionId::from_bytes([1, 2, 3, 4, 5, 6, 7, 8]))
        );
    }

    #[test]
    fn envchange_packet_size() {
        let mut buf = BytesMut::new();
        let new = "8192";
        let old = "4096";
        buf.put_u16_le((1 + 1 + new.len() * 2 + 1 + old.len() * 2) as u16);
        buf.put_u8(4); // PACKETSIZE
        buf.put_u8(new.len() as u8);
        for unit in new.encode_utf16() {
            buf.put_u16_le(unit);
        }
        buf.put_u8(old.len() as u8);
        for unit in old.encode_utf16() {
            buf.put_u16_le(unit);
        }

        let env = EnvChange::decode(&mut buf.freeze()).unwrap();
        assert_eq!(env, EnvChange::PacketSize(8192));
    }

    #[test]
    fn envchange_unknown_kind_is_skipped_exactly() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(4);
        buf.put_u8(13); // unhandled kind
        buf.put_slice(&[0xAA, 0xBB, 0xCC]);
        buf.put_u8(0xFD); // next token must remain

        let mut cursor = buf.freeze();
        let env = EnvChange::decode(&mut cursor).unwrap();
        assert_eq!(env, EnvChange::Other(13));
        assert_eq!(cursor.remaining(), 1);
        assert_eq!(cursor[0], 0xFD);
    }

    fn int4_column(name: &str, nullable: bool) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u32_le(0); // user type
        buf.put_u16_le(u16::from(nullable)); // flags
        buf.put_u8(type_id::INT4);
        buf.put_u8(name.encode_utf16().count() as u8);
        for unit in name.encode_utf16() {
            buf.put_u16_le(unit);
        }
        buf
    }

    #[test]
    fn colmetadata_fixed_and_decimal() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(2);
        buf.put_slice(&int4_column("id", false));

        // decimal(10, 2) column
        buf.put_u32_le(0);
        buf.put_u16_le(1);
        buf.put_u8(type_id::DECIMALN);
        buf.put_u8(9); // max size
        buf.put_u8(10); // precision
        buf.put_u8(2); // scale
        buf.put_u8(1); // name: "d"
        buf.put_u16_le(u16::from(b'd'));

        let cols = decode_colmetadata(&mut buf.freeze()).unwrap();
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[0].name, "id");
        assert_eq!(cols[0].size, 4);
        assert!(!cols[0].nullable);
        assert_eq!(cols[1].name, "d");
        assert_eq!(cols[1].precision, Some(10));
        assert_eq!(cols[1].scale, Some(2));
        assert!(cols[1].nullable);
    }

    #[test]
    fn colmetadata_nvarchar_collation() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(1);
        buf.put_u32_le(0);
        buf.put_u16_le(1);
        buf.put_u8(type_id::NVARCHAR);
        buf.put_u16_le(100); // max bytes
        buf.put_slice(&[0x09, 0x04, 0xD0, 0x00, 0x34]); // collation
        buf.put_u8(1);
        buf.put_u16_le(u16::from(b'v'));

        let cols = decode_colmetadata(&mut buf.freeze()).unwrap();
        assert_eq!(cols[0].size, 100);
        assert_eq!(cols[0].collation, Some([0x09, 0x04, 0xD0, 0x00, 0x34]));
    }

    #[test]
    fn colmetadata_no_metadata_marker() {
        let mut buf = Bytes::from_static(&[0xFF, 0xFF]);
        assert!(decode_colmetadata(&mut buf).unwrap().is_empty());
    }
}
