//! Transaction descriptors and the transaction-manager request encoder.

use bytes::{BufMut, Bytes, BytesMut};

/// Size of the ALL_HEADERS prefix carried by every post-login request.
pub const ALL_HEADERS_SIZE: usize = 22;

/// The 8-byte transaction descriptor handed out by the server.
///
/// All zeros is the wire's own "no active transaction" convention and doubles
/// as the `None` marker here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionId([u8; 8]);

impl TransactionId {
    /// The null transaction id.
    pub const NONE: Self = Self([0u8; 8]);

    /// Wrap a raw 8-byte descriptor.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// The raw descriptor bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Whether this is the null transaction id.
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.0 == [0u8; 8]
    }
}

/// Transaction isolation level, as sent in the BEGIN request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum IsolationLevel {
    /// READ UNCOMMITTED.
    ReadUncommitted = 1,
    /// READ COMMITTED.
    #[default]
    ReadCommitted = 2,
    /// REPEATABLE READ.
    RepeatableRead = 3,
    /// SERIALIZABLE.
    Serializable = 4,
    /// SNAPSHOT.
    Snapshot = 5,
}

impl IsolationLevel {
    /// Create from the numeric level of the driver API. Out-of-range values
    /// fall back to READ COMMITTED.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::ReadUncommitted,
            3 => Self::RepeatableRead,
            4 => Self::Serializable,
            5 => Self::Snapshot,
            _ => Self::ReadCommitted,
        }
    }
}

/// Transaction-manager request type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TmRequest {
    /// Begin a transaction.
    Begin = 5,
    /// Commit the current transaction.
    Commit = 7,
    /// Roll back the current transaction.
    Rollback = 8,
}

/// Write the ALL_HEADERS prefix: a single transaction-descriptor header with
/// an outstanding-request count of one.
pub fn write_all_headers(dst: &mut impl BufMut, txn: TransactionId) {
    dst.put_u32_le(ALL_HEADERS_SIZE as u32);
    dst.put_u32_le(18); // header length
    dst.put_u16_le(0x0002); // header type: transaction descriptor
    dst.put_slice(txn.as_bytes());
    dst.put_u32_le(1); // outstanding request count
}

/// Encode a transaction-manager request payload.
///
/// BEGIN is sent with the null transaction id; COMMIT and ROLLBACK carry the
/// id being ended.
#[must_use]
pub fn encode_tm_request(request: TmRequest, txn: TransactionId, isolation: IsolationLevel) -> Bytes {
    let mut buf = BytesMut::with_capacity(ALL_HEADERS_SIZE + 4);
    write_all_headers(&mut buf, txn);
    buf.put_u16_le(request as u16);
    buf.put_u8(isolation as u8);
    buf.put_u8(0); // transaction name length
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_transaction_id() {
        assert!(TransactionId::NONE.is_none());
        assert!(!TransactionId::from_bytes([1, 0, 0, 0, 0, 0, 0, 0]).is_none());
    }

    #[test]
    fn begin_request_layout() {
        let payload = encode_tm_request(
            TmRequest::Begin,
            TransactionId::NONE,
            IsolationLevel::ReadCommitted,
        );
        assert_eq!(payload.len(), 26);
        assert_eq!(&payload[0..4], &[22, 0, 0, 0]);
        assert_eq!(&payload[4..8], &[18, 0, 0, 0]);
        assert_eq!(&payload[8..10], &[2, 0]);
        assert_eq!(&payload[10..18], &[0u8; 8]);
        assert_eq!(&payload[18..22], &[1, 0, 0, 0]);
        assert_eq!(&payload[22..24], &[5, 0]); // BEGIN
        assert_eq!(payload[24], 2); // READ COMMITTED
        assert_eq!(payload[25], 0); // no name
    }

    #[test]
    fn commit_carries_the_descriptor() {
        let txn = TransactionId::from_bytes([9, 8, 7, 6, 5, 4, 3, 2]);
        let payload = encode_tm_request(TmRequest::Commit, txn, IsolationLevel::Snapshot);
        assert_eq!(&payload[10..18], &[9, 8, 7, 6, 5, 4, 3, 2]);
        assert_eq!(&payload[22..24], &[7, 0]);
        assert_eq!(payload[24], 5);
    }

    #[test]
    fn isolation_from_u8_defaults() {
        assert_eq!(IsolationLevel::from_u8(0), IsolationLevel::ReadCommitted);
        assert_eq!(IsolationLevel::from_u8(4), IsolationLevel::Serializable);
        assert_eq!(IsolationLevel::from_u8(9), IsolationLevel::ReadCommitted);
    }
}
