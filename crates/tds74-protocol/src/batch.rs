//! SQL batch request encoding.

use bytes::{Bytes, BytesMut};

use crate::codec::{ucs2_byte_len, write_ucs2};
use crate::transaction::{ALL_HEADERS_SIZE, TransactionId, write_all_headers};

/// Encode a SQL batch payload: the ALL_HEADERS prefix carrying the current
/// transaction descriptor, then the query text as UCS-2 LE.
#[must_use]
pub fn encode_sql_batch(sql: &str, txn: TransactionId) -> Bytes {
    let mut buf = BytesMut::with_capacity(ALL_HEADERS_SIZE + ucs2_byte_len(sql));
    write_all_headers(&mut buf, txn);
    write_ucs2(&mut buf, sql);
    buf.freeze()
}
