//! RPC request encoding.
//!
//! An RPC payload is the ALL_HEADERS prefix, the procedure name, two option
//! flag bytes and a sequence of parameters. Each parameter is shipped as a
//! pre-encoded image `{name-length:1, status:1, type-id:1, metadata, value}`;
//! building those images is the value layer's job, this encoder only frames
//! them.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{ucs2_char_len, write_ucs2};
use crate::transaction::{ALL_HEADERS_SIZE, TransactionId, write_all_headers};

/// RPC request builder.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    proc_name: String,
    params: Vec<Bytes>,
}

impl RpcRequest {
    /// Create a request for a named procedure.
    #[must_use]
    pub fn new(proc_name: impl Into<String>) -> Self {
        Self {
            proc_name: proc_name.into(),
            params: Vec::new(),
        }
    }

    /// Append a fully encoded parameter image.
    pub fn push_param(&mut self, image: Bytes) {
        self.params.push(image);
    }

    /// The procedure name.
    #[must_use]
    pub fn proc_name(&self) -> &str {
        &self.proc_name
    }

    /// Encode the RPC payload with the given transaction descriptor.
    #[must_use]
    pub fn encode(&self, txn: TransactionId) -> Bytes {
        let params_len: usize = self.params.iter().map(Bytes::len).sum();
        let mut buf =
            BytesMut::with_capacity(ALL_HEADERS_SIZE + 4 + self.proc_name.len() * 2 + params_len);

        write_all_headers(&mut buf, txn);

        buf.put_u16_le(ucs2_char_len(&self.proc_name) as u16);
        write_ucs2(&mut buf, &self.proc_name);
        buf.put_u16_le(0); // option flags

        for param in &self.params {
            buf.put_slice(param);
        }

        buf.freeze()
    }
}
