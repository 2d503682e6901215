//! Session error taxonomy.
//!
//! Server errors are classified by error number: a small set of numbers mean
//! the statement itself was wrong, another set means a constraint rejected
//! the data, and everything else is an operational fault. Transport and
//! protocol failures close the session; server errors leave it usable.

use thiserror::Error;

use tds74_protocol::token::ServerMessage;

/// Server error numbers raised by bad SQL: syntax errors, unknown columns
/// and objects, unknown procedures.
const PROGRAMMING_NUMBERS: [i32; 5] = [102, 207, 208, 2812, 4104];

/// Server error numbers raised by constraint violations.
const INTEGRITY_NUMBERS: [i32; 4] = [515, 547, 2601, 2627];

/// Errors surfaced by a [`crate::Session`].
#[derive(Debug, Error)]
pub enum Error {
    /// The socket, the TLS engine or a timeout failed. The session is
    /// closed and not recoverable.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The byte stream violated the protocol. The session is closed.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The statement was rejected: syntax error or unknown identifier.
    #[error("programming error {number}: {message}")]
    Programming {
        /// Server error number.
        number: i32,
        /// Decoded server message.
        message: String,
        /// The SQL or procedure name that failed.
        sql: Option<String>,
    },

    /// A constraint rejected the data.
    #[error("integrity error {number}: {message}")]
    Integrity {
        /// Server error number.
        number: i32,
        /// Decoded server message.
        message: String,
        /// The SQL or procedure name that failed.
        sql: Option<String>,
    },

    /// Any other server-reported error.
    #[error("operational error {number}: {message}")]
    Operational {
        /// Server error number.
        number: i32,
        /// Decoded server message.
        message: String,
        /// The SQL or procedure name that failed.
        sql: Option<String>,
    },

    /// The requested operation is not implemented by this driver.
    #[error("not supported: {0}")]
    NotSupported(&'static str),
}

impl Error {
    /// Classify a server ERROR token.
    #[must_use]
    pub fn from_server(msg: &ServerMessage, sql: Option<&str>) -> Self {
        let number = msg.number;
        let message = msg.message.clone();
        let sql = sql.map(str::to_owned);

        if PROGRAMMING_NUMBERS.contains(&number) {
            Self::Programming {
                number,
                message,
                sql,
            }
        } else if INTEGRITY_NUMBERS.contains(&number) {
            Self::Integrity {
                number,
                message,
                sql,
            }
        } else {
            Self::Operational {
                number,
                message,
                sql,
            }
        }
    }

    /// The server error number, when this is a database error.
    #[must_use]
    pub fn number(&self) -> Option<i32> {
        match self {
            Self::Programming { number, .. }
            | Self::Integrity { number, .. }
            | Self::Operational { number, .. } => Some(*number),
            _ => None,
        }
    }

    /// Whether this error closed the session.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Protocol(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<tds74_codec::CodecError> for Error {
    fn from(e: tds74_codec::CodecError) -> Self {
        match e {
            tds74_codec::CodecError::Io(io) => Self::Transport(io.to_string()),
            tds74_codec::CodecError::ConnectionClosed => {
                Self::Transport("connection closed".into())
            }
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<tds74_protocol::ProtocolError> for Error {
    fn from(e: tds74_protocol::ProtocolError) -> Self {
        Self::Protocol(e.to_string())
    }
}

impl From<tds74_types::TypeError> for Error {
    fn from(e: tds74_types::TypeError) -> Self {
        Self::Protocol(e.to_string())
    }
}

impl From<tds74_tls::TlsError> for Error {
    fn from(e: tds74_tls::TlsError) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Session result type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn server_message(number: i32) -> ServerMessage {
        ServerMessage {
            number,
            state: 1,
            class: 16,
            message: "boom".into(),
            server: String::new(),
            procedure: String::new(),
            line: 1,
        }
    }

    #[test]
    fn programming_numbers() {
        for number in [102, 207, 208, 2812, 4104] {
            let err = Error::from_server(&server_message(number), Some("bad sql"));
            assert!(matches!(err, Error::Programming { .. }), "number {number}");
            assert_eq!(err.number(), Some(number));
            assert!(!err.is_fatal());
        }
    }

    #[test]
    fn integrity_numbers() {
        for number in [515, 547, 2601, 2627] {
            let err = Error::from_server(&server_message(number), None);
            assert!(matches!(err, Error::Integrity { .. }), "number {number}");
        }
    }

    #[test]
    fn everything_else_is_operational() {
        for number in [50000, 1205, 18456, 4060] {
            let err = Error::from_server(&server_message(number), None);
            assert!(matches!(err, Error::Operational { .. }), "number {number}");
        }
    }

    #[test]
    fn fatal_kinds() {
        assert!(Error::Transport("gone".into()).is_fatal());
        assert!(Error::Protocol("bad tag".into()).is_fatal());
        assert!(!Error::NotSupported("nextset").is_fatal());
    }

    #[test]
    fn carries_the_failing_sql() {
        let err = Error::from_server(&server_message(102), Some("selectt 1"));
        match err {
            Error::Programming { sql, .. } => assert_eq!(sql.as_deref(), Some("selectt 1")),
            other => panic!("unexpected classification: {other:?}"),
        }
    }
}
