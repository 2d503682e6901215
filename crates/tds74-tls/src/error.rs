//! TLS-layer error type.

use thiserror::Error;

/// Errors raised while establishing the TLS tunnel.
#[derive(Debug, Error)]
pub enum TlsError {
    /// The rustls client configuration could not be built.
    #[error("TLS configuration error: {0}")]
    Configuration(String),

    /// The server name is not a valid SNI host name.
    #[error("invalid server name for TLS: {0}")]
    InvalidServerName(String),

    /// The handshake itself failed.
    #[error("TLS handshake failed: {0}")]
    Handshake(#[from] std::io::Error),
}
