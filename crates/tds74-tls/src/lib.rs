//! # tds74-tls
//!
//! TLS support for TDS 7.x connections. The handshake is tunneled inside
//! PRELOGIN packets ([`PreloginTunnel`]); once it completes, application
//! bytes flow through the TLS engine without any extra framing and the
//! packet layer writes regular TDS packets through the encrypted stream.

pub mod connector;
pub mod error;
pub mod tunnel;

pub use connector::{TlsConfig, TlsConnector};
pub use error::TlsError;
pub use tokio_rustls::client::TlsStream;
pub use tunnel::PreloginTunnel;

/// Install the process-wide rustls crypto provider.
///
/// Safe to call more than once; later calls are no-ops.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}
