//! rustls connector for the PRELOGIN-framed handshake.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector as RustlsConnector;
use tokio_rustls::client::TlsStream;

use crate::error::TlsError;
use crate::tunnel::PreloginTunnel;

/// TLS settings for a session.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Accept whatever certificate the server presents.
    pub trust_server_certificate: bool,
}

/// Certificate verifier that accepts any server certificate.
///
/// Exposes connections to man-in-the-middle interception; only for servers
/// whose certificate cannot be validated, never for production traffic.
#[derive(Debug)]
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

/// Connector driving the TLS handshake through the PRELOGIN tunnel.
pub struct TlsConnector {
    inner: RustlsConnector,
}

impl TlsConnector {
    /// Build a connector. TLS 1.2 and 1.3 are offered; nothing older.
    pub fn new(config: &TlsConfig) -> Result<Self, TlsError> {
        let versions = [&rustls::version::TLS12, &rustls::version::TLS13];

        let client_config = if config.trust_server_certificate {
            tracing::warn!(
                "server certificate validation is disabled; the connection \
                 is open to man-in-the-middle interception"
            );
            ClientConfig::builder_with_protocol_versions(&versions)
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
                .with_no_client_auth()
        } else {
            let root_store = RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            };
            ClientConfig::builder_with_protocol_versions(&versions)
                .with_root_certificates(root_store)
                .with_no_client_auth()
        };

        Ok(Self {
            inner: RustlsConnector::from(Arc::new(client_config)),
        })
    }

    /// Run the handshake over `stream`, with every handshake flight framed
    /// as a PRELOGIN packet.
    ///
    /// `packet_id` seeds the tunnel's header sequence so the session's
    /// packet-id counter keeps running through the handshake. The returned
    /// stream is in pass-through mode: TDS packets written through it are
    /// encrypted but no longer wrapped.
    pub async fn connect_via_prelogin<S>(
        &self,
        stream: S,
        server_name: &str,
        packet_id: u8,
    ) -> Result<TlsStream<PreloginTunnel<S>>, TlsError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let dns_name = ServerName::try_from(server_name.to_string())
            .map_err(|_| TlsError::InvalidServerName(server_name.to_string()))?;

        let tunnel = PreloginTunnel::new(stream, packet_id);

        tracing::debug!(server_name, "starting PRELOGIN-framed TLS handshake");
        let mut tls = self.inner.connect(dns_name, tunnel).await?;

        let (tunnel, _) = tls.get_mut();
        tunnel.handshake_complete();
        tracing::debug!("TLS handshake complete, tunnel now pass-through");

        Ok(tls)
    }
}

impl std::fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnector").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn install_provider() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }

    #[test]
    fn connector_builds_with_validation() {
        install_provider();
        assert!(TlsConnector::new(&TlsConfig::default()).is_ok());
    }

    #[test]
    fn connector_builds_without_validation() {
        install_provider();
        let config = TlsConfig {
            trust_server_certificate: true,
        };
        assert!(TlsConnector::new(&config).is_ok());
    }
}
