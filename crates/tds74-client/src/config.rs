//! Session configuration.

use std::time::Duration;

use encoding_rs::Encoding;
use tds74_protocol::IsolationLevel;
use tds74_protocol::prelogin::EncryptionLevel;

/// Requested encryption behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncryptMode {
    /// Refuse encryption.
    Off,
    /// Ask for encryption, validating the server certificate.
    On,
    /// Demand encryption, validating the server certificate.
    Required,
    /// Let the server decide; the certificate is not validated.
    #[default]
    Auto,
}

impl EncryptMode {
    /// The encryption byte sent in the PRELOGIN request.
    #[must_use]
    pub fn wire_level(self) -> EncryptionLevel {
        match self {
            Self::Off => EncryptionLevel::NotSupported,
            Self::On => EncryptionLevel::On,
            Self::Required | Self::Auto => EncryptionLevel::Required,
        }
    }

    /// Whether this mode validates the server certificate by default.
    ///
    /// Validation is on when the caller asked for encryption explicitly.
    #[must_use]
    pub fn validates_certificates(self) -> bool {
        matches!(self, Self::On | Self::Required)
    }
}

/// Connection options for a [`crate::Session`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host name or address.
    pub host: String,
    /// Server TCP port.
    pub port: u16,
    /// Login user name.
    pub user: String,
    /// Login password.
    pub password: String,
    /// Initial database.
    pub database: String,
    /// Instance name announced in PRELOGIN.
    pub instance_name: String,
    /// Isolation level for implicit transactions.
    pub isolation_level: IsolationLevel,
    /// Commit after every successful request.
    pub autocommit: bool,
    /// Client locale id.
    pub lcid: u32,
    /// Encoding of non-Unicode character columns.
    pub server_encoding: &'static Encoding,
    /// Encryption behavior.
    pub encrypt: EncryptMode,
    /// Explicit certificate-trust override; `None` follows [`EncryptMode`].
    pub trust_server_certificate: Option<bool>,
    /// Deadline applied to every send and receive.
    pub timeout: Option<Duration>,
    /// Precision byte advertised for decimal parameters.
    pub decimal_precision: u8,
    /// Application name reported at login.
    pub app_name: String,
}

impl Config {
    /// Start a configuration for the given host.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 1433,
            user: String::new(),
            password: String::new(),
            database: String::new(),
            instance_name: "MSSQLServer".into(),
            isolation_level: IsolationLevel::ReadCommitted,
            autocommit: false,
            lcid: 1033,
            server_encoding: encoding_rs::WINDOWS_1252,
            encrypt: EncryptMode::Auto,
            trust_server_certificate: None,
            timeout: None,
            decimal_precision: 28,
            app_name: "tds74".into(),
        }
    }

    /// Set the server port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the login credentials.
    #[must_use]
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Set the initial database.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the instance name.
    #[must_use]
    pub fn instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = name.into();
        self
    }

    /// Set the isolation level for implicit transactions.
    #[must_use]
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    /// Enable or disable autocommit.
    #[must_use]
    pub fn autocommit(mut self, autocommit: bool) -> Self {
        self.autocommit = autocommit;
        self
    }

    /// Set the client locale id.
    #[must_use]
    pub fn locale_id(mut self, lcid: u32) -> Self {
        self.lcid = lcid;
        self
    }

    /// Set the encoding used for non-Unicode character columns by label,
    /// e.g. `"latin1"` or `"utf8"`.
    ///
    /// Unknown labels keep the current encoding.
    #[must_use]
    pub fn server_encoding(mut self, label: &str) -> Self {
        match Encoding::for_label(label.as_bytes()) {
            Some(encoding) => self.server_encoding = encoding,
            None => tracing::warn!(label, "unknown encoding label, keeping current"),
        }
        self
    }

    /// Set the encryption behavior.
    #[must_use]
    pub fn encrypt(mut self, mode: EncryptMode) -> Self {
        self.encrypt = mode;
        self
    }

    /// Override the certificate-trust decision.
    #[must_use]
    pub fn trust_server_certificate(mut self, trust: bool) -> Self {
        self.trust_server_certificate = Some(trust);
        self
    }

    /// Apply a deadline to every send and receive.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the precision advertised for decimal parameters.
    #[must_use]
    pub fn decimal_precision(mut self, precision: u8) -> Self {
        self.decimal_precision = precision;
        self
    }

    /// Whether the TLS layer should skip certificate validation.
    #[must_use]
    pub fn trusts_any_certificate(&self) -> bool {
        self.trust_server_certificate
            .unwrap_or(!self.encrypt.validates_certificates())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_driver_contract() {
        let config = Config::new("db");
        assert_eq!(config.port, 1433);
        assert_eq!(config.instance_name, "MSSQLServer");
        assert_eq!(config.isolation_level, IsolationLevel::ReadCommitted);
        assert!(!config.autocommit);
        assert_eq!(config.lcid, 1033);
        assert_eq!(config.decimal_precision, 28);
        assert_eq!(config.server_encoding, encoding_rs::WINDOWS_1252);
    }

    #[test]
    fn encoding_labels() {
        let config = Config::new("db").server_encoding("utf8");
        assert_eq!(config.server_encoding, encoding_rs::UTF_8);
        // latin1 maps to the windows-1252 table.
        let config = config.server_encoding("latin1");
        assert_eq!(config.server_encoding, encoding_rs::WINDOWS_1252);
        // Bad labels keep the previous value.
        let config = config.server_encoding("utf8").server_encoding("no-such");
        assert_eq!(config.server_encoding, encoding_rs::UTF_8);
    }

    #[test]
    fn certificate_trust_follows_encrypt_mode() {
        assert!(Config::new("db").trusts_any_certificate()); // Auto
        assert!(!Config::new("db").encrypt(EncryptMode::On).trusts_any_certificate());
        assert!(
            !Config::new("db")
                .encrypt(EncryptMode::Required)
                .trusts_any_certificate()
        );
        assert!(
            Config::new("db")
                .encrypt(EncryptMode::Required)
                .trust_server_certificate(true)
                .trusts_any_certificate()
        );
    }

    #[test]
    fn wire_levels() {
        use tds74_protocol::prelogin::EncryptionLevel;
        assert_eq!(EncryptMode::Off.wire_level(), EncryptionLevel::NotSupported);
        assert_eq!(EncryptMode::On.wire_level(), EncryptionLevel::On);
        assert_eq!(EncryptMode::Auto.wire_level(), EncryptionLevel::Required);
    }
}
