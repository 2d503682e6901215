//! The session engine.
//!
//! A [`Session`] owns one TCP connection and drives it through the TDS
//! lifecycle: pre-login, optional TLS upgrade, login, then request/response
//! cycles. Transactions are implicit: the first request after connect (or
//! after a commit/rollback) begins one, and `commit`/`rollback` only touch
//! the wire once a statement has actually run.
//!
//! All methods take `&mut self`, so a session can never have more than one
//! request in flight.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpStream;

use tds74_codec::{CodecError, Connection, Message};
use tds74_protocol::batch::encode_sql_batch;
use tds74_protocol::login7::Login7;
use tds74_protocol::packet::{DEFAULT_PACKET_SIZE, PacketType};
use tds74_protocol::prelogin::{PreLogin, PreLoginReply};
use tds74_protocol::rpc::RpcRequest;
use tds74_protocol::transaction::{TmRequest, TransactionId, encode_tm_request};
use tds74_tls::{PreloginTunnel, TlsConfig, TlsConnector, TlsStream};
use tds74_types::{Param, encode_param};

use crate::config::{Config, EncryptMode};
use crate::error::{Error, Result};
use crate::response::{Response, parse_response};
use crate::row::{Column, ProcResult, QueryResult, Row};

/// The connection in one of its two framings.
enum Transport {
    /// Cleartext TCP.
    Plain(Connection<TcpStream>),
    /// TLS negotiated through the PRELOGIN tunnel.
    Tls(Connection<TlsStream<PreloginTunnel<TcpStream>>>),
}

impl Transport {
    async fn send_message(
        &mut self,
        packet_type: PacketType,
        payload: Bytes,
        packet_size: usize,
    ) -> std::result::Result<(), CodecError> {
        match self {
            Self::Plain(conn) => conn.send_message(packet_type, payload, packet_size).await,
            Self::Tls(conn) => conn.send_message(packet_type, payload, packet_size).await,
        }
    }

    async fn read_message(&mut self) -> std::result::Result<Option<Message>, CodecError> {
        match self {
            Self::Plain(conn) => conn.read_message().await,
            Self::Tls(conn) => conn.read_message().await,
        }
    }
}

/// Run a fallible IO future under the session deadline.
async fn timed<F, T, E>(deadline: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<Error>,
{
    match deadline {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(Error::Transport("operation timed out".into())),
        },
        None => fut.await.map_err(Into::into),
    }
}

/// One connection to a SQL Server instance.
pub struct Session {
    config: Config,
    transport: Option<Transport>,
    packet_size: usize,
    transaction: TransactionId,
    dirty: bool,
    last_description: Vec<Column>,
    last_rows: Vec<Row>,
}

impl Session {
    /// Connect, negotiate encryption and authenticate.
    pub async fn connect(config: Config) -> Result<Self> {
        tds74_tls::install_crypto_provider();
        let deadline = config.timeout;

        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "connecting to SQL Server"
        );

        let tcp = timed(
            deadline,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await?;
        tcp.set_nodelay(true)?;

        // Pre-login happens in cleartext over the fresh connection.
        let mut conn = Connection::new(tcp);
        let prelogin = PreLogin::new(config.encrypt.wire_level(), config.instance_name.clone());
        timed(
            deadline,
            conn.send_message(PacketType::PreLogin, prelogin.encode(), DEFAULT_PACKET_SIZE),
        )
        .await?;
        let reply_message = timed(deadline, conn.read_message())
            .await?
            .ok_or_else(|| Error::Transport("connection closed during pre-login".into()))?;
        let reply = PreLoginReply::decode(&reply_message.payload)?;
        tracing::debug!(encryption = ?reply.encryption, "pre-login reply");

        let transport = if reply.wants_tls() {
            let (tcp, mut codec) = conn.into_parts();
            let tls_config = TlsConfig {
                trust_server_certificate: config.trusts_any_certificate(),
            };
            let connector = TlsConnector::new(&tls_config)?;
            let tls = timed(
                deadline,
                connector.connect_via_prelogin(tcp, &config.host, codec.peek_packet_id()),
            )
            .await?;
            // Handshake packets advanced the sequence; catch the codec up.
            let (tunnel, _) = tls.get_ref();
            codec.set_packet_id(tunnel.next_packet_id());
            Transport::Tls(Connection::with_codec(tls, codec))
        } else {
            if matches!(config.encrypt, EncryptMode::On | EncryptMode::Required) {
                return Err(Error::Transport(
                    "server refused the requested encryption".into(),
                ));
            }
            Transport::Plain(conn)
        };

        let mut session = Self {
            config,
            transport: Some(transport),
            packet_size: DEFAULT_PACKET_SIZE,
            transaction: TransactionId::NONE,
            dirty: false,
            last_description: Vec::new(),
            last_rows: Vec::new(),
        };
        session.login().await?;
        Ok(session)
    }

    async fn login(&mut self) -> Result<()> {
        let login = Login7 {
            client_host: std::env::var("HOSTNAME").unwrap_or_default(),
            user: self.config.user.clone(),
            password: self.config.password.clone(),
            app_name: self.config.app_name.clone(),
            server_host: self.config.host.clone(),
            database: self.config.database.clone(),
            lcid: self.config.lcid,
            packet_size: self.packet_size as u32,
            ..Login7::default()
        };

        self.send_request(PacketType::Login7, login.encode()).await?;
        let response = self.read_and_parse().await?;

        // Anything the server rejects at login time kills the session.
        if let Some(error) = &response.error {
            self.transport = None;
            return Err(Error::from_server(error, None));
        }
        let Some(ack) = &response.login_ack else {
            self.transport = None;
            return Err(Error::Protocol("login was not acknowledged".into()));
        };
        tracing::info!(
            tds_version = %format_args!("{:08X}", ack.tds_version),
            server = %ack.prog_name,
            "login acknowledged"
        );

        if let Some(size) = response.packet_size {
            self.packet_size = size as usize;
        }
        Ok(())
    }

    /// Execute a SQL batch.
    ///
    /// Begins a transaction first when none is active. Returns the last
    /// result set of the batch along with the accumulated row count.
    pub async fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        self.ensure_transaction().await?;

        tracing::debug!(sql, "executing batch");
        let payload = encode_sql_batch(sql, self.transaction);
        self.send_request(PacketType::SqlBatch, payload).await?;
        self.dirty = true;

        let response = self.read_and_parse().await?;
        self.absorb(&response);
        if let Some(error) = &response.error {
            return Err(Error::from_server(error, Some(sql)));
        }

        let result = self.stash_result(response);
        if self.config.autocommit {
            self.commit().await?;
        }
        Ok(result)
    }

    /// Call a stored procedure with the given parameters.
    pub async fn callproc(&mut self, proc_name: &str, params: &[Param]) -> Result<ProcResult> {
        self.ensure_transaction().await?;

        tracing::debug!(proc_name, params = params.len(), "calling procedure");
        let mut rpc = RpcRequest::new(proc_name);
        for param in params {
            rpc.push_param(encode_param(
                param,
                self.config.lcid,
                self.config.decimal_precision,
            )?);
        }
        self.send_request(PacketType::Rpc, rpc.encode(self.transaction))
            .await?;
        self.dirty = true;

        let response = self.read_and_parse().await?;
        self.absorb(&response);
        if let Some(error) = &response.error {
            return Err(Error::from_server(error, Some(proc_name)));
        }

        let return_status = response.return_status;
        let result = self.stash_result(response);
        if self.config.autocommit {
            self.commit().await?;
        }
        Ok(ProcResult {
            return_status,
            description: result.description,
            rows: result.rows,
        })
    }

    /// Make sure a transaction is active, beginning one if none is.
    ///
    /// Requests begin transactions on their own; calling this is only
    /// useful to open the transaction ahead of the first statement.
    pub async fn begin(&mut self) -> Result<()> {
        self.ensure_transaction().await
    }

    /// Commit the current transaction.
    ///
    /// A no-op unless a statement has run since the transaction began.
    pub async fn commit(&mut self) -> Result<()> {
        self.finish_transaction(TmRequest::Commit).await
    }

    /// Roll back the current transaction.
    ///
    /// A no-op unless a statement has run since the transaction began.
    pub async fn rollback(&mut self) -> Result<()> {
        self.finish_transaction(TmRequest::Rollback).await
    }

    /// Close the session. The socket is dropped; nothing is flushed.
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            tracing::debug!("session closed");
        }
    }

    /// Whether the session still owns a live connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Additional result sets are not implemented.
    pub fn next_result_set(&mut self) -> Result<()> {
        Err(Error::NotSupported("nextset"))
    }

    /// Description of the most recent result set.
    #[must_use]
    pub fn description(&self) -> &[Column] {
        &self.last_description
    }

    /// Rows of the most recent result set.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.last_rows
    }

    /// Begin a transaction when none is active.
    async fn ensure_transaction(&mut self) -> Result<()> {
        if !self.transaction.is_none() {
            return Ok(());
        }

        let payload = encode_tm_request(
            TmRequest::Begin,
            TransactionId::NONE,
            self.config.isolation_level,
        );
        self.send_request(PacketType::TransactionManager, payload)
            .await?;
        let response = self.read_and_parse().await?;
        if let Some(error) = &response.error {
            return Err(Error::from_server(error, None));
        }

        let Some(id) = response.begin_transaction else {
            self.transport = None;
            return Err(Error::Protocol(
                "BEGIN did not return a transaction descriptor".into(),
            ));
        };
        tracing::debug!(id = ?id.as_bytes(), "transaction begun");
        self.transaction = id;
        self.dirty = false;
        Ok(())
    }

    async fn finish_transaction(&mut self, request: TmRequest) -> Result<()> {
        if self.transaction.is_none() || !self.dirty {
            self.transaction = TransactionId::NONE;
            self.dirty = false;
            return Ok(());
        }

        let payload = encode_tm_request(request, self.transaction, self.config.isolation_level);
        self.send_request(PacketType::TransactionManager, payload)
            .await?;
        let response = self.read_and_parse().await?;

        // The transaction is over either way.
        self.transaction = TransactionId::NONE;
        self.dirty = false;
        tracing::debug!(?request, "transaction finished");

        if let Some(error) = &response.error {
            return Err(Error::from_server(error, None));
        }
        Ok(())
    }

    /// Fold session-wide environment changes into the session state.
    fn absorb(&mut self, response: &Response) {
        if let Some(id) = response.begin_transaction {
            self.transaction = id;
        }
        if let Some(size) = response.packet_size {
            self.packet_size = size as usize;
        }
    }

    /// Keep the most recent description and rows, returning the result.
    fn stash_result(&mut self, response: Response) -> QueryResult {
        let description: Vec<Column> = response.columns.iter().map(Column::from_desc).collect();
        let rows: Vec<Row> = response.rows.into_iter().map(Row::from_values).collect();
        self.last_description = description.clone();
        self.last_rows = rows.clone();
        QueryResult {
            description,
            rows,
            rowcount: response.row_count,
        }
    }

    async fn send_request(&mut self, packet_type: PacketType, payload: Bytes) -> Result<()> {
        let deadline = self.config.timeout;
        let packet_size = self.packet_size;
        let Some(transport) = self.transport.as_mut() else {
            return Err(Error::Transport("session is closed".into()));
        };

        let result = timed(
            deadline,
            transport.send_message(packet_type, payload, packet_size),
        )
        .await;
        if result.is_err() {
            self.transport = None;
        }
        result
    }

    async fn read_response(&mut self) -> Result<Message> {
        let deadline = self.config.timeout;
        let Some(transport) = self.transport.as_mut() else {
            return Err(Error::Transport("session is closed".into()));
        };

        let result = match timed(deadline, transport.read_message()).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(Error::Transport("connection closed by server".into())),
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.transport = None;
        }
        result
    }

    async fn read_and_parse(&mut self) -> Result<Response> {
        let message = self.read_response().await?;
        match parse_response(message.payload, self.config.server_encoding) {
            Ok(response) => Ok(response),
            Err(e) => {
                // A malformed stream leaves the wire position unknown.
                self.transport = None;
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.config.host)
            .field("connected", &self.is_connected())
            .field("in_transaction", &!self.transaction.is_none())
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}
