//! Session tests against a scripted mock server.
//!
//! The mock accepts one connection and answers each incoming message with
//! the next pre-encoded response payload, recording every request it saw so
//! tests can assert on the bytes the session put on the wire.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use tds74_client::{Config, EncryptMode, Error, Param, Session, Value};

const HEADER_SIZE: usize = 8;

type RequestLog = Arc<Mutex<Vec<(u8, Vec<u8>)>>>;

/// Spawn a mock server answering each request with the next scripted reply.
async fn spawn_mock(replies: Vec<Bytes>) -> (u16, RequestLog) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));

    let task_log = Arc::clone(&log);
    tokio::spawn(async move {
        let (mut stream, _) = match listener.accept().await {
            Ok(conn) => conn,
            Err(_) => return,
        };
        let mut replies = replies.into_iter();
        while let Some((packet_type, payload)) = read_request(&mut stream).await {
            task_log.lock().await.push((packet_type, payload));
            let Some(reply) = replies.next() else { break };
            if write_response(&mut stream, &reply).await.is_err() {
                break;
            }
        }
    });

    (port, log)
}

/// Read one complete client message, joining packets until end-of-message.
async fn read_request(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let mut packet_type = None;
    let mut payload = Vec::new();
    loop {
        let mut header = [0u8; HEADER_SIZE];
        stream.read_exact(&mut header).await.ok()?;
        let length = u16::from_be_bytes([header[2], header[3]]) as usize;
        let mut body = vec![0u8; length - HEADER_SIZE];
        stream.read_exact(&mut body).await.ok()?;

        packet_type.get_or_insert(header[0]);
        payload.extend_from_slice(&body);
        if header[1] & 0x01 != 0 {
            return Some((packet_type?, payload));
        }
    }
}

/// Send a single-packet tabular response.
async fn write_response(stream: &mut TcpStream, payload: &[u8]) -> std::io::Result<()> {
    let mut packet = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    packet.put_u8(0x04); // tabular result
    packet.put_u8(0x01); // end of message
    packet.put_u16((HEADER_SIZE + payload.len()) as u16);
    packet.put_u16(51); // spid
    packet.put_u8(1);
    packet.put_u8(0);
    packet.put_slice(payload);
    stream.write_all(&packet).await
}

// ---------------------------------------------------------------------------
// Scripted reply payloads
// ---------------------------------------------------------------------------

/// PRELOGIN reply declining encryption.
fn prelogin_reply() -> Bytes {
    let mut buf = BytesMut::new();
    // Option table: VERSION and ENCRYPTION, then the terminator.
    buf.put_u8(0x00);
    buf.put_u16(11);
    buf.put_u16(6);
    buf.put_u8(0x01);
    buf.put_u16(17);
    buf.put_u16(1);
    buf.put_u8(0xFF);
    // VERSION payload, then the encryption decision.
    buf.put_slice(&[16, 0, 4, 0, 0, 0]);
    buf.put_u8(0x00); // ENCRYPT_OFF
    buf.freeze()
}

fn put_b_varchar(buf: &mut BytesMut, s: &str) {
    buf.put_u8(s.encode_utf16().count() as u8);
    for unit in s.encode_utf16() {
        buf.put_u16_le(unit);
    }
}

fn put_done(buf: &mut BytesMut, status: u16, rows: u64) {
    buf.put_u8(0xFD);
    buf.put_u16_le(status);
    buf.put_u16_le(0);
    buf.put_u64_le(rows);
}

/// Login response: LOGINACK followed by DONE.
fn login_reply() -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(0xAD);
    let name = "Mock SQL Server";
    buf.put_u16_le((1 + 4 + 1 + name.encode_utf16().count() * 2 + 4) as u16);
    buf.put_u8(1); // interface
    buf.put_u32_le(0x7400_0004);
    put_b_varchar(&mut buf, name);
    buf.put_u32_le(0x1000_0000);
    put_done(&mut buf, 0, 0);
    buf.freeze()
}

/// BEGIN response announcing the given transaction descriptor.
fn begin_reply(id: [u8; 8]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(0xE3);
    buf.put_u16_le(11);
    buf.put_u8(8); // BEGINTRANS
    buf.put_u8(8);
    buf.put_slice(&id);
    buf.put_u8(0);
    put_done(&mut buf, 0, 0);
    buf.freeze()
}

/// COMMIT/ROLLBACK response.
fn end_transaction_reply(kind: u8) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(0xE3);
    buf.put_u16_le(3);
    buf.put_u8(kind);
    buf.put_u8(0);
    buf.put_u8(0);
    put_done(&mut buf, 0, 0);
    buf.freeze()
}

/// A one-row result set: `a INT = 1, b NVARCHAR = 'hi'`.
fn select_reply() -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(0x81);
    buf.put_u16_le(2);

    // a INT NOT NULL
    buf.put_u32_le(0);
    buf.put_u16_le(0);
    buf.put_u8(56); // INT4
    put_b_varchar(&mut buf, "a");

    // b NVARCHAR(10) NULL
    buf.put_u32_le(0);
    buf.put_u16_le(1);
    buf.put_u8(231); // NVARCHAR
    buf.put_u16_le(20);
    buf.put_slice(&[0x09, 0x04, 0xD0, 0x00, 0x34]);
    put_b_varchar(&mut buf, "b");

    // ROW
    buf.put_u8(0xD1);
    buf.put_i32_le(1);
    buf.put_u16_le(4);
    for unit in "hi".encode_utf16() {
        buf.put_u16_le(unit);
    }

    put_done(&mut buf, 0x10, 1);
    buf.freeze()
}

/// An ERROR 102 response.
fn syntax_error_reply() -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(0xAA);
    let message = "Incorrect syntax near 'bad'.";
    buf.put_u16_le(0);
    buf.put_i32_le(102);
    buf.put_u8(1);
    buf.put_u8(15);
    buf.put_u16_le(message.encode_utf16().count() as u16);
    for unit in message.encode_utf16() {
        buf.put_u16_le(unit);
    }
    put_b_varchar(&mut buf, "mock");
    buf.put_u8(0);
    buf.put_i32_le(1);
    put_done(&mut buf, 0x02, 0);
    buf.freeze()
}

/// A procedure response: result set, then RETURNSTATUS and DONEPROC.
fn proc_reply() -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(0x81);
    buf.put_u16_le(1);
    buf.put_u32_le(0);
    buf.put_u16_le(0);
    buf.put_u8(56);
    put_b_varchar(&mut buf, "n");
    buf.put_u8(0xD1);
    buf.put_i32_le(7);
    buf.put_u8(0x79); // RETURNSTATUS
    buf.put_i32_le(0);
    buf.put_u8(0xFE); // DONEPROC
    buf.put_u16_le(0);
    buf.put_u16_le(0);
    buf.put_u64_le(0);
    buf.freeze()
}

fn test_config(port: u16) -> Config {
    Config::new("127.0.0.1")
        .port(port)
        .credentials("sa", "hunter2")
        .database("test")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connect_execute_commit() {
    let txn_id = [9, 9, 9, 9, 0, 0, 0, 1];
    let (port, log) = spawn_mock(vec![
        prelogin_reply(),
        login_reply(),
        begin_reply(txn_id),
        select_reply(),
        end_transaction_reply(9),
    ])
    .await;

    let mut session = Session::connect(test_config(port)).await.expect("connect");
    let result = session.execute("SELECT 1 a, N'hi' b").await.expect("execute");

    assert_eq!(result.rowcount, 1);
    assert_eq!(result.description.len(), 2);
    assert_eq!(result.description[0].name, "a");
    assert!(!result.description[0].nullable);
    assert_eq!(result.description[1].name, "b");
    assert!(result.description[1].nullable);
    assert_eq!(
        result.rows[0].values(),
        &[Value::Int(1), Value::String("hi".into())]
    );

    session.commit().await.expect("commit");

    let log = log.lock().await;
    let types: Vec<u8> = log.iter().map(|(t, _)| *t).collect();
    // prelogin, login, implicit begin, batch, commit
    assert_eq!(types, vec![0x12, 0x10, 0x0E, 0x01, 0x0E]);

    // The batch carries the server's transaction descriptor in ALL_HEADERS.
    assert_eq!(&log[3].1[10..18], &txn_id);
    // The commit names the same descriptor and the COMMIT request type.
    assert_eq!(&log[4].1[10..18], &txn_id);
    assert_eq!(&log[4].1[22..24], &[7, 0]);

    // The batch text follows the 22-byte prefix as UCS-2.
    let sql: Vec<u8> = "SELECT 1 a, N'hi' b"
        .encode_utf16()
        .flat_map(u16::to_le_bytes)
        .collect();
    assert_eq!(&log[3].1[22..], &sql[..]);
}

#[tokio::test]
async fn server_error_is_classified_and_session_survives() {
    let (port, _log) = spawn_mock(vec![
        prelogin_reply(),
        login_reply(),
        begin_reply([1; 8]),
        syntax_error_reply(),
        select_reply(),
    ])
    .await;

    let mut session = Session::connect(test_config(port)).await.expect("connect");

    let err = session.execute("bad sql").await.expect_err("must fail");
    match &err {
        Error::Programming { number, sql, .. } => {
            assert_eq!(*number, 102);
            assert_eq!(sql.as_deref(), Some("bad sql"));
        }
        other => panic!("expected a programming error, got {other:?}"),
    }
    assert!(!err.is_fatal());
    assert!(session.is_connected());

    // The transaction is still the same one, so no new BEGIN is issued.
    let result = session.execute("SELECT 1 a, N'hi' b").await.expect("retry");
    assert_eq!(result.rows.len(), 1);
}

#[tokio::test]
async fn callproc_surfaces_return_status() {
    let (port, log) = spawn_mock(vec![
        prelogin_reply(),
        login_reply(),
        begin_reply([2; 8]),
        proc_reply(),
    ])
    .await;

    let mut session = Session::connect(test_config(port)).await.expect("connect");
    let result = session
        .callproc("dbo.counts", &[Param::Int32(5), Param::Text("x".into())])
        .await
        .expect("callproc");

    assert_eq!(result.return_status, Some(0));
    assert_eq!(result.rows[0].values(), &[Value::Int(7)]);

    let log = log.lock().await;
    let (packet_type, payload) = &log[3];
    assert_eq!(*packet_type, 0x03); // RPC

    // Procedure name length in characters, right after ALL_HEADERS.
    assert_eq!(&payload[22..24], &[10, 0]);
    let name: Vec<u8> = "dbo.counts".encode_utf16().flat_map(u16::to_le_bytes).collect();
    assert_eq!(&payload[24..44], &name[..]);
}

#[tokio::test]
async fn autocommit_commits_after_each_execute() {
    let (port, log) = spawn_mock(vec![
        prelogin_reply(),
        login_reply(),
        begin_reply([3; 8]),
        select_reply(),
        end_transaction_reply(9),
    ])
    .await;

    let config = test_config(port).autocommit(true);
    let mut session = Session::connect(config).await.expect("connect");
    session.execute("SELECT 1 a, N'hi' b").await.expect("execute");

    let log = log.lock().await;
    let types: Vec<u8> = log.iter().map(|(t, _)| *t).collect();
    assert_eq!(types, vec![0x12, 0x10, 0x0E, 0x01, 0x0E]);
}

#[tokio::test]
async fn nextset_is_not_supported() {
    let (port, _log) = spawn_mock(vec![prelogin_reply(), login_reply()]).await;
    let mut session = Session::connect(test_config(port)).await.expect("connect");
    assert!(matches!(
        session.next_result_set(),
        Err(Error::NotSupported("nextset"))
    ));
}

#[tokio::test]
async fn login_rejection_is_fatal() {
    // ERROR 18456 instead of LOGINACK.
    let mut buf = BytesMut::new();
    buf.put_u8(0xAA);
    let message = "Login failed for user 'sa'.";
    buf.put_u16_le(0);
    buf.put_i32_le(18456);
    buf.put_u8(1);
    buf.put_u8(14);
    buf.put_u16_le(message.encode_utf16().count() as u16);
    for unit in message.encode_utf16() {
        buf.put_u16_le(unit);
    }
    put_b_varchar(&mut buf, "mock");
    buf.put_u8(0);
    buf.put_i32_le(1);
    put_done(&mut buf, 0x02, 0);

    let (port, _log) = spawn_mock(vec![prelogin_reply(), buf.freeze()]).await;

    let err = Session::connect(test_config(port)).await.expect_err("login must fail");
    match err {
        Error::Operational { number, .. } => assert_eq!(number, 18456),
        other => panic!("expected an operational error, got {other:?}"),
    }
}

#[tokio::test]
async fn required_encryption_refused_by_server_fails() {
    let (port, _log) = spawn_mock(vec![prelogin_reply()]).await;

    let config = test_config(port).encrypt(EncryptMode::Required);
    let err = Session::connect(config).await.expect_err("must fail");
    assert!(matches!(err, Error::Transport(_)));
}
