//! End-to-end scenarios over loopback TCP.
//!
//! A std listener on the test thread plays the speaker; the client side
//! goes through the real dial path, event loop and blocking adapter.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use speaker_protocol::{
    CipherContext, Dialer, ProtocolError, Session, SpeakerConfig,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const KEY: &[u8] = b"0123456789ABCDEF";
const IV: &[u8] = b"ABCDEF0123456789";

fn cipher() -> CipherContext {
    CipherContext::new(KEY, IV).unwrap()
}

/// Bind a loopback listener and serve exactly one connection with `serve`.
fn spawn_speaker<F>(serve: F) -> (String, JoinHandle<()>)
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        serve(stream);
    });
    (addr, handle)
}

fn read_exact_frame(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).unwrap();
    buf
}

#[test]
fn encrypted_echo_exchange() {
    // {"cmd":"on"} encrypts to one block: 17 bytes on the wire.
    let (addr, speaker) = spawn_speaker(|mut stream| {
        let frame = read_exact_frame(&mut stream, 17);
        stream.write_all(&frame).unwrap();
    });

    let config = SpeakerConfig::default_with_overrides(|c| {
        c.client.address = addr;
        c.transport.key = Some(String::from_utf8(KEY.to_vec()).unwrap());
        c.transport.iv = Some(String::from_utf8(IV.to_vec()).unwrap());
    });

    let mut session = Session::connect(&config).unwrap();
    session.send_value(&serde_json::json!({"cmd": "on"})).unwrap();

    let reply = session.recv_value().unwrap().unwrap();
    assert_eq!(reply, serde_json::json!({"cmd": "on"}));

    // Speaker hangs up after the echo.
    assert_eq!(session.recv().unwrap(), None);
    session.close().unwrap();
    speaker.join().unwrap();
}

#[test]
fn plaintext_push_from_speaker() {
    let (addr, speaker) = spawn_speaker(|mut stream| {
        let mut frame = vec![0x00];
        frame.extend_from_slice(br#"{"ping":1}"#);
        stream.write_all(&frame).unwrap();
        // Hold the connection open until the client is done reading.
        thread::sleep(Duration::from_millis(200));
    });

    let conn = Dialer::default().dial(&addr).unwrap();
    let mut session = Session::new(conn, None);

    assert_eq!(
        session.recv_value().unwrap().unwrap(),
        serde_json::json!({"ping": 1})
    );
    session.close().unwrap();
    speaker.join().unwrap();
}

#[test]
fn idle_deadline_unblocks_pending_recv() {
    let (addr, speaker) = spawn_speaker(|stream| {
        // Silent speaker: never writes, holds the socket open.
        thread::sleep(Duration::from_millis(500));
        drop(stream);
    });

    let conn = Dialer::default().dial(&addr).unwrap();
    conn.set_deadline(Some(Duration::from_millis(100)));
    let mut session = Session::new(conn, Some(cipher()));

    let err = session.recv().unwrap_err();
    assert!(
        matches!(&err, ProtocolError::Io(e) if e.kind() == std::io::ErrorKind::TimedOut),
        "expected timeout, got {err:?}"
    );

    // The timeout closed the connection; close replays the same reason.
    assert!(matches!(
        session.close().unwrap_err(),
        ProtocolError::Timeout
    ));
    speaker.join().unwrap();
}

#[test]
fn clean_remote_close_is_end_of_stream() {
    let (addr, speaker) = spawn_speaker(drop);

    let conn = Dialer::default().dial(&addr).unwrap();
    let mut session = Session::new(conn, Some(cipher()));

    assert_eq!(session.recv().unwrap(), None);
    session.close().unwrap();
    speaker.join().unwrap();
}

#[test]
fn close_is_idempotent_over_tcp() {
    let (addr, speaker) = spawn_speaker(|stream| {
        thread::sleep(Duration::from_millis(200));
        drop(stream);
    });

    let conn = Dialer::default().dial(&addr).unwrap();
    assert!(conn.close().is_ok());
    assert!(conn.close().is_ok());
    speaker.join().unwrap();
}

#[test]
fn byte_order_preserved_across_deliveries() {
    let expected: Vec<u8> = (0..=255u8).cycle().take(1500).collect();

    let chunks: Vec<Vec<u8>> = expected.chunks(500).map(<[u8]>::to_vec).collect();
    let (addr, speaker) = spawn_speaker(move |mut stream| {
        for chunk in chunks {
            stream.write_all(&chunk).unwrap();
            thread::sleep(Duration::from_millis(20));
        }
        thread::sleep(Duration::from_millis(200));
    });

    let conn = Dialer::default().dial(&addr).unwrap();

    // Vary the requested buffer size; order must hold regardless.
    let mut out = Vec::new();
    let mut reader = &conn;
    let mut buf = [0u8; 97];
    while out.len() < expected.len() {
        let n = reader.read(&mut buf).unwrap();
        assert!(n > 0, "no EOF expected while bytes remain");
        out.extend_from_slice(&buf[..n]);
    }
    assert_eq!(out, expected);

    conn.close().unwrap();
    speaker.join().unwrap();
}

#[test]
fn addresses_survive_close() {
    let (addr, speaker) = spawn_speaker(|stream| {
        thread::sleep(Duration::from_millis(100));
        drop(stream);
    });

    let conn = Dialer::default().dial(&addr).unwrap();
    let remote = conn.remote_addr().unwrap();
    assert_eq!(remote.to_string(), addr);
    assert!(conn.local_addr().is_some());

    conn.close().unwrap();
    assert_eq!(conn.remote_addr().unwrap().to_string(), addr);
    speaker.join().unwrap();
}
