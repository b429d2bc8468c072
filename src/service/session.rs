//! Framed JSON session over a dialed connection.

use crate::config::SpeakerConfig;
use crate::core::cipher::CipherContext;
use crate::core::framer::{encode_frame, FrameReader};
use crate::error::Result;
use crate::transport::{CancelToken, Conn, Dialer};
use serde_json::Value;
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Blocking reader handle; the session's frame reader owns one while the
/// writer side uses the shared connection directly.
struct ConnReader(Arc<Conn>);

impl Read for ConnReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        (&*self.0).read(buf)
    }
}

/// One logical conversation with a speaker: dialed connection, optional
/// cipher, one frame per message in each direction.
///
/// The reader side owns its decrypt state and the writer side its encrypt
/// state; they never share a block-mode instance. Decode errors are
/// recoverable and leave the connection usable.
pub struct Session {
    conn: Arc<Conn>,
    reader: FrameReader<ConnReader>,
    cipher: Option<CipherContext>,
}

impl Session {
    /// Dial and wrap a connection according to `config`.
    pub fn connect(config: &SpeakerConfig) -> Result<Self> {
        Self::connect_with_cancel(config, &CancelToken::new())
    }

    /// Like [`connect`](Self::connect), with caller-controlled cancellation
    /// of the dial.
    pub fn connect_with_cancel(config: &SpeakerConfig, cancel: &CancelToken) -> Result<Self> {
        config.validate_strict()?;
        let cipher = config.transport.cipher()?;

        let conn = Dialer::from_config(&config.client)
            .dial_with_cancel(&config.client.address, cancel)?;
        conn.set_deadline(config.client.deadline());

        debug!(peer = %config.client.address, encrypted = cipher.is_some(), "session established");
        Ok(Self::new(conn, cipher))
    }

    /// Wrap an already-established connection.
    pub fn new(conn: Conn, cipher: Option<CipherContext>) -> Self {
        let conn = Arc::new(conn);
        let reader = match cipher.clone() {
            Some(cipher) => FrameReader::with_cipher(ConnReader(conn.clone()), cipher),
            None => FrameReader::new(ConnReader(conn.clone())),
        };
        Self {
            conn,
            reader,
            cipher,
        }
    }

    /// Encode and send one payload as a single frame.
    #[instrument(skip(self, payload), level = "debug")]
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        let frame = encode_frame(payload, self.cipher.as_ref())?;
        let mut writer = &*self.conn;
        writer.write_all(&frame)?;
        Ok(())
    }

    /// Serialize `value` and send it as one frame.
    pub fn send_value(&mut self, value: &Value) -> Result<()> {
        self.send(&serde_json::to_vec(value)?)
    }

    /// Receive and decode the next frame.
    ///
    /// Returns `Ok(None)` when the peer closed gracefully. Decode errors
    /// are per-frame; keep calling to read subsequent frames.
    #[instrument(skip(self), level = "debug")]
    pub fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        self.reader.read_frame()
    }

    /// Receive the next frame and parse it as JSON.
    pub fn recv_value(&mut self) -> Result<Option<Value>> {
        match self.recv()? {
            Some(payload) => Ok(Some(serde_json::from_slice(&payload)?)),
            None => Ok(None),
        }
    }

    /// Idle deadline for the underlying connection; `None` disables.
    pub fn set_deadline(&self, timeout: Option<Duration>) {
        self.conn.set_deadline(timeout);
    }

    /// Local address of the underlying connection.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.conn.local_addr()
    }

    /// Peer address of the underlying connection.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.conn.remote_addr()
    }

    /// The underlying connection.
    pub fn conn(&self) -> &Conn {
        &self.conn
    }

    /// Close the underlying connection; idempotent, returns the recorded
    /// close result.
    pub fn close(&self) -> Result<()> {
        self.conn.close()
    }
}
