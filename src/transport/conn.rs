//! Blocking stream adapter over an event-driven socket.
//!
//! The underlying primitive only calls back on events (data arrival, idle
//! timeout, error, close) from a single-threaded event loop; `Conn` turns
//! that into ordinary sequential `Read`/`Write` for a blocking caller. The
//! two sides meet in exactly one place: the [`FrameBuffer`] plus the
//! lifecycle state guarded by one mutex/condvar signal. Event callbacks
//! never block; the consumer only ever parks on the signal.
//!
//! Both `Read` and `Write` are implemented for `&Conn` as well, mirroring
//! `std::net::TcpStream`, so reader and writer may live on different
//! threads.

use crate::error::{ProtocolError, Result};
use crate::transport::buffer::FrameBuffer;
use crate::transport::driver::{SocketDriver, WriteOutcome};
use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

/// Why a connection ended. Recorded once (first writer wins) and replayed
/// to every subsequent or concurrently blocked caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Graceful close, locally requested or remote end-of-stream.
    Clean,
    /// The idle deadline fired.
    Timeout,
    /// Establishment was cancelled by the caller.
    Cancelled,
    /// Socket-level failure reported by the event loop.
    Error {
        /// Kind of the underlying I/O error.
        kind: io::ErrorKind,
        /// Rendered error message.
        message: String,
    },
}

impl CloseReason {
    pub(crate) fn from_io(err: &io::Error) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Result form used by `close()`.
    pub(crate) fn into_result(self) -> Result<()> {
        match self {
            Self::Clean => Ok(()),
            Self::Timeout => Err(ProtocolError::Timeout),
            Self::Cancelled => Err(ProtocolError::Cancelled),
            Self::Error { kind, message } => {
                Err(ProtocolError::Io(io::Error::new(kind, message)))
            }
        }
    }

    fn to_io_error(&self) -> io::Error {
        match self {
            Self::Clean => io::Error::new(
                io::ErrorKind::NotConnected,
                ProtocolError::ConnectionClosed,
            ),
            Self::Timeout => io::Error::new(io::ErrorKind::TimedOut, ProtocolError::Timeout),
            Self::Cancelled => {
                io::Error::new(io::ErrorKind::Interrupted, ProtocolError::Cancelled)
            }
            Self::Error { kind, message } => io::Error::new(*kind, message.clone()),
        }
    }
}

/// Connection lifecycle. No transition leaves `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Phase {
    Connecting,
    Connected,
    Closing,
    Closed,
}

#[derive(Debug)]
struct Lifecycle {
    phase: Phase,
    reason: Option<CloseReason>,
    /// Bumped whenever the write queue fully flushes; parked writers
    /// compare serials to detect a drain since they last tried.
    drain_serial: u64,
}

/// State shared between the event loop and the blocking caller.
#[derive(Debug)]
pub(crate) struct Shared {
    buffer: FrameBuffer,
    lifecycle: Mutex<Lifecycle>,
    signal: Condvar,
}

impl Shared {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            buffer: FrameBuffer::new(),
            lifecycle: Mutex::new(Lifecycle {
                phase: Phase::Connecting,
                reason: None,
                drain_serial: 0,
            }),
            signal: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Lifecycle>) -> MutexGuard<'a, Lifecycle> {
        self.signal
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Event-loop side of the handoff. Every callback returns immediately;
/// anything blocking-shaped is delegated to the parked consumer via the
/// signal.
#[derive(Clone)]
pub(crate) struct EventSink {
    shared: Arc<Shared>,
}

impl EventSink {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Connect completed.
    pub(crate) fn connected(&self) {
        let mut st = self.shared.lock();
        if st.phase == Phase::Connecting {
            st.phase = Phase::Connected;
        }
        self.shared.signal.notify_all();
    }

    /// One delivery's payload arrived. Dropped when already closing: the
    /// connection's data is no longer meaningful past that point.
    pub(crate) fn data(&self, chunk: Bytes) {
        let st = self.shared.lock();
        if st.phase >= Phase::Closing {
            return;
        }
        self.shared.buffer.store(chunk);
        self.shared.signal.notify_all();
    }

    /// Socket-level failure. First recorded reason wins.
    pub(crate) fn error(&self, err: &io::Error) {
        let mut st = self.shared.lock();
        st.reason.get_or_insert(CloseReason::from_io(err));
        if st.phase < Phase::Closing {
            st.phase = Phase::Closing;
        }
        self.shared.signal.notify_all();
    }

    /// Idle deadline fired; converges on the same close path as everything
    /// else, tagged distinctly.
    pub(crate) fn timeout(&self) {
        let mut st = self.shared.lock();
        st.reason.get_or_insert(CloseReason::Timeout);
        if st.phase < Phase::Closing {
            st.phase = Phase::Closing;
        }
        self.shared.signal.notify_all();
    }

    /// The write queue fully flushed; wakes writers parked on backpressure.
    pub(crate) fn drained(&self) {
        let mut st = self.shared.lock();
        st.drain_serial += 1;
        self.shared.signal.notify_all();
    }

    /// All handler resources are released; terminal state. Pending unread
    /// chunks are discarded here (error state supersedes partial data).
    pub(crate) fn closed(&self) {
        let mut st = self.shared.lock();
        st.reason.get_or_insert(CloseReason::Clean);
        st.phase = Phase::Closed;
        self.shared.buffer.clear();
        self.shared.signal.notify_all();
    }
}

/// Synchronous stream endpoint over the event-driven transport.
///
/// Obtained from [`Dialer::dial`](crate::transport::Dialer::dial). `Read`
/// blocks for the next delivery, `Write` hands one chunk to the event loop
/// per call, `close` is idempotent, and deadlines map to the transport's
/// idle-timeout mechanism.
pub struct Conn {
    shared: Arc<Shared>,
    driver: Box<dyn SocketDriver>,
    /// Chunk currently being consumed by the reader; a chunk may span
    /// several `read` calls.
    current: Mutex<Option<Bytes>>,
    local_addr: Option<SocketAddr>,
    remote_addr: Option<SocketAddr>,
}

impl Conn {
    pub(crate) fn new(
        shared: Arc<Shared>,
        driver: Box<dyn SocketDriver>,
        local_addr: Option<SocketAddr>,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            shared,
            driver,
            current: Mutex::new(None),
            local_addr,
            remote_addr,
        }
    }

    /// Local address captured at connect time.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Peer address captured at connect time. Still answers after close.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// True once the connection has begun (or finished) closing.
    pub fn is_closed(&self) -> bool {
        self.shared.lock().phase >= Phase::Closing
    }

    /// Set the idle deadline for both directions; `None` disables it.
    ///
    /// Firing performs an asynchronous close with a timeout-kind error,
    /// which unblocks any pending read or write.
    pub fn set_deadline(&self, timeout: Option<Duration>) {
        self.driver.set_idle_timeout(timeout);
    }

    /// Read-direction deadline. The transport exposes a single idle timer,
    /// so this is equivalent to [`set_deadline`](Self::set_deadline).
    pub fn set_read_deadline(&self, timeout: Option<Duration>) {
        self.set_deadline(timeout);
    }

    /// Write-direction deadline; see [`set_read_deadline`](Self::set_read_deadline).
    pub fn set_write_deadline(&self, timeout: Option<Duration>) {
        self.set_deadline(timeout);
    }

    /// Close the connection and release its event-loop resources.
    ///
    /// Idempotent and safe to race: whichever trigger fires first (explicit
    /// close, remote close, remote error, timeout) wins the recorded
    /// reason; every call blocks until resources are released and returns
    /// the same recorded result (`Ok` for a clean close).
    pub fn close(&self) -> Result<()> {
        let request = {
            let mut st = self.shared.lock();
            if st.phase == Phase::Closed {
                return st.reason.clone().unwrap_or(CloseReason::Clean).into_result();
            }
            if st.phase < Phase::Closing {
                st.phase = Phase::Closing;
                true
            } else {
                false
            }
        };

        if request {
            debug!("closing connection");
            self.driver.request_close();
        }

        let mut st = self.shared.lock();
        while st.phase != Phase::Closed {
            st = self.shared.wait(st);
        }
        st.reason.clone().unwrap_or(CloseReason::Clean).into_result()
    }

    fn read_inner(&self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(chunk) = current.as_mut() {
                if chunk.is_empty() {
                    // Zero-length delivery: retry against the next chunk,
                    // never surface it as end-of-stream.
                    *current = None;
                } else {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk.split_to(n));
                    return Ok(n);
                }
            }

            let mut st = self.shared.lock();
            loop {
                if let Some(chunk) = self.shared.buffer.take() {
                    *current = Some(chunk);
                    break;
                }
                if st.phase >= Phase::Closing {
                    return match st.reason.clone().unwrap_or(CloseReason::Clean) {
                        CloseReason::Clean => Ok(0),
                        reason => Err(reason.to_io_error()),
                    };
                }
                st = self.shared.wait(st);
            }
        }
    }

    fn write_inner(&self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let chunk = Bytes::copy_from_slice(buf);
        loop {
            let observed_serial = {
                let st = self.shared.lock();
                if st.phase >= Phase::Closing {
                    return Err(st
                        .reason
                        .clone()
                        .unwrap_or(CloseReason::Clean)
                        .to_io_error());
                }
                st.drain_serial
            };

            match self.driver.try_write(chunk.clone()) {
                Ok(WriteOutcome::Accepted) => return Ok(buf.len()),
                Ok(WriteOutcome::Busy) => {
                    // Queue full: park until a drain notification or the
                    // close signal, then retry. A clean close while parked
                    // is reported as backpressure, distinct from a hard
                    // connection error.
                    trace!("write queue full; waiting for drain");
                    let mut st = self.shared.lock();
                    while st.drain_serial == observed_serial && st.phase < Phase::Closing {
                        st = self.shared.wait(st);
                    }
                    if st.phase >= Phase::Closing {
                        return Err(match st.reason.clone().unwrap_or(CloseReason::Clean) {
                            CloseReason::Clean => io::Error::new(
                                io::ErrorKind::WouldBlock,
                                ProtocolError::Backpressure,
                            ),
                            reason => reason.to_io_error(),
                        });
                    }
                }
                Err(_) => {
                    // Driver gone: the event loop is exiting. Wait for the
                    // recorded reason so all callers report consistently.
                    let mut st = self.shared.lock();
                    while st.phase < Phase::Closing {
                        st = self.shared.wait(st);
                    }
                    return Err(st
                        .reason
                        .clone()
                        .unwrap_or(CloseReason::Clean)
                        .to_io_error());
                }
            }
        }
    }
}

impl io::Read for Conn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_inner(buf)
    }
}

impl io::Read for &Conn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_inner(buf)
    }
}

impl io::Write for Conn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_inner(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Write for &Conn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_inner(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        if !self.is_closed() {
            debug!("connection dropped without close; requesting shutdown");
            self.driver.request_close();
        }
    }
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn")
            .field("local_addr", &self.local_addr)
            .field("remote_addr", &self.remote_addr)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
