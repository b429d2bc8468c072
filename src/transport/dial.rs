//! Connection establishment.
//!
//! `Dialer` resolves `host:port`, spins up the connection's event loop, and
//! blocks until the connect event fires, the attempt fails or times out, or
//! the caller cancels. A cancellation raised before completion always wins:
//! a connect callback that still fires afterwards drops the socket instead
//! of handing out an adapter the event loop has abandoned.

use crate::config::{ClientConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_WRITE_QUEUE_DEPTH};
use crate::error::{ProtocolError, Result};
use crate::transport::conn::{Conn, EventSink, Shared};
use crate::transport::driver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

/// Cancellation handle for an in-flight dial.
///
/// Cloneable; cancel from any thread while another blocks in
/// [`Dialer::dial_with_cancel`].
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    /// Fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the cancellation signal. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// True once `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves when the token is cancelled.
    pub(crate) async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Dials speaker connections.
#[derive(Debug, Clone)]
pub struct Dialer {
    /// How long a connect attempt may take; `None` waits indefinitely.
    pub connect_timeout: Option<Duration>,

    /// Write-queue depth handed to the event loop; writes beyond it report
    /// backpressure.
    pub write_queue_depth: usize,
}

impl Default for Dialer {
    fn default() -> Self {
        Self {
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            write_queue_depth: DEFAULT_WRITE_QUEUE_DEPTH,
        }
    }
}

impl Dialer {
    /// Dialer configured from a [`ClientConfig`].
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: Some(config.connect_timeout),
            write_queue_depth: config.write_queue_depth,
        }
    }

    /// Connect to `addr` (`host:port`), blocking until ready or failed.
    pub fn dial(&self, addr: &str) -> Result<Conn> {
        self.dial_with_cancel(addr, &CancelToken::new())
    }

    /// Connect with a caller-supplied cancellation token.
    pub fn dial_with_cancel(&self, addr: &str, cancel: &CancelToken) -> Result<Conn> {
        debug!(peer = %addr, "dialing");

        let shared = Shared::new();
        let sink = EventSink::new(shared.clone());
        let established = driver::spawn_connect(
            addr.to_string(),
            sink,
            cancel.clone(),
            self.connect_timeout,
            self.write_queue_depth,
        );

        match established.recv() {
            Ok(Ok(established)) => Ok(Conn::new(
                shared,
                Box::new(established.driver),
                established.local_addr,
                established.remote_addr,
            )),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ProtocolError::Connect(
                "connection thread terminated".to_string(),
            )),
        }
    }
}

/// Connect to `addr` with default dial settings.
pub fn dial(addr: &str) -> Result<Conn> {
    Dialer::default().dial(addr)
}
