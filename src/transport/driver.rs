//! Event-loop driver for the underlying socket.
//!
//! Each connection owns one dedicated thread running a current-thread Tokio
//! runtime: the single-threaded event loop the adapter contract assumes.
//! The loop fires data/drain/timeout/error/close events into the
//! [`EventSink`](super::conn::EventSink) and never blocks; the blocking
//! caller talks back through a bounded write queue and a control channel.
//!
//! Backpressure maps onto the queue: a full `try_send` is the "cannot
//! accept this write" signal, and the queue flushing empty emits the drain
//! event that releases parked writers.

use crate::config::MAX_CHUNK_SIZE;
use crate::error::{ProtocolError, Result};
use crate::transport::conn::EventSink;
use crate::transport::dial::CancelToken;
use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Immediate outcome of handing one chunk to the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteOutcome {
    /// The chunk was queued for transmission.
    Accepted,
    /// The queue cannot currently accept the write; wait for drain.
    Busy,
}

/// Commands the blocking side may issue without blocking the event loop.
#[derive(Debug)]
enum Ctrl {
    SetIdleTimeout(Option<Duration>),
    Close,
}

/// Handle the adapter uses to reach its event loop.
pub(crate) trait SocketDriver: Send + Sync {
    /// Offer one chunk; never blocks.
    fn try_write(&self, chunk: Bytes) -> Result<WriteOutcome>;

    /// Replace the idle deadline; `None` disables it.
    fn set_idle_timeout(&self, timeout: Option<Duration>);

    /// Ask the event loop to shut down and release its resources.
    fn request_close(&self);
}

/// Tokio-backed driver handle.
pub(crate) struct TokioDriver {
    write_tx: mpsc::Sender<Bytes>,
    ctrl_tx: mpsc::UnboundedSender<Ctrl>,
}

impl SocketDriver for TokioDriver {
    fn try_write(&self, chunk: Bytes) -> Result<WriteOutcome> {
        match self.write_tx.try_send(chunk) {
            Ok(()) => Ok(WriteOutcome::Accepted),
            Err(mpsc::error::TrySendError::Full(_)) => Ok(WriteOutcome::Busy),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ProtocolError::ConnectionClosed),
        }
    }

    fn set_idle_timeout(&self, timeout: Option<Duration>) {
        let _ = self.ctrl_tx.send(Ctrl::SetIdleTimeout(timeout));
    }

    fn request_close(&self) {
        let _ = self.ctrl_tx.send(Ctrl::Close);
    }
}

/// A successfully established connection, ready to wrap in a `Conn`.
pub(crate) struct Established {
    pub(crate) driver: TokioDriver,
    pub(crate) local_addr: Option<SocketAddr>,
    pub(crate) remote_addr: Option<SocketAddr>,
}

/// Spawn the event-loop thread and begin connecting.
///
/// The returned receiver yields exactly one message: the established driver
/// or the connect error. The caller blocks on it; cancellation and the
/// connect timeout resolve the same wait.
pub(crate) fn spawn_connect(
    addr: String,
    sink: EventSink,
    cancel: CancelToken,
    connect_timeout: Option<Duration>,
    write_queue_depth: usize,
) -> std_mpsc::Receiver<Result<Established>> {
    let (result_tx, result_rx) = std_mpsc::sync_channel(1);

    let spawned = std::thread::Builder::new()
        .name("speaker-io".to_string())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build();

            match runtime {
                Ok(runtime) => runtime.block_on(run(
                    addr,
                    sink,
                    cancel,
                    connect_timeout,
                    write_queue_depth,
                    result_tx,
                )),
                Err(e) => {
                    let _ = result_tx.send(Err(ProtocolError::Connect(format!(
                        "failed to start event loop: {e}"
                    ))));
                }
            }
        });

    if let Err(e) = spawned {
        // Thread creation failed; surface through a fresh channel since the
        // original sender moved into the closure that never ran.
        let (tx, rx) = std_mpsc::sync_channel(1);
        let _ = tx.send(Err(ProtocolError::Connect(format!(
            "failed to spawn connection thread: {e}"
        ))));
        return rx;
    }

    result_rx
}

async fn run(
    addr: String,
    sink: EventSink,
    cancel: CancelToken,
    connect_timeout: Option<Duration>,
    write_queue_depth: usize,
    result_tx: std_mpsc::SyncSender<Result<Established>>,
) {
    let connect = TcpStream::connect(addr.as_str());
    tokio::pin!(connect);

    let deadline = async {
        match connect_timeout {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let stream = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            debug!(peer = %addr, "connect cancelled");
            let _ = result_tx.send(Err(ProtocolError::Cancelled));
            return;
        }
        () = &mut deadline => {
            debug!(peer = %addr, "connect timed out");
            let _ = result_tx.send(Err(ProtocolError::Connect(format!(
                "connect to {addr} timed out"
            ))));
            return;
        }
        res = &mut connect => match res {
            Ok(stream) => stream,
            Err(e) => {
                debug!(peer = %addr, error = %e, "connect failed");
                let _ = result_tx.send(Err(ProtocolError::Connect(e.to_string())));
                return;
            }
        }
    };

    // A cancel raced the connect and lost the select; the caller already
    // gave up, so the completed connect must be a no-op.
    if cancel.is_cancelled() {
        debug!(peer = %addr, "connect completed after cancellation; dropping socket");
        let _ = result_tx.send(Err(ProtocolError::Cancelled));
        return;
    }

    let _ = stream.set_nodelay(true);
    let local_addr = stream.local_addr().ok();
    let remote_addr = stream.peer_addr().ok();

    let (write_tx, write_rx) = mpsc::channel(write_queue_depth);
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();

    sink.connected();
    info!(peer = ?remote_addr, "connected");

    let _ = result_tx.send(Ok(Established {
        driver: TokioDriver { write_tx, ctrl_tx },
        local_addr,
        remote_addr,
    }));

    event_loop(stream, write_rx, ctrl_rx, &sink).await;
}

async fn event_loop(
    stream: TcpStream,
    mut write_rx: mpsc::Receiver<Bytes>,
    mut ctrl_rx: mpsc::UnboundedReceiver<Ctrl>,
    sink: &EventSink,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut idle: Option<Duration> = None;

    loop {
        // Re-armed every iteration, so any event resets the idle clock.
        let idle_timer = async move {
            match idle {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            ctrl = ctrl_rx.recv() => match ctrl {
                Some(Ctrl::SetIdleTimeout(timeout)) => {
                    trace!(?timeout, "idle timeout updated");
                    idle = timeout;
                }
                Some(Ctrl::Close) | None => {
                    debug!("close requested");
                    break;
                }
            },
            queued = write_rx.recv() => match queued {
                Some(chunk) => {
                    if let Err(e) = writer.write_all(&chunk).await {
                        warn!(error = %e, "socket write failed");
                        sink.error(&e);
                        break;
                    }
                    trace!(bytes = chunk.len(), "chunk written");
                    if write_rx.is_empty() {
                        sink.drained();
                    }
                }
                None => break,
            },
            delivery = read_chunk(&mut reader) => match delivery {
                Ok(Some(chunk)) => {
                    trace!(bytes = chunk.len(), "delivery received");
                    sink.data(chunk);
                }
                Ok(None) => {
                    debug!("remote closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "socket read failed");
                    sink.error(&e);
                    break;
                }
            },
            () = idle_timer => {
                debug!("idle timeout fired");
                sink.timeout();
                break;
            }
        }
    }

    // Release: shut the socket down and report terminal state exactly once.
    let _ = writer.shutdown().await;
    sink.closed();
}

/// One read call's worth of bytes: one delivery unit.
async fn read_chunk(reader: &mut OwnedReadHalf) -> std::io::Result<Option<Bytes>> {
    let mut buf = BytesMut::with_capacity(MAX_CHUNK_SIZE);
    let n = reader.read_buf(&mut buf).await?;
    if n == 0 {
        Ok(None)
    } else {
        Ok(Some(buf.freeze()))
    }
}
