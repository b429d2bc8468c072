//! # Transport Adapter
//!
//! Synchronous byte-stream access over an event-driven socket primitive.
//!
//! The underlying transport only exposes asynchronous, callback-based I/O:
//! connect, data-arrival, timeout, error and close events firing on a
//! single-threaded event loop. This module presents the blocking contract
//! application code expects on top of it.
//!
//! ## Components
//! - **FrameBuffer**: FIFO handoff queue between async delivery and sync reads
//! - **Conn**: blocking `Read`/`Write`, idempotent `close`, deadlines, addrs
//! - **Dialer**/**CancelToken**: blocking connect with timeout and cancellation
//!
//! ## Concurrency
//! Single-producer/single-consumer: event callbacks enqueue and signal,
//! never block; the consumer parks on one condvar signal, never polls.
//! Chunks surface in exact arrival order. All close triggers (explicit,
//! remote close, remote error, idle timeout) converge on one idempotent
//! close path that releases event-loop resources exactly once.

pub mod buffer;
pub mod conn;
pub mod dial;
mod driver;

pub use buffer::FrameBuffer;
pub use conn::{CloseReason, Conn};
pub use dial::{dial, CancelToken, Dialer};
