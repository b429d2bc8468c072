//! FIFO handoff queue between asynchronous delivery and synchronous reads.
//!
//! The event loop appends one chunk per delivery event; the blocking reader
//! consumes them in arrival order. The queue is internally synchronized and
//! never blocks a producer; waiting for the next chunk is the connection
//! signal's job, not the queue's.

use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Ordered queue of raw byte chunks, one per transport delivery.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    chunks: Mutex<VecDeque<Bytes>>,
}

impl FrameBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Bytes>> {
        self.chunks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a chunk. Event-delivery context only; never blocks.
    pub fn store(&self, chunk: Bytes) {
        self.lock().push_back(chunk);
    }

    /// The oldest unconsumed chunk, without removing it.
    pub fn get(&self) -> Option<Bytes> {
        self.lock().front().cloned()
    }

    /// Drop the chunk just consumed, readying the next.
    pub fn advance(&self) {
        self.lock().pop_front();
    }

    /// Remove and return the oldest chunk.
    pub fn take(&self) -> Option<Bytes> {
        self.lock().pop_front()
    }

    /// Discard all pending chunks. Called on close; readers observe the
    /// connection's closed signal, not an empty queue.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of pending chunks.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when no chunks are pending.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
