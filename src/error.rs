//! # Error Types
//!
//! Error handling for the speaker protocol stack.
//!
//! This module defines all error variants that can occur while talking to a
//! speaker, from connection establishment through frame decoding.
//!
//! ## Error Categories
//! - **Connect Errors**: Resolution/connect failures, cancellation — fatal to `Dial`
//! - **Transport Errors**: Asynchronous socket failures, recorded once and replayed
//! - **Timeout Errors**: Idle-deadline expiry, tagged distinctly from hard failures
//! - **Decode Errors**: Per-frame, recoverable — the connection stays usable
//! - **Cipher Errors**: Key/IV validation failures
//!
//! All errors implement `std::error::Error` for interoperability.

use std::io;
use thiserror::Error;

/// Primary error type for all protocol operations.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("connect cancelled")]
    Cancelled,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("connection timed out (no activity)")]
    Timeout,

    #[error("write not accepted: transport busy")]
    Backpressure,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid frame header: {0:#04x}")]
    InvalidHeader(u8),

    #[error("truncated frame")]
    TruncatedFrame,

    #[error("ciphertext length {0} is not a positive multiple of the AES block size")]
    MisalignedCiphertext(usize),

    #[error("invalid PKCS#7 padding")]
    InvalidPadding,

    #[error("encrypted frame received but no cipher is configured")]
    MissingCipher,

    #[error("frame exceeds maximum size: {0} bytes")]
    OversizedFrame(usize),

    #[error("invalid AES key length: {0} bytes (expected 16, 24 or 32)")]
    InvalidKeyLength(usize),

    #[error("invalid IV length: {0} bytes (expected 16)")]
    InvalidIvLength(usize),

    #[error("capture error: {0}")]
    Capture(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ProtocolError {
    /// True for errors local to a single frame.
    ///
    /// Decode errors do not close the connection; the caller may keep
    /// reading subsequent frames.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidHeader(_)
                | Self::TruncatedFrame
                | Self::MisalignedCiphertext(_)
                | Self::InvalidPadding
                | Self::MissingCipher
                | Self::OversizedFrame(_)
                | Self::Json(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_errors_are_recoverable() {
        assert!(ProtocolError::InvalidPadding.is_decode_error());
        assert!(ProtocolError::TruncatedFrame.is_decode_error());
        assert!(ProtocolError::MisalignedCiphertext(17).is_decode_error());
        assert!(ProtocolError::InvalidHeader(0x42).is_decode_error());
        assert!(!ProtocolError::Timeout.is_decode_error());
        assert!(!ProtocolError::ConnectionClosed.is_decode_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::TimedOut, "deadline");
        let err: ProtocolError = io_err.into();
        assert!(matches!(err, ProtocolError::Io(_)));
    }
}
