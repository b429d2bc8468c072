//! # Core Protocol Components
//!
//! The frame codec and its cipher context.
//!
//! This module is the heart of the wire format: a one-byte header selects a
//! plaintext or AES-CBC-encrypted payload, and the payload's extent is the
//! transport delivery unit (there is no length prefix).
//!
//! ## Wire Format
//! ```text
//! [Header(1)] [Payload(N)]
//!
//! Header 0x00: payload is raw application bytes (typically JSON text)
//! Header 0x10: payload is AES-CBC ciphertext, PKCS#7 padded (block size 16)
//! ```
//!
//! ## Security
//! - Encrypted payloads must be a positive multiple of 16 bytes
//! - Padding is validated on decode; failures are errors, never data
//! - Frame accumulation is capped at [`MAX_FRAME_SIZE`](crate::config::MAX_FRAME_SIZE)

pub mod cipher;
pub mod framer;

pub use cipher::{CipherContext, BLOCK_SIZE};
pub use framer::{
    decode_frame, encode_frame, FrameReader, FrameWriter, HEADER_ENCRYPTED, HEADER_PLAINTEXT,
};
