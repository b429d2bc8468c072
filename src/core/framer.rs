//! Header-tagged frame codec.
//!
//! A frame is one header byte followed by the payload; the payload's extent
//! is the transport delivery unit, not an encoded length. [`FrameReader`]
//! and [`FrameWriter`] implement the streaming side over any
//! `Read`/`Write`, and [`decode_frame`]/[`encode_frame`] expose the
//! per-delivery codec used by the capture replay path.
//!
//! The length-implicit design assumes the underlying transport preserves
//! message boundaries per write. [`crate::transport::Conn`] guarantees this
//! (one delivery event per read call); an integration over a different
//! byte source should validate the assumption against real traffic.

use crate::config::{MAX_CHUNK_SIZE, MAX_FRAME_SIZE};
use crate::core::cipher::{CipherContext, BLOCK_SIZE};
use crate::error::{ProtocolError, Result};
use std::io::{Read, Write};

/// Header byte for a plaintext payload.
pub const HEADER_PLAINTEXT: u8 = 0x00;

/// Header byte for an AES-CBC-encrypted payload.
pub const HEADER_ENCRYPTED: u8 = 0x10;

/// Encode one payload into a complete frame.
///
/// With a cipher the payload is PKCS#7 padded and CBC encrypted under the
/// encrypted header; without one it is passed through under the plaintext
/// header.
pub fn encode_frame(payload: &[u8], cipher: Option<&CipherContext>) -> Result<Vec<u8>> {
    match cipher {
        Some(cipher) => {
            let ciphertext = cipher.encrypt(payload)?;
            let mut frame = Vec::with_capacity(1 + ciphertext.len());
            frame.push(HEADER_ENCRYPTED);
            frame.extend_from_slice(&ciphertext);
            Ok(frame)
        }
        None => {
            let mut frame = Vec::with_capacity(1 + payload.len());
            frame.push(HEADER_PLAINTEXT);
            frame.extend_from_slice(payload);
            Ok(frame)
        }
    }
}

/// Decode one complete delivery into its payload.
///
/// # Errors
/// `TruncatedFrame` for an empty delivery, `InvalidHeader` for an unknown
/// header byte, `MissingCipher` for an encrypted frame without a cipher,
/// and the cipher's alignment/padding errors for malformed ciphertext.
pub fn decode_frame(frame: &[u8], cipher: Option<&CipherContext>) -> Result<Vec<u8>> {
    let (&header, payload) = frame.split_first().ok_or(ProtocolError::TruncatedFrame)?;

    match header {
        HEADER_PLAINTEXT => Ok(payload.to_vec()),
        HEADER_ENCRYPTED => {
            let cipher = cipher.ok_or(ProtocolError::MissingCipher)?;
            cipher.decrypt(payload)
        }
        other => Err(ProtocolError::InvalidHeader(other)),
    }
}

/// Streaming frame decoder over a delivery-preserving byte source.
pub struct FrameReader<R> {
    inner: R,
    cipher: Option<CipherContext>,
    scratch: Vec<u8>,
}

impl<R: Read> FrameReader<R> {
    /// Plaintext-only reader; encrypted frames yield `MissingCipher`.
    pub fn new(inner: R) -> Self {
        Self::build(inner, None)
    }

    /// Reader that can decode encrypted frames.
    pub fn with_cipher(inner: R, cipher: CipherContext) -> Self {
        Self::build(inner, Some(cipher))
    }

    fn build(inner: R, cipher: Option<CipherContext>) -> Self {
        Self {
            inner,
            cipher,
            scratch: vec![0u8; MAX_CHUNK_SIZE],
        }
    }

    /// Read and decode the next frame.
    ///
    /// Returns `Ok(None)` on a clean end of stream at a frame boundary.
    /// End of stream mid-frame is `TruncatedFrame`. Decode errors are local
    /// to the frame; the caller may keep reading.
    pub fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let mut header = [0u8; 1];
        if self.inner.read(&mut header)? == 0 {
            return Ok(None);
        }

        match header[0] {
            HEADER_PLAINTEXT => {
                // The remainder of this delivery is the payload. A delivery
                // holding only the header byte is an empty payload.
                let n = self.inner.read(&mut self.scratch)?;
                Ok(Some(self.scratch[..n].to_vec()))
            }
            HEADER_ENCRYPTED => {
                let cipher = self.cipher.as_ref().ok_or(ProtocolError::MissingCipher)?;

                // One delivery carries one complete ciphertext, but the
                // source may hand it over in several reads; accumulate until
                // a positive block multiple is available.
                let mut ciphertext = Vec::new();
                loop {
                    let n = self.inner.read(&mut self.scratch)?;
                    if n == 0 {
                        return Err(ProtocolError::TruncatedFrame);
                    }
                    ciphertext.extend_from_slice(&self.scratch[..n]);
                    if ciphertext.len() > MAX_FRAME_SIZE {
                        return Err(ProtocolError::OversizedFrame(ciphertext.len()));
                    }
                    if ciphertext.len() % BLOCK_SIZE == 0 {
                        break;
                    }
                }

                Ok(Some(cipher.decrypt(&ciphertext)?))
            }
            other => Err(ProtocolError::InvalidHeader(other)),
        }
    }

    /// Consume the reader, returning the underlying source.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_frame().transpose()
    }
}

/// Streaming frame encoder.
///
/// Each frame is emitted as a single logical write so the peer observes one
/// delivery per frame.
pub struct FrameWriter<W> {
    inner: W,
    cipher: Option<CipherContext>,
}

impl<W: Write> FrameWriter<W> {
    /// Plaintext-only writer.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            cipher: None,
        }
    }

    /// Writer that encrypts every frame.
    pub fn with_cipher(inner: W, cipher: CipherContext) -> Self {
        Self {
            inner,
            cipher: Some(cipher),
        }
    }

    /// Encode and write one frame.
    pub fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        let frame = encode_frame(payload, self.cipher.as_ref())?;
        self.inner.write_all(&frame)?;
        self.inner.flush()?;
        Ok(())
    }

    /// Consume the writer, returning the underlying sink.
    pub fn into_inner(self) -> W {
        self.inner
    }
}
