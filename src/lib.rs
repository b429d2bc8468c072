//! # Speaker Protocol
//!
//! Client protocol stack for networked speakers that exchange
//! length-implicit, optionally AES-CBC-encrypted, JSON-carrying frames over
//! one persistent TCP connection (conventionally port 9741).
//!
//! ## Architecture
//! - [`transport`]: a blocking `Read`/`Write`/close/deadline surface over
//!   an event-callback socket primitive, built on a FIFO chunk buffer and
//!   a single close/data/drain signal
//! - [`core`]: the frame codec — one header byte selects a plaintext or
//!   AES-CBC payload whose extent is the transport delivery unit
//! - [`service`]: [`Session`], the dial-then-exchange-JSON convenience
//! - [`capture`]: offline replay of captured traffic through the same
//!   decode path
//!
//! ## Example
//! ```rust,no_run
//! use speaker_protocol::{Session, SpeakerConfig};
//!
//! fn main() -> speaker_protocol::Result<()> {
//!     let config = SpeakerConfig::default_with_overrides(|c| {
//!         c.client.address = "192.168.1.40:9741".to_string();
//!         c.transport.key = Some("0123456789ABCDEF".to_string());
//!         c.transport.iv = Some("ABCDEF0123456789".to_string());
//!     });
//!
//!     let mut session = Session::connect(&config)?;
//!     session.send_value(&serde_json::json!({"cmd": "on"}))?;
//!     if let Some(reply) = session.recv_value()? {
//!         println!("{reply}");
//!     }
//!     session.close()
//! }
//! ```
//!
//! ## Security
//! - The AES key and IV are caller-supplied configuration, static for the
//!   life of a connection; there is no key exchange
//! - Encrypted payloads are PKCS#7 padded to the 16-byte block; padding and
//!   alignment are validated on decode and failures are recoverable errors

pub mod capture;
pub mod config;
pub mod core;
pub mod error;
pub mod service;
pub mod transport;
pub mod utils;

pub use config::SpeakerConfig;
pub use core::cipher::CipherContext;
pub use core::framer::{decode_frame, encode_frame, FrameReader, FrameWriter};
pub use error::{ProtocolError, Result};
pub use service::Session;
pub use transport::{dial, CancelToken, Conn, Dialer};
