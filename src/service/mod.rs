//! # Client Services
//!
//! User-facing glue over the transport and codec: dial a speaker, then
//! exchange framed JSON payloads with blocking calls.

pub mod session;

pub use session::Session;
