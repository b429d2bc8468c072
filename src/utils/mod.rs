//! # Utility Modules
//!
//! Supporting utilities shared by the library and the capture tooling.
//!
//! ## Components
//! - **Logging**: Structured logging initialization (tracing-subscriber)

pub mod logging;
