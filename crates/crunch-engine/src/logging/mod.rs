//! Logger setup for binaries built on the engine.
//!
//! The engine itself only emits through the `log` facade; installing a logger
//! is left to the binary, usually via [`init_logging`].

mod init;

pub use init::{init_logging, LoggingConfig};
