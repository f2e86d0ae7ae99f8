//! Logging setup.
//!
//! The engine logs through the `log` facade only; this module installs
//! `env_logger` behind it for binaries that want console output.

mod init;

pub use init::{LoggingConfig, init_logging};
