//! Shared utilities for Trustchain.

pub mod logging;

pub use logging::{init_logging, LogFormat, LogFormatError};
