//! # DataCrypt Common
//!
//! Logging configuration shared by the offline cache crates.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LoggingError};
