//! Shared utilities for dbkeeper crates

pub mod logging;

pub use logging::{init_logging, LogLevel, LogOptions, LOG_ENV};
