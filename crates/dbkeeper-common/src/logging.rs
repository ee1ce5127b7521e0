//! Logging initialisation for dbkeeper processes and tests
//!
//! Installs one global `tracing` subscriber. The filter comes from the
//! `DBKEEPER_LOG` environment variable when it is set (any `EnvFilter`
//! directive, e.g. `dbkeeper_cache=debug,info`), otherwise from the
//! configured minimum level.

use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a filter directive
pub const LOG_ENV: &str = "DBKEEPER_LOG";

/// Minimum log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown log level: {0}")]
pub struct ParseLogLevelError(String);

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(ParseLogLevelError(other.to_string())),
        }
    }
}

/// Logging configuration options
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Minimum level when `DBKEEPER_LOG` is unset
    pub level: LogLevel,
    /// Include the event target (module path) in each line
    pub with_target: bool,
    /// Route output through the test harness capture
    pub test_writer: bool,
}

impl LogOptions {
    /// Options for test binaries: debug level, captured output
    pub fn for_tests() -> Self {
        Self {
            level: LogLevel::Debug,
            with_target: true,
            test_writer: true,
        }
    }

    /// Filter to install: `DBKEEPER_LOG` if it parses, else the level
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
    }
}

/// Install the global subscriber
///
/// Returns `false` when a subscriber was already installed, so calling it
/// from every test is harmless.
pub fn init_logging(options: &LogOptions) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(options.filter())
        .with_target(options.with_target)
        .with_writer(std::io::stderr);

    if options.test_writer {
        builder.with_test_writer().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("DEBUG".parse(), Ok(LogLevel::Debug));
        assert_eq!("info".parse(), Ok(LogLevel::Info));
        assert_eq!(" Warning ".parse(), Ok(LogLevel::Warn));
        assert_eq!("error".parse(), Ok(LogLevel::Error));
        assert!("loud".parse::<LogLevel>().is_err());
        assert!(LogLevel::Trace < LogLevel::Error);
    }

    #[test]
    fn test_second_init_is_refused() {
        init_logging(&LogOptions::for_tests());
        assert!(!init_logging(&LogOptions::for_tests()));
        tracing::info!("logging initialised");
    }
}
