//! Structured log records as seen by the capture layer.

use std::fmt;

use chrono::{DateTime, Local};

/// Severity of a captured record.
///
/// `tracing` has no CRITICAL level; events that set the boolean field
/// `critical = true` are promoted to [`LogLevel::Critical`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    /// ANSI SGR prefix used when colored output is enabled.
    pub(crate) fn ansi_color(self) -> &'static str {
        match self {
            LogLevel::Debug => "\x1b[34;20m",
            LogLevel::Info => "\x1b[32;20m",
            LogLevel::Warning => "\x1b[33;20m",
            LogLevel::Error => "\x1b[31;20m",
            LogLevel::Critical => "\x1b[31;1m",
        }
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE | tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::WARN => LogLevel::Warning,
            tracing::Level::ERROR => LogLevel::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One log event, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    /// Logger name; the `tracing` target for events.
    pub source: String,
    pub message: String,
}

impl LogRecord {
    pub fn new(level: LogLevel, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            source: source.into(),
            message: message.into(),
        }
    }
}
