//! Setup-time errors for the relay.
//!
//! Everything on the hot path (enqueue, drain, relay) is total; only
//! configuration and installation can fail.

use std::path::PathBuf;

/// Errors raised while configuring or installing log capture.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("invalid line format template: {0}")]
    Template(String),

    #[error("poll interval must be between 1 and 1000 ms, got {0} ms")]
    PollInterval(u128),

    #[error("invalid log level directive {directive:?}: {reason}")]
    LevelDirective { directive: String, reason: String },

    #[error("failed to redirect {stream}: {source}")]
    Redirect {
        stream: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInstalled(String),
}
