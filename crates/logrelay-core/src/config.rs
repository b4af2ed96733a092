//! Process-wide relay configuration, set once at startup.

use std::path::PathBuf;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::error::RelayError;
use crate::format::LineFormat;

/// Settings for log capture and the relay worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Line template, see [`LineFormat`].
    pub format: String,
    /// `EnvFilter` directives, e.g. `info` or `info,hyper=warn`.
    pub level: String,
    /// How long the relay worker waits on an empty queue before
    /// re-checking its stop signal.
    pub poll_interval: Duration,
    /// Color captured lines by level.
    pub color: bool,
    /// Mirror records to the original stderr.
    pub console: bool,
    /// Redirect the process stdout/stderr into the log path.
    pub capture_std_streams: bool,
    /// Also append records to this file (truncated at startup).
    pub log_file: Option<PathBuf>,
}

impl RelayConfig {
    pub const DEFAULT_LEVEL: &'static str = "info";
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
    /// Upper bound that keeps worker shutdown latency sub-second.
    pub const MAX_POLL_INTERVAL: Duration = Duration::from_millis(1000);

    /// Parse the line template and apply the color setting.
    pub fn line_format(&self) -> Result<LineFormat, RelayError> {
        Ok(LineFormat::parse(&self.format)?.with_color(self.color))
    }

    /// Build the level filter. `RUST_LOG` wins over the configured level.
    pub fn env_filter(&self) -> Result<EnvFilter, RelayError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level).map_err(|e| RelayError::LevelDirective {
            directive: self.level.clone(),
            reason: e.to_string(),
        })
    }

    /// Check everything that can be checked without touching global state.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.poll_interval.is_zero() || self.poll_interval > Self::MAX_POLL_INTERVAL {
            return Err(RelayError::PollInterval(self.poll_interval.as_millis()));
        }
        self.line_format()?;
        EnvFilter::try_new(&self.level).map_err(|e| RelayError::LevelDirective {
            directive: self.level.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            format: LineFormat::DEFAULT_TEMPLATE.to_string(),
            level: Self::DEFAULT_LEVEL.to_string(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            color: false,
            console: true,
            capture_std_streams: true,
            log_file: None,
        }
    }
}
