//! Live log relay for long-running agent requests.
//!
//! Log output from anywhere in the process (tracing events, `log` records,
//! panics, and the redirected stdout/stderr file descriptors) is formatted
//! into single lines and pushed onto a shared [`LogQueue`]. While a request
//! is in flight, a [`RelayWorker`] drains that queue into the request's
//! [`DisplayBuffer`] so an observer can watch progress live.
//!
//! ```text
//! producers ──▶ LogQueue ──▶ RelayWorker ──▶ DisplayBuffer ──▶ transcript
//!                               ▲
//! RequestProcessor ──StopSignal─┘
//! ```

pub mod agent;
pub mod capture;
pub mod config;
pub mod error;
pub mod format;
pub mod line_buffer;
pub mod processor;
pub mod queue;
pub mod record;
pub mod relay;

pub use agent::{Agent, AgentResult, CommandAgent, TokenUsage};
pub use capture::{CaptureLayer, LogCapture};
pub use config::RelayConfig;
pub use error::RelayError;
pub use format::LineFormat;
pub use line_buffer::{CapturedStream, LineBuffer};
pub use processor::{Processed, RequestProcessor};
pub use queue::LogQueue;
pub use record::{LogLevel, LogRecord};
pub use relay::{DisplayBuffer, RelayContext, RelayHandle, RelayWorker, StopSignal};
