//! The `tracing` layer that turns events into queued lines.

use std::fmt::{self, Write as _};

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::format::LineFormat;
use crate::queue::LogQueue;
use crate::record::{LogLevel, LogRecord};

/// Formats every event it sees and pushes the line onto a [`LogQueue`].
///
/// Registering this layer is the only wiring a producer needs: anything that
/// logs through `tracing` (or through `log`, once the bridge is installed)
/// reaches the queue.
#[derive(Debug, Clone)]
pub struct CaptureLayer {
    queue: LogQueue,
    format: LineFormat,
}

/// Events from the relay itself. The worker reports after its final pop, so
/// capturing these would spill into the next request's transcript.
const RELAY_TARGET: &str = "logrelay_core::relay";

impl CaptureLayer {
    pub fn new(queue: LogQueue, format: LineFormat) -> Self {
        Self { queue, format }
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target().starts_with(RELAY_TARGET) {
            return;
        }
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let level = if visitor.critical {
            LogLevel::Critical
        } else {
            LogLevel::from(*metadata.level())
        };
        let source = visitor
            .log_target
            .take()
            .unwrap_or_else(|| metadata.target().to_string());

        let record = LogRecord::new(level, source, visitor.into_message());
        self.queue.push(self.format.render(&record));
    }
}

/// Collects the message and the remaining fields of one event.
#[derive(Default)]
struct RecordVisitor {
    message: String,
    fields: String,
    critical: bool,
    /// Original logger name for records bridged from the `log` crate.
    log_target: Option<String>,
}

impl RecordVisitor {
    fn into_message(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            self.message + &self.fields
        }
    }
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message.push_str(value),
            "log.target" => self.log_target = Some(value.to_string()),
            name if name.starts_with("log.") => {}
            name => {
                let _ = write!(self.fields, " {name}={value}");
            }
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == "critical" {
            self.critical = value;
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => {
                let _ = write!(self.message, "{value:?}");
            }
            name if name.starts_with("log.") => {}
            name => {
                let _ = write!(self.fields, " {name}={value:?}");
            }
        }
    }
}
