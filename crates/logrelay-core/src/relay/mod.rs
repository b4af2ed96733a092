//! The relay: moves queued lines into a request's display buffer while the
//! request is in flight.
//!
//! # Lifecycle
//!
//! ```text
//! RequestProcessor
//!     |
//!     |  RelayWorker::new(buffer, queue, poll, stop).spawn()
//!     v
//! RelayHandle ----------------------------+
//!     |                                   |  loop:
//!     |  (agent call runs meanwhile)      |    pop_timeout(poll)
//!     |                                   |      Some(line) -> buffer.push
//!     |  stop.set()                       |      None if stopped && queue empty -> exit
//!     |  handle.join().await  <-----------+
//!     v
//! buffer.transcript()
//! ```

pub mod buffer;
pub mod signal;
pub mod worker;

use std::time::Duration;

pub use buffer::DisplayBuffer;
pub use signal::StopSignal;
pub use worker::{RelayHandle, RelayWorker};

use crate::config::RelayConfig;
use crate::queue::LogQueue;

/// Process-scoped state shared by every request: the log queue and the
/// worker poll interval.
///
/// Passed explicitly to each component instead of living in a global, so
/// tests can build isolated contexts.
#[derive(Debug, Clone)]
pub struct RelayContext {
    queue: LogQueue,
    poll_interval: Duration,
}

impl RelayContext {
    pub fn new(queue: LogQueue, poll_interval: Duration) -> Self {
        Self {
            queue,
            poll_interval,
        }
    }

    /// A context with a fresh queue and the default poll interval.
    pub fn isolated() -> Self {
        Self::new(LogQueue::new(), RelayConfig::DEFAULT_POLL_INTERVAL)
    }

    pub fn queue(&self) -> &LogQueue {
        &self.queue
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// A worker for one request, bound to this context's queue.
    pub fn worker(&self, buffer: DisplayBuffer, stop: StopSignal) -> RelayWorker {
        RelayWorker::new(buffer, self.queue.clone(), self.poll_interval, stop)
    }
}
