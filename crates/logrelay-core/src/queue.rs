//! The shared FIFO of formatted log lines.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct Inner {
    lines: Mutex<VecDeque<String>>,
    available: Notify,
}

/// Unbounded multi-producer queue of formatted lines.
///
/// Cloning yields another handle to the same queue. `push` is synchronous,
/// O(1), and never waits on consumers, so it is safe to call from inside a
/// logging callback on any thread. Consumers either [`drain_all`] without
/// waiting or [`pop_timeout`] with a bounded wait.
///
/// [`drain_all`]: LogQueue::drain_all
/// [`pop_timeout`]: LogQueue::pop_timeout
#[derive(Debug, Clone, Default)]
pub struct LogQueue {
    inner: Arc<Inner>,
}

impl LogQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the deque half-updated,
    // so poisoning is ignored.
    fn lines(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.inner
            .lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a line and wake one waiting consumer.
    pub fn push(&self, line: impl Into<String>) {
        self.lines().push_back(line.into());
        self.inner.available.notify_one();
    }

    /// Remove the oldest line, if any, without waiting.
    pub fn try_pop(&self) -> Option<String> {
        self.lines().pop_front()
    }

    /// Remove the oldest line, waiting at most `wait` for one to arrive.
    ///
    /// Returns `None` only once the deadline has passed with the queue empty.
    pub async fn pop_timeout(&self, wait: Duration) -> Option<String> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(line) = self.try_pop() {
                return Some(line);
            }
            let notified = self.inner.available.notified();
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop();
            }
        }
    }

    /// Remove and return every queued line without waiting for more.
    pub fn drain_all(&self) -> Vec<String> {
        self.lines().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lines().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines().len()
    }
}
